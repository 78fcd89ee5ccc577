//! Connection pool - one pool per store file.
//!
//! rusqlite connections must not be shared across threads, so the pool hands
//! each call an owned connection scoped to a [`PooledConn`] guard; dropping
//! the guard returns the connection to the idle set. Connections are opened
//! lazily on first acquire.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;

use crate::Result;

/// Pool of connections to a single SQLite file.
pub struct ConnectionPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl ConnectionPool {
    /// Create a pool for the given store file. No connection is opened until
    /// the first `acquire`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Store file this pool serves
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire a connection, reusing an idle one when available.
    pub fn acquire(&self) -> Result<PooledConn<'_>> {
        let idle = self
            .idle
            .lock()
            .map_err(|_| crate::Error::Connection("connection pool lock poisoned".into()))?
            .pop();

        let conn = match idle {
            Some(conn) => conn,
            None => self.connect()?,
        };

        Ok(PooledConn {
            pool: self,
            conn: Some(conn),
        })
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        // writers wait instead of failing on a locked database
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("path", &self.path)
            .finish()
    }
}

/// Scoped handle to a pooled connection. Returns the connection to the pool
/// on drop.
pub struct PooledConn<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
}

impl Deref for PooledConn<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken")
    }
}

impl DerefMut for PooledConn<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken")
    }
}

impl Drop for PooledConn<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Ok(mut idle) = self.pool.idle.lock() {
                idle.push(conn);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(dir.path().join("pool.db"));

        {
            let conn = pool.acquire().unwrap();
            conn.execute("CREATE TABLE t (x INTEGER)", []).unwrap();
        }

        // the connection went back to the idle set and sees the table
        let conn = pool.acquire().unwrap();
        conn.execute("INSERT INTO t VALUES (1)", []).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_concurrent_acquires_get_distinct_connections() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(dir.path().join("pool.db"));

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        a.execute_batch("CREATE TABLE IF NOT EXISTS t (x INTEGER)").unwrap();
        b.execute_batch("CREATE TABLE IF NOT EXISTS u (x INTEGER)").unwrap();
    }
}
