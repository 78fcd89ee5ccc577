//! Select builder - typed reads with paging, counting, and lazy expiry.
//!
//! Every read path first deletes rows of the target table whose `expires_at`
//! has elapsed; rows without a TTL never expire. There is no background
//! sweeper - expiry is evaluated inline with reads.

use std::marker::PhantomData;

use crate::assembly::assemble_many;
use crate::insert::unix_now;
use crate::model::Model;
use crate::query::predicate::PredicateChain;
use crate::schema::registry::Registry;
use crate::schema::table::{Row, TableDefinition, TableMap};
use crate::value::Value;
use crate::{Error, Result};

/// Typed select over one registered table.
pub struct Select<'a, T: Model> {
    registry: &'a Registry,
    chain: PredicateChain,
    _marker: PhantomData<T>,
}

impl<'a, T: Model> Select<'a, T> {
    /// Build a select for `T`. Errors if the type is not registered.
    pub fn new(registry: &'a Registry) -> Result<Self> {
        if !registry.is_known_type::<T>() {
            return Err(Error::UnknownType(T::type_name().to_string()));
        }
        Ok(Self {
            registry,
            chain: PredicateChain::new(),
            _marker: PhantomData,
        })
    }

    /// Attach the next predicate call with OR instead of AND
    pub fn or(mut self) -> Self {
        self.chain.or();
        self
    }

    pub fn eq<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.eq(pairs)?;
        Ok(self)
    }

    pub fn ne<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.ne(pairs)?;
        Ok(self)
    }

    pub fn lt<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.lt(pairs)?;
        Ok(self)
    }

    pub fn gt<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.gt(pairs)?;
        Ok(self)
    }

    pub fn le<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.le(pairs)?;
        Ok(self)
    }

    pub fn ge<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.ge(pairs)?;
        Ok(self)
    }

    pub fn like<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.like(pairs)?;
        Ok(self)
    }

    pub fn not_like<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.not_like(pairs)?;
        Ok(self)
    }

    /// Cap the result set. `limit` must be positive.
    pub fn limit(mut self, limit: u64, offset: Option<u64>) -> Result<Self> {
        self.chain.set_limit(limit, offset)?;
        Ok(self)
    }

    /// All matching instances
    pub fn all(self) -> Result<Vec<T>> {
        let tables = self.registry.tables_snapshot();
        let rows = self.fetch(&tables)?;
        assemble_many(&tables, self.registry.codec().as_ref(), rows)
    }

    /// First matching instance, or `None`
    pub fn first(mut self) -> Result<Option<T>> {
        self.chain.override_limit(1);
        let tables = self.registry.tables_snapshot();
        let mut rows = self.fetch(&tables)?;
        rows.truncate(1);
        Ok(assemble_many(&tables, self.registry.codec().as_ref(), rows)?.into_iter().next())
    }

    /// Exactly one matching instance; zero or several is a query error
    pub fn one(mut self) -> Result<T> {
        // two rows are enough to prove ambiguity
        self.chain.override_limit(2);
        let tables = self.registry.tables_snapshot();
        let rows = self.fetch(&tables)?;
        match rows.len() {
            0 => Err(Error::Query("no results found for query".into())),
            1 => assemble_many(&tables, self.registry.codec().as_ref(), rows)?
                .into_iter()
                .next()
                .ok_or_else(|| Error::Query("no results found for query".into())),
            _ => Err(Error::Query("too many results found for query".into())),
        }
    }

    /// Number of matching, unexpired rows
    pub fn count(self) -> Result<u64> {
        let tables = self.registry.tables_snapshot();
        let table = self.table(&tables)?;
        purge_expired(table)?;

        let (where_sql, params) = self.chain.where_clause();
        let sql = format!("SELECT COUNT(*) FROM \"{}\"{}", table.name(), where_sql);
        let conn = table.conn()?;
        let count: i64 = conn.query_row(
            &sql,
            rusqlite::params_from_iter(params.iter()),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn table<'t>(&self, tables: &'t TableMap) -> Result<&'t TableDefinition> {
        tables
            .get(T::type_name())
            .map(|t| t.as_ref())
            .ok_or_else(|| Error::UnknownType(T::type_name().to_string()))
    }

    fn fetch(&self, tables: &TableMap) -> Result<Vec<Row>> {
        let table = self.table(tables)?;
        purge_expired(table)?;

        let (tail, params) = self.chain.compile();
        let sql = format!(
            "SELECT {} FROM \"{}\"{}",
            table.column_list(),
            table.name(),
            tail
        );
        let conn = table.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                table.row_from_sql(row)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Delete rows whose TTL has elapsed. Rows with a NULL `expires_at` are
/// exempt.
pub(crate) fn purge_expired(table: &TableDefinition) -> Result<()> {
    let conn = table.conn()?;
    let purged = conn.execute(
        &format!("DELETE FROM \"{}\" WHERE expires_at < ?", table.name()),
        [unix_now()],
    )?;
    if purged > 0 {
        tracing::debug!(table = table.name(), purged, "purged expired rows");
    }
    Ok(())
}
