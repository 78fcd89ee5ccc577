//! Schema registry - owns table definitions, connections, and the known-type
//! set.
//!
//! Two storage layouts, fixed at construction: `Unified` keeps every table in
//! one `odb.db` file, `Sharded` gives each table its own file. A persistent
//! registry serializes its own table set into the reserved `odb_registry`
//! table on drop (and on `persist()`), so re-opening the store restores the
//! prior schema from a caller-supplied shape catalog without per-type
//! re-registration; a non-persistent registry deletes its store files on drop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use crate::codec::{BlobCodec, JsonCodec};
use crate::model::{FieldKind, Model, TypeShape, UnionAlt};
use crate::pool::ConnectionPool;
use crate::query::delete::{delete_and_cascade, delete_owned_by};
use crate::schema::disassembly::disassemble;
use crate::schema::table::{TableDefinition, TableMap};
use crate::{Error, Result};

/// Reserved self-describing table recording each registered type and its
/// parent flag. Part of the on-disk contract.
pub const REGISTRY_TABLE: &str = "odb_registry";

const UNIFIED_DB_FILE: &str = "odb.db";
const REGISTRY_DB_FILE: &str = "odb_registry.db";

/// Physical layout of the store, fixed for the registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageLayout {
    /// One store file holding all tables
    Unified,
    /// One store file per table
    Sharded,
}

/// Construction parameters for [`Registry`].
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub base_path: PathBuf,
    pub max_depth: u32,
    pub persistent: bool,
    pub layout: StorageLayout,
}

impl RegistryOptions {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            max_depth: 2,
            persistent: false,
            layout: StorageLayout::Unified,
        }
    }
}

/// The live type -> table mapping plus everything needed to reach the store.
///
/// One writer registering types while other threads read already-registered
/// entries is the expected access pattern; the map sits behind a `RwLock` and
/// per-table flags are atomic.
pub struct Registry {
    base_path: PathBuf,
    layout: StorageLayout,
    max_depth: AtomicU32,
    persistent: AtomicBool,
    tables: RwLock<TableMap>,
    /// All tables' pool under the unified layout
    shared_pool: Option<Arc<ConnectionPool>>,
    /// Pool hosting the reserved registry table
    registry_pool: Arc<ConnectionPool>,
    codec: Arc<dyn BlobCodec>,
}

impl Registry {
    /// Open a registry with the default JSON codec.
    pub fn open(options: RegistryOptions) -> Result<Self> {
        Self::open_with_codec(options, Arc::new(JsonCodec))
    }

    /// Open a registry with an injected blob codec.
    pub fn open_with_codec(options: RegistryOptions, codec: Arc<dyn BlobCodec>) -> Result<Self> {
        std::fs::create_dir_all(&options.base_path)?;

        let (shared_pool, registry_pool) = match options.layout {
            StorageLayout::Unified => {
                let pool = Arc::new(ConnectionPool::open(options.base_path.join(UNIFIED_DB_FILE)));
                (Some(pool.clone()), pool)
            }
            StorageLayout::Sharded => {
                let pool = Arc::new(ConnectionPool::open(
                    options.base_path.join(REGISTRY_DB_FILE),
                ));
                (None, pool)
            }
        };

        Ok(Self {
            base_path: options.base_path,
            layout: options.layout,
            max_depth: AtomicU32::new(options.max_depth),
            persistent: AtomicBool::new(options.persistent),
            tables: RwLock::new(HashMap::new()),
            shared_pool,
            registry_pool,
            codec,
        })
    }

    pub fn layout(&self) -> StorageLayout {
        self.layout
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth.load(Ordering::Relaxed)
    }

    pub fn set_max_depth(&self, depth: u32) {
        self.max_depth.store(depth, Ordering::Relaxed);
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::Relaxed)
    }

    pub fn set_persistent(&self, persistent: bool) {
        self.persistent.store(persistent, Ordering::Relaxed);
    }

    pub fn codec(&self) -> &Arc<dyn BlobCodec> {
        &self.codec
    }

    /// Number of table definitions in the current schema
    pub fn schema_size(&self) -> usize {
        self.tables.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Tags of all directly-registered (parent) types
    pub fn known_types(&self) -> Vec<String> {
        let tables = match self.tables.read() {
            Ok(tables) => tables,
            Err(_) => return Vec::new(),
        };
        let mut names: Vec<String> = tables
            .values()
            .filter(|t| t.is_parent())
            .map(|t| t.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Snapshot of the live table map for query execution
    pub fn tables_snapshot(&self) -> TableMap {
        self.tables.read().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn is_known_type<T: Model>(&self) -> bool {
        self.is_known_tag(T::type_name())
    }

    pub fn is_known_tag(&self, tag: &str) -> bool {
        self.tables.read().map(|t| t.contains_key(tag)).unwrap_or(false)
    }

    /// Register a type: derive its table forest, create missing tables, and
    /// mark the root as parent. Re-adding a known type only keeps/flips the
    /// parent flag and never re-derives.
    pub fn add_type<T: Model>(&self) -> Result<()> {
        self.add_shape(crate::model::shape_of::<T>())
    }

    pub fn add_shape(&self, shape: TypeShape) -> Result<()> {
        let mut tables = self.write_tables()?;

        if let Some(existing) = tables.get(shape.name) {
            existing.set_parent(true);
            return Ok(());
        }

        // eager validation: a failing derivation must not touch the registry
        let forest = disassemble(shape, self.max_depth())?;

        for table in forest {
            if tables.contains_key(table.name()) {
                continue;
            }
            self.attach_pool(&table);
            {
                let conn = table.conn()?;
                conn.execute(&table.create_statement(), [])?;
            }
            tracing::debug!(table = table.name(), "created table");
            tables.insert(table.name().to_string(), Arc::new(table));
        }

        tables
            .get(shape.name)
            .ok_or_else(|| Error::UnknownType(shape.name.to_string()))?
            .set_parent(true);
        Ok(())
    }

    fn attach_pool(&self, table: &TableDefinition) {
        match self.layout {
            StorageLayout::Unified => {
                if let Some(pool) = &self.shared_pool {
                    table.attach_pool(pool.clone());
                }
            }
            StorageLayout::Sharded => {
                let path = self.base_path.join(format!("{}.db", table.file_stem()));
                table.attach_pool(Arc::new(ConnectionPool::open(path)));
            }
        }
    }

    /// First parent table (excluding `tag` itself) whose columns reference
    /// `tag`, or `None`. Errors if `tag` itself is not registered.
    pub fn get_parent<T: Model>(&self) -> Result<Option<String>> {
        self.get_parent_of(T::type_name())
    }

    pub fn get_parent_of(&self, tag: &str) -> Result<Option<String>> {
        let tables = self.read_tables()?;
        if !tables.contains_key(tag) {
            return Err(Error::UnknownType(tag.to_string()));
        }
        Ok(Self::parent_in(&tables, tag))
    }

    fn parent_in(tables: &TableMap, tag: &str) -> Option<String> {
        let mut parents: Vec<&Arc<TableDefinition>> = tables
            .values()
            .filter(|t| t.is_parent() && t.name() != tag)
            .collect();
        parents.sort_by_key(|t| t.name());
        parents
            .into_iter()
            .find(|t| t.references(tag))
            .map(|t| t.name().to_string())
    }

    /// Remove a type and, recursively, every dependent it exclusively owns.
    ///
    /// A dependent shared with another parent, or independently registered as
    /// a parent itself, only loses the rows the removed type owned; its table
    /// stays.
    pub fn remove_type<T: Model>(&self) -> Result<()> {
        self.remove_by_tag(T::type_name())
    }

    pub fn remove_by_tag(&self, tag: &str) -> Result<()> {
        let mut tables = self.write_tables()?;
        if !tables.contains_key(tag) {
            return Err(Error::UnknownType(tag.to_string()));
        }
        if let Some(parent) = Self::parent_in(&tables, tag) {
            return Err(Error::Parent(format!(
                "cannot remove {}: parent table {} still depends on it",
                tag, parent
            )));
        }
        Self::remove_table(&mut tables, tag)
    }

    fn remove_table(tables: &mut TableMap, tag: &str) -> Result<()> {
        let table = match tables.remove(tag) {
            Some(table) => table,
            None => return Ok(()),
        };

        let mut deps: Vec<&'static str> = Vec::new();
        let push_dep = |deps: &mut Vec<&'static str>, name: &'static str| {
            if !deps.contains(&name) {
                deps.push(name);
            }
        };
        for field in table.fields() {
            match &field.kind {
                FieldKind::Reference(shape) | FieldKind::OptionalReference(shape) => {
                    push_dep(&mut deps, shape.name);
                }
                FieldKind::MultiReference(alts) => {
                    for alt in alts {
                        if let UnionAlt::Shape(shape) = alt {
                            push_dep(&mut deps, shape.name);
                        }
                    }
                }
                _ => {}
            }
        }

        table.conn()?.execute(&table.drop_statement(), [])?;
        tracing::debug!(table = table.name(), "dropped table");

        for dep in deps {
            let Some(dep_table) = tables.get(dep).cloned() else {
                continue;
            };
            let shared = dep_table.is_parent()
                || tables
                    .values()
                    .any(|t| t.is_parent() && t.name() != dep && t.references(dep));
            if shared {
                // partial cleanup: only the rows the removed table owned
                let (direct, cascaded) = delete_owned_by(tables, &dep_table, table.name())?;
                tracing::debug!(
                    table = dep,
                    owner = table.name(),
                    direct,
                    cascaded,
                    "cleaned rows of removed owner"
                );
            } else {
                Self::remove_table(tables, dep)?;
            }
        }
        Ok(())
    }

    /// Delete all rows of every parent table, cascading into dependents.
    /// Table definitions are kept.
    pub fn clear(&self) -> Result<()> {
        let tables = self.read_tables()?;
        let parents: Vec<Arc<TableDefinition>> =
            tables.values().filter(|t| t.is_parent()).cloned().collect();
        for table in parents {
            delete_and_cascade(&tables, &table, None)?;
        }
        Ok(())
    }

    /// Write the registered type set into the reserved registry table.
    pub fn persist(&self) -> Result<()> {
        let tables = self.read_tables()?;
        let mut conn = self.registry_pool.acquire()?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (name TEXT PRIMARY KEY, is_parent INTEGER NOT NULL)",
                REGISTRY_TABLE
            ),
            [],
        )?;

        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute(&format!("DELETE FROM {}", REGISTRY_TABLE), [])?;
        {
            let mut stmt =
                tx.prepare(&format!("INSERT INTO {} VALUES (?, ?)", REGISTRY_TABLE))?;
            for table in tables.values() {
                stmt.execute(rusqlite::params![table.name(), table.is_parent() as i64])?;
            }
        }
        tx.commit()?;
        tracing::debug!(types = tables.len(), "persisted registry");
        Ok(())
    }

    /// Restore a previously persisted schema. Each recorded parent type is
    /// re-derived from the caller-supplied shape catalog; a recorded name
    /// missing from the catalog is skipped with a warning.
    pub fn load_existing(&self, catalog: &[TypeShape]) -> Result<()> {
        let conn = self.registry_pool.acquire()?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (name TEXT PRIMARY KEY, is_parent INTEGER NOT NULL)",
                REGISTRY_TABLE
            ),
            [],
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT name, is_parent FROM {} ORDER BY name",
            REGISTRY_TABLE
        ))?;
        let recorded: Vec<(String, bool)> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? != 0)))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);
        drop(conn);

        for (name, is_parent) in recorded {
            if !is_parent {
                // dependents reappear while re-deriving their parents
                continue;
            }
            match catalog.iter().find(|shape| shape.name == name) {
                Some(shape) => self.add_shape(*shape)?,
                None => {
                    tracing::warn!(type_name = %name, "recorded type missing from catalog, skipping");
                }
            }
        }
        Ok(())
    }

    fn read_tables(&self) -> Result<std::sync::RwLockReadGuard<'_, TableMap>> {
        self.tables
            .read()
            .map_err(|_| Error::Connection("registry lock poisoned".into()))
    }

    fn write_tables(&self) -> Result<RwLockWriteGuard<'_, TableMap>> {
        self.tables
            .write()
            .map_err(|_| Error::Connection("registry lock poisoned".into()))
    }

    fn store_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        match self.layout {
            StorageLayout::Unified => files.push(self.base_path.join(UNIFIED_DB_FILE)),
            StorageLayout::Sharded => {
                files.push(self.base_path.join(REGISTRY_DB_FILE));
                if let Ok(tables) = self.tables.read() {
                    for table in tables.values() {
                        files.push(self.base_path.join(format!("{}.db", table.file_stem())));
                    }
                }
            }
        }
        files
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        if self.is_persistent() {
            if let Err(err) = self.persist() {
                tracing::warn!(error = %err, "failed to persist registry on drop");
            }
            return;
        }

        for file in self.store_files() {
            remove_store_file(&file);
        }
    }
}

fn remove_store_file(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut target = path.as_os_str().to_owned();
        target.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(target));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_models::{LineItem, Note, Order, Shipment};

    fn registry(dir: &Path) -> Registry {
        Registry::open(RegistryOptions::new(dir)).unwrap()
    }

    #[test]
    fn test_add_and_known() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());

        assert!(!reg.is_known_type::<Order>());
        reg.add_type::<Order>().unwrap();
        assert!(reg.is_known_type::<Order>());
        assert!(reg.is_known_type::<LineItem>());
        assert_eq!(reg.schema_size(), 2);
    }

    #[test]
    fn test_add_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());

        reg.add_type::<Order>().unwrap();
        reg.add_type::<Order>().unwrap();
        assert_eq!(reg.schema_size(), 2);

        let tables = reg.tables_snapshot();
        assert!(tables[Order::type_name()].is_parent());
    }

    #[test]
    fn test_dependent_promotion() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());

        reg.add_type::<Order>().unwrap();
        let tables = reg.tables_snapshot();
        assert!(!tables[LineItem::type_name()].is_parent());

        reg.add_type::<LineItem>().unwrap();
        let tables = reg.tables_snapshot();
        assert!(tables[LineItem::type_name()].is_parent());
        assert_eq!(reg.schema_size(), 2);
    }

    #[test]
    fn test_get_parent() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.add_type::<Order>().unwrap();

        assert_eq!(
            reg.get_parent::<LineItem>().unwrap(),
            Some(Order::type_name().to_string())
        );
        assert_eq!(reg.get_parent::<Order>().unwrap(), None);
        assert!(matches!(
            reg.get_parent::<Note>(),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn test_remove_dependency_is_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.add_type::<Order>().unwrap();

        assert!(matches!(
            reg.remove_type::<LineItem>(),
            Err(Error::Parent(_))
        ));
        assert!(reg.is_known_type::<LineItem>());
    }

    #[test]
    fn test_remove_cascades_to_exclusive_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.add_type::<Order>().unwrap();

        reg.remove_type::<Order>().unwrap();
        assert!(!reg.is_known_type::<Order>());
        assert!(!reg.is_known_type::<LineItem>());
        assert_eq!(reg.schema_size(), 0);
    }

    #[test]
    fn test_remove_keeps_shared_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.add_type::<Order>().unwrap();
        reg.add_type::<Shipment>().unwrap();

        reg.remove_type::<Order>().unwrap();
        assert!(!reg.is_known_type::<Order>());
        assert!(reg.is_known_type::<LineItem>());

        reg.remove_type::<Shipment>().unwrap();
        assert!(!reg.is_known_type::<LineItem>());
    }

    #[test]
    fn test_remove_keeps_independently_registered_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.add_type::<Order>().unwrap();
        reg.add_type::<LineItem>().unwrap();

        reg.remove_type::<Order>().unwrap();
        assert!(reg.is_known_type::<LineItem>());
        let tables = reg.tables_snapshot();
        assert!(tables[LineItem::type_name()].is_parent());
    }

    #[test]
    fn test_remove_unknown_type() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        assert!(matches!(
            reg.remove_type::<Order>(),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn test_sharded_layout_one_file_per_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = RegistryOptions::new(dir.path());
        options.layout = StorageLayout::Sharded;
        let reg = Registry::open(options).unwrap();

        reg.add_type::<Order>().unwrap();
        assert!(dir.path().join("odb.test_models.Order.db").exists());
        assert!(dir.path().join("odb.test_models.LineItem.db").exists());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut options = RegistryOptions::new(dir.path());
            options.persistent = true;
            let reg = Registry::open(options).unwrap();
            reg.add_type::<Order>().unwrap();
        }

        let mut options = RegistryOptions::new(dir.path());
        options.persistent = true;
        let reg = Registry::open(options).unwrap();
        reg.load_existing(&[crate::model::shape_of::<Order>()]).unwrap();

        assert!(reg.is_known_type::<Order>());
        assert!(reg.is_known_type::<LineItem>());
        let tables = reg.tables_snapshot();
        assert!(tables[Order::type_name()].is_parent());
        assert!(!tables[LineItem::type_name()].is_parent());
    }

    #[test]
    fn test_non_persistent_drop_removes_store() {
        let dir = tempfile::tempdir().unwrap();
        {
            let reg = registry(dir.path());
            reg.add_type::<Order>().unwrap();
        }
        assert!(!dir.path().join("odb.db").exists());
    }
}
