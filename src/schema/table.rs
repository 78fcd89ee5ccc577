//! Table definitions and DDL generation.
//!
//! One [`TableDefinition`] per registered type: the table name is the type's
//! fully-qualified name (case preserved, always double-quoted in SQL), the
//! reserved columns come first, and the non-reserved columns mirror the
//! declared fields in order. Reference columns store the dynamic type tag of
//! the concrete value as TEXT; the data itself lives in the child table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::model::{FieldDef, FieldKind, TypeShape};
use crate::pool::{ConnectionPool, PooledConn};
use crate::value::Value;
use crate::{Error, Result};

/// Column names reserved for the engine's own linkage and expiry metadata.
/// A user field with one of these names is rejected at disassembly time.
pub const RESERVED_COLUMNS: &[&str] = &["uid", "parent_uid", "parent_table", "expires_at"];

/// Upper bound on bound parameters per statement when expanding IN lists
pub(crate) const BIND_CHUNK: usize = 500;

/// Registry map: dynamic type tag -> table definition
pub type TableMap = HashMap<String, Arc<TableDefinition>>;

/// One physical row: linkage metadata plus the field cells in declared order.
#[derive(Debug, Clone)]
pub struct Row {
    pub uid: String,
    pub parent_uid: Option<String>,
    pub parent_table: Option<String>,
    pub expires_at: Option<f64>,
    pub values: Vec<Value>,
}

/// Physical table shape plus metadata for one registered type.
pub struct TableDefinition {
    shape: TypeShape,
    fields: Vec<FieldDef>,
    is_parent: AtomicBool,
    pool: OnceLock<Arc<ConnectionPool>>,
}

impl TableDefinition {
    pub fn new(shape: TypeShape) -> Self {
        let fields = (shape.fields)();
        Self {
            shape,
            fields,
            is_parent: AtomicBool::new(false),
            pool: OnceLock::new(),
        }
    }

    /// Table name == fully-qualified type name == dynamic type tag
    pub fn name(&self) -> &'static str {
        self.shape.name
    }

    pub fn shape(&self) -> &TypeShape {
        &self.shape
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// True iff the type was directly registered by a caller, false if only
    /// reachable as a nested dependency
    pub fn is_parent(&self) -> bool {
        self.is_parent.load(Ordering::Relaxed)
    }

    pub fn set_parent(&self, flag: bool) {
        self.is_parent.store(flag, Ordering::Relaxed);
    }

    /// Attach the connection pool. Done once by the registry; disassembly
    /// itself performs no I/O.
    pub fn attach_pool(&self, pool: Arc<ConnectionPool>) {
        let _ = self.pool.set(pool);
    }

    pub fn pool(&self) -> Result<&Arc<ConnectionPool>> {
        self.pool.get().ok_or_else(|| {
            Error::Connection(format!("table {} does not have a connection pool", self.name()))
        })
    }

    /// Acquire a scoped connection to this table's store
    pub fn conn(&self) -> Result<PooledConn<'_>> {
        self.pool()?.acquire()
    }

    /// File stem used under the sharded layout; `::` path separators do not
    /// survive as file names
    pub fn file_stem(&self) -> String {
        self.name().replace("::", ".")
    }

    /// Indexes (into `Row::values`) of columns holding dynamic type tags
    pub fn reference_columns(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.kind.is_reference())
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether any field of this table references the given type tag,
    /// directly, optionally, or as one alternative of a union
    pub fn references(&self, tag: &str) -> bool {
        self.fields.iter().any(|f| match &f.kind {
            FieldKind::Reference(shape) | FieldKind::OptionalReference(shape) => shape.name == tag,
            FieldKind::MultiReference(alts) => alts.iter().any(|alt| match alt {
                crate::model::UnionAlt::Shape(shape) => shape.name == tag,
                crate::model::UnionAlt::Primitive(_) => false,
            }),
            _ => false,
        })
    }

    fn column_type(kind: &FieldKind) -> String {
        match kind {
            FieldKind::Primitive(p) => format!("{} NOT NULL", p.affinity()),
            FieldKind::OptionalPrimitive(p) => p.affinity().to_string(),
            FieldKind::Container(_) => "BLOB NOT NULL".to_string(),
            FieldKind::OptionalContainer(_) => "BLOB".to_string(),
            FieldKind::Reference(_) | FieldKind::MultiReference(_) => "TEXT NOT NULL".to_string(),
            FieldKind::OptionalReference(_) => "TEXT".to_string(),
        }
    }

    /// CREATE TABLE statement, reserved columns first
    pub fn create_statement(&self) -> String {
        let mut cols = vec![
            "uid TEXT PRIMARY KEY".to_string(),
            "parent_uid TEXT".to_string(),
            "parent_table TEXT".to_string(),
            "expires_at REAL".to_string(),
        ];
        for field in &self.fields {
            cols.push(format!("{} {}", field.name, Self::column_type(&field.kind)));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            self.name(),
            cols.join(", ")
        )
    }

    pub fn drop_statement(&self) -> String {
        format!("DROP TABLE IF EXISTS \"{}\"", self.name())
    }

    /// Comma-separated column list in select order
    pub fn column_list(&self) -> String {
        let mut cols: Vec<&str> = RESERVED_COLUMNS.to_vec();
        cols.extend(self.fields.iter().map(|f| f.name));
        cols.join(", ")
    }

    /// INSERT statement with one placeholder per column
    pub fn insert_statement(&self) -> String {
        let placeholders = vec!["?"; RESERVED_COLUMNS.len() + self.fields.len()].join(", ");
        format!("INSERT INTO \"{}\" VALUES ({})", self.name(), placeholders)
    }

    /// Map a query result positioned on `SELECT {column_list} ...` to a [`Row`]
    pub fn row_from_sql(&self, row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
        let mut values = Vec::with_capacity(self.fields.len());
        for i in 0..self.fields.len() {
            values.push(Value::from_sql_ref(row.get_ref(RESERVED_COLUMNS.len() + i)?));
        }
        Ok(Row {
            uid: row.get(0)?,
            parent_uid: row.get(1)?,
            parent_table: row.get(2)?,
            expires_at: row.get(3)?,
            values,
        })
    }
}

impl std::fmt::Debug for TableDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableDefinition")
            .field("name", &self.name())
            .field("fields", &self.fields.len())
            .field("is_parent", &self.is_parent())
            .finish()
    }
}
