//! # Odb - Embedded Object Persistence
//!
//! Maps registered, possibly nested, object graphs onto SQLite tables without
//! hand-written SQL or schema migrations.
//!
//! Odb provides:
//! - Recursive disassembly of a registered type into a forest of table shapes
//! - A schema registry tracking table lifecycle, parent/child ownership, and
//!   cascading add/remove semantics
//! - Insertion and assembly pipelines converting object graphs to/from rows
//!   with parent-link fan-out
//! - A typed query builder (select/delete with predicates, paging, counting,
//!   lazy expiry)
//!
//! Types opt in by implementing the [`Model`] trait, which declares the
//! persisted field shape explicitly - nothing is introspected at runtime.
//!
//! [`Model`]: model::Model

pub mod assembly;
pub mod codec;
pub mod insert;
pub mod model;
pub mod odb;
pub mod pool;
pub mod query;
pub mod schema;
pub mod value;

#[cfg(test)]
pub(crate) mod test_models;

// Re-exports for convenient access
pub use codec::{BlobCodec, JsonCodec};
pub use model::{
    AssembledChild, ElementType, ErasedModel, FieldDef, FieldKind, FieldValue, Model, RowReader,
    TypeShape, UnionAlt, shape_of,
};
pub use odb::{Odb, OdbOptions};
pub use query::{Delete, Select};
pub use schema::registry::{Registry, RegistryOptions, StorageLayout};
pub use value::{Primitive, Value};

/// Result type alias for Odb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Odb operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Disassembly error: {0}")]
    Disassembly(String),

    #[error("Mixed types error: {0}")]
    MixedTypes(String),

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Parent error: {0}")]
    Parent(String),

    #[error("Bad type: {0}")]
    BadType(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Expiry error: {0}")]
    Expiry(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
