//! Schema layer - table shapes and the type registry.
//!
//! `disassembly` derives a forest of table definitions from a registered
//! type's shape, `table` turns one definition into DDL and row mapping, and
//! `registry` owns the live definitions, their connections, and the
//! add/remove-type lifecycle.

pub mod disassembly;
pub mod registry;
pub mod table;

pub use registry::{Registry, RegistryOptions, StorageLayout};
pub use table::{Row, TableDefinition};
