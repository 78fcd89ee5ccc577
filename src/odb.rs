//! Facade - the surface consumed by callers.
//!
//! Thin composition of the core primitives: type lifecycle on the registry,
//! saves through the insertion pipeline, reads and deletes through the query
//! builders. Holds the one owned [`Registry`] instance; nothing here is
//! process-global.

use std::path::PathBuf;

use crate::insert::{insert, insert_many};
use crate::model::{Model, TypeShape};
use crate::query::{Delete, Select};
use crate::schema::registry::{Registry, RegistryOptions, StorageLayout};
use crate::Result;

/// Construction parameters for [`Odb`].
#[derive(Debug, Clone)]
pub struct OdbOptions {
    /// Folder holding the store file(s)
    pub folder: PathBuf,
    /// Maximum disassembly recursion depth
    pub max_depth: u32,
    /// Keep the store (and the registry's own table) across drops
    pub persistent: bool,
    /// One store file per table instead of one shared file
    pub sharding: bool,
    /// Restore a previously persisted schema on open
    pub load_existing: bool,
    /// Shapes the restored schema may re-derive from
    pub catalog: Vec<TypeShape>,
}

impl OdbOptions {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            max_depth: 2,
            persistent: false,
            sharding: false,
            load_existing: true,
            catalog: Vec::new(),
        }
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn sharding(mut self, sharding: bool) -> Self {
        self.sharding = sharding;
        self
    }

    pub fn load_existing(mut self, load: bool) -> Self {
        self.load_existing = load;
        self
    }

    pub fn catalog(mut self, catalog: Vec<TypeShape>) -> Self {
        self.catalog = catalog;
        self
    }
}

/// A persistent object database over SQLite.
pub struct Odb {
    registry: Registry,
}

impl Odb {
    /// Open (or create) a database under `options.folder`.
    pub fn open(options: OdbOptions) -> Result<Self> {
        let mut registry_options = RegistryOptions::new(options.folder);
        registry_options.max_depth = options.max_depth;
        registry_options.persistent = options.persistent;
        registry_options.layout = if options.sharding {
            StorageLayout::Sharded
        } else {
            StorageLayout::Unified
        };

        let registry = Registry::open(registry_options)?;
        if options.load_existing {
            registry.load_existing(&options.catalog)?;
        }
        Ok(Self { registry })
    }

    /// The owned schema registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Maximum disassembly recursion depth
    pub fn max_depth(&self) -> u32 {
        self.registry.max_depth()
    }

    pub fn set_max_depth(&self, depth: u32) {
        self.registry.set_max_depth(depth);
    }

    /// Whether the store survives dropping this instance
    pub fn persistent(&self) -> bool {
        self.registry.is_persistent()
    }

    pub fn set_persistent(&self, persistent: bool) {
        self.registry.set_persistent(persistent);
    }

    /// Number of table definitions in the current schema
    pub fn schema_size(&self) -> usize {
        self.registry.schema_size()
    }

    /// Register a type (and its dependencies) with the schema.
    pub fn add_type<T: Model>(&self) -> Result<()> {
        self.registry.add_type::<T>()
    }

    /// Remove a type and every dependent it exclusively owns.
    pub fn remove_type<T: Model>(&self) -> Result<()> {
        self.registry.remove_type::<T>()
    }

    pub fn is_known_type<T: Model>(&self) -> bool {
        self.registry.is_known_type::<T>()
    }

    /// Tags of all directly-registered types
    pub fn known_types(&self) -> Vec<String> {
        self.registry.known_types()
    }

    /// Save one object graph, registering its type first if unknown.
    pub fn save<T: Model>(&self, obj: &T, expires_at: Option<f64>) -> Result<()> {
        if !self.registry.is_known_type::<T>() {
            self.registry.add_type::<T>()?;
        }
        insert(&self.registry, obj, expires_at)
    }

    /// Save a batch in grouped statements. Unlike [`save`](Self::save) the
    /// type must already be registered.
    pub fn save_many<T: Model>(&self, objs: &[T], expires_at: Option<f64>) -> Result<()> {
        insert_many(&self.registry, objs, expires_at)
    }

    /// Build a select query for `T`.
    pub fn select<T: Model>(&self) -> Result<Select<'_, T>> {
        Select::new(&self.registry)
    }

    /// Build a delete query for `T`.
    pub fn delete<T: Model>(&self) -> Result<Delete<'_, T>> {
        Delete::new(&self.registry)
    }

    /// Delete all rows of every parent table, keeping the schema.
    pub fn clear(&self) -> Result<()> {
        self.registry.clear()
    }
}
