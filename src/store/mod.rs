//! Administrative boundary to the document store.

use async_trait::async_trait;
use mongodb::bson::Document;

use crate::{
    catalog::{self, CollectionSpec, IndexSpec},
    error::BootstrapError,
    models::AppliedStep,
};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub validator: Option<Document>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub keys: Document,
    pub unique: bool,
}

impl IndexInfo {
    pub fn same_keys(&self, keys: &Document) -> bool {
        catalog::same_key_pattern(&self.keys, keys)
    }

    pub fn matches(&self, spec: &IndexSpec) -> bool {
        self.name == spec.name() && self.same_keys(&spec.keys) && self.unique == spec.unique
    }
}

impl From<&IndexSpec> for IndexInfo {
    fn from(spec: &IndexSpec) -> Self {
        IndexInfo {
            name: spec.name(),
            keys: spec.keys.clone(),
            unique: spec.unique,
        }
    }
}

#[async_trait]
pub trait SchemaStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn ping(&self) -> Result<(), BootstrapError>;

    async fn collection(&self, name: &str) -> Result<Option<CollectionInfo>, BootstrapError>;

    /// Raw create; fails with `CollectionAlreadyExists` when the name is taken.
    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), BootstrapError>;

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, BootstrapError>;

    async fn create_index(&self, spec: &IndexSpec) -> Result<(), BootstrapError>;

    async fn applied_steps(&self, ledger: &str) -> Result<Vec<AppliedStep>, BootstrapError>;

    async fn record_step(&self, ledger: &str, step: &AppliedStep) -> Result<(), BootstrapError>;
}
