use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{self, oid::ObjectId, Bson, Document};
use tokio::sync::Mutex;

use crate::{
    catalog::{check_collection_name, CollectionSpec, IndexSpec},
    error::{BootstrapError, WriteError},
    models::AppliedStep,
    validation,
};

use super::{CollectionInfo, IndexInfo, SchemaStore};

#[derive(Debug, Default)]
struct MemCollection {
    validator: Option<Document>,
    indexes: Vec<IndexInfo>,
    docs: Vec<Document>,
}

/// In-process catalog that enforces validators and unique indexes on
/// `insert`, the way the server does.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, MemCollection>>,
    failing_index: Mutex<Option<String>>,
    slow_index: Mutex<Option<(String, Duration)>>,
    offline: AtomicBool,
    create_calls: AtomicU64,
    delay: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Every administrative call sleeps for `delay` first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes `create_index` fail for the named index until cleared.
    pub async fn fail_index(&self, name: Option<&str>) {
        *self.failing_index.lock().await = name.map(str::to_string);
    }

    /// Makes `create_index` for the named index sleep `delay` before building it.
    pub async fn delay_index(&self, name: &str, delay: Duration) {
        *self.slow_index.lock().await = Some((name.to_string(), delay));
    }

    /// Number of create_collection/create_index calls that reached the catalog.
    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub async fn collection_names(&self) -> Vec<String> {
        self.collections.lock().await.keys().cloned().collect()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .await
            .get(collection)
            .map(|c| c.docs.len())
            .unwrap_or(0)
    }

    /// Inserts a document, creating the collection implicitly if needed.
    /// A missing `_id` is filled with a new ObjectId; a supplied one is kept.
    pub async fn insert(&self, collection: &str, mut doc: Document) -> Result<Bson, WriteError> {
        let mut collections = self.collections.lock().await;
        let col = collections.entry(collection.to_string()).or_default();

        if let Some(validator) = &col.validator {
            validation::validate(validator, &doc).map_err(|v| WriteError::DocumentValidation {
                path: v.path,
                reason: v.reason,
            })?;
        }

        let id = match doc.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                doc.insert("_id", id.clone());
                id
            }
        };
        if col.docs.iter().any(|other| other.get("_id") == Some(&id)) {
            return Err(WriteError::DuplicateKey {
                collection: collection.to_string(),
                index: "_id_".to_string(),
            });
        }

        for index in col.indexes.iter().filter(|i| i.unique) {
            let entries = index_entries(&doc, &index.keys);
            let clash = col
                .docs
                .iter()
                .any(|other| index_entries(other, &index.keys).iter().any(|e| entries.contains(e)));
            if clash {
                return Err(WriteError::DuplicateKey {
                    collection: collection.to_string(),
                    index: index.name.clone(),
                });
            }
        }

        col.docs.push(doc);

        Ok(id)
    }

    async fn pause(&self) -> Result<(), BootstrapError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(BootstrapError::ConnectionFailure(
                "memory store is offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), BootstrapError> {
        self.pause().await
    }

    async fn collection(&self, name: &str) -> Result<Option<CollectionInfo>, BootstrapError> {
        self.pause().await?;
        Ok(self.collections.lock().await.get(name).map(|c| CollectionInfo {
            name: name.to_string(),
            validator: c.validator.clone(),
        }))
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), BootstrapError> {
        self.pause().await?;
        check_collection_name(&spec.name)?;

        let mut collections = self.collections.lock().await;
        if collections.contains_key(&spec.name) {
            return Err(BootstrapError::CollectionAlreadyExists {
                collection: spec.name.clone(),
            });
        }

        if let Some(validator) = &spec.validator {
            validation::check_validator(validator).map_err(|reason| {
                BootstrapError::ValidationSchemaRejected {
                    collection: spec.name.clone(),
                    reason,
                }
            })?;
        }

        self.create_calls.fetch_add(1, Ordering::SeqCst);
        collections.insert(
            spec.name.clone(),
            MemCollection {
                validator: spec.validator.clone(),
                ..MemCollection::default()
            },
        );
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, BootstrapError> {
        self.pause().await?;
        Ok(self
            .collections
            .lock()
            .await
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default())
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<(), BootstrapError> {
        self.pause().await?;
        spec.check()?;

        let name = spec.name();
        if self.failing_index.lock().await.as_deref() == Some(name.as_str()) {
            return Err(BootstrapError::Store(format!("injected failure creating `{}`", name)));
        }

        let slow = self.slow_index.lock().await.clone();
        if let Some((slow_name, delay)) = slow {
            if slow_name == name {
                tokio::time::sleep(delay).await;
            }
        }

        let mut collections = self.collections.lock().await;
        let col = collections.entry(spec.collection.clone()).or_default();

        if let Some(existing) = col.indexes.iter().find(|i| i.name == name || i.same_keys(&spec.keys)) {
            if existing.matches(spec) {
                return Ok(());
            }
            return Err(BootstrapError::IndexConflict {
                collection: spec.collection.clone(),
                index: name,
                reason: format!("existing index `{}` has different options", existing.name),
            });
        }

        if spec.unique {
            let mut seen: Vec<Vec<Bson>> = Vec::new();
            for doc in &col.docs {
                // repeats inside one document's array are not duplicates
                let mut own: Vec<Vec<Bson>> = Vec::new();
                for entry in index_entries(doc, &spec.keys) {
                    if !own.contains(&entry) {
                        own.push(entry);
                    }
                }

                for entry in own {
                    if seen.contains(&entry) {
                        return Err(BootstrapError::Store(format!(
                            "E11000 duplicate key error collection: {} index: {}",
                            spec.collection, name
                        )));
                    }
                    seen.push(entry);
                }
            }
        }

        self.create_calls.fetch_add(1, Ordering::SeqCst);
        col.indexes.push(IndexInfo::from(spec));
        Ok(())
    }

    async fn applied_steps(&self, ledger: &str) -> Result<Vec<AppliedStep>, BootstrapError> {
        self.pause().await?;
        let collections = self.collections.lock().await;
        let Some(col) = collections.get(ledger) else {
            return Ok(Vec::new());
        };

        let mut steps = col
            .docs
            .iter()
            .map(|d| bson::from_document::<AppliedStep>(d.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BootstrapError::Store(e.to_string()))?;
        steps.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(steps)
    }

    async fn record_step(&self, ledger: &str, step: &AppliedStep) -> Result<(), BootstrapError> {
        self.pause().await?;
        let doc = bson::to_document(step).map_err(|e| BootstrapError::Store(e.to_string()))?;

        let mut collections = self.collections.lock().await;
        let col = collections.entry(ledger.to_string()).or_default();
        col.docs
            .retain(|d| d.get_str("_id").map(|id| id != step.id).unwrap_or(true));
        col.docs.push(doc);
        Ok(())
    }
}

fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(d) => d.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

// One entry per array element, like a multikey index; missing fields index as null.
fn index_entries(doc: &Document, keys: &Document) -> Vec<Vec<Bson>> {
    let mut entries = vec![Vec::new()];
    for (field, _) in keys.iter() {
        let values = match lookup(doc, field) {
            Some(Bson::Array(items)) if !items.is_empty() => items.clone(),
            Some(v) => vec![v.clone()],
            None => vec![Bson::Null],
        };
        entries = entries
            .into_iter()
            .flat_map(|prefix: Vec<Bson>| {
                values.iter().map(move |v| {
                    let mut e = prefix.clone();
                    e.push(v.clone());
                    e
                })
            })
            .collect();
    }
    entries
}
