use async_trait::async_trait;
use futures_util::StreamExt;
use mongodb::{
    bson::{doc, Document},
    error::ErrorKind,
    options::{ClientOptions, CreateCollectionOptions, IndexOptions, ReplaceOptions},
    Client, Database, IndexModel,
};

use crate::{
    catalog::{self, CollectionSpec, IndexSpec},
    config::Settings,
    error::{BootstrapError, Operation},
    models::AppliedStep,
};

use super::{CollectionInfo, IndexInfo, SchemaStore};

const NAMESPACE_NOT_FOUND: i32 = 26;

/// `SchemaStore` backed by a live MongoDB database handle.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        MongoStore { db }
    }

    /// Builds a client bounded by the configured timeout. No I/O happens
    /// until the first command, so callers should `ping` next.
    pub async fn connect(settings: &Settings) -> Result<Self, BootstrapError> {
        let mut options = ClientOptions::parse(&settings.mongodb_uri)
            .await
            .map_err(|e| BootstrapError::from_mongo(e, Operation::Connect))?;
        options.app_name = Some("cloudmusic-bootstrap".to_string());
        options.server_selection_timeout = Some(settings.op_timeout);
        options.connect_timeout = Some(settings.op_timeout);

        let client = Client::with_options(options)
            .map_err(|e| BootstrapError::from_mongo(e, Operation::Connect))?;

        Ok(MongoStore::new(client.database(&settings.mongodb_db)))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl SchemaStore for MongoStore {
    fn backend_tag(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> Result<(), BootstrapError> {
        self.db
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| BootstrapError::from_mongo(e, Operation::Connect))?;
        Ok(())
    }

    async fn collection(&self, name: &str) -> Result<Option<CollectionInfo>, BootstrapError> {
        let mut cursor = self
            .db
            .list_collections(doc! { "name": name }, None)
            .await
            .map_err(|e| BootstrapError::from_mongo(e, Operation::Catalog))?;

        match cursor.next().await {
            Some(item) => {
                let spec = item.map_err(|e| BootstrapError::from_mongo(e, Operation::Catalog))?;
                Ok(Some(CollectionInfo {
                    name: spec.name,
                    validator: spec.options.validator,
                }))
            }
            None => Ok(None),
        }
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), BootstrapError> {
        let options = CreateCollectionOptions::builder()
            .validator(spec.validator.clone())
            .build();

        self.db
            .create_collection(&spec.name, options)
            .await
            .map_err(|e| BootstrapError::from_mongo(e, Operation::CreateCollection(&spec.name)))
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, BootstrapError> {
        let col = self.db.collection::<Document>(collection);

        let mut cursor = match col.list_indexes(None).await {
            Ok(c) => c,
            Err(e) => {
                if let ErrorKind::Command(cmd) = e.kind.as_ref() {
                    if cmd.code == NAMESPACE_NOT_FOUND {
                        return Ok(Vec::new());
                    }
                }
                return Err(BootstrapError::from_mongo(e, Operation::Catalog));
            }
        };

        let mut out = Vec::new();
        while let Some(item) = cursor.next().await {
            let model = item.map_err(|e| BootstrapError::from_mongo(e, Operation::Catalog))?;
            let (name, unique) = match &model.options {
                Some(o) => (o.name.clone().unwrap_or_default(), o.unique.unwrap_or(false)),
                None => (String::new(), false),
            };
            out.push(IndexInfo {
                name,
                keys: catalog::normalize_keys(model.keys),
                unique,
            });
        }

        Ok(out)
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<(), BootstrapError> {
        let name = spec.name();
        let col = self.db.collection::<Document>(&spec.collection);
        let model = IndexModel::builder()
            .keys(spec.keys.clone())
            .options(
                IndexOptions::builder()
                    .name(name.clone())
                    .unique(spec.unique)
                    .build(),
            )
            .build();

        col.create_index(model, None).await.map_err(|e| {
            BootstrapError::from_mongo(
                e,
                Operation::CreateIndex {
                    collection: &spec.collection,
                    index: &name,
                },
            )
        })?;

        Ok(())
    }

    async fn applied_steps(&self, ledger: &str) -> Result<Vec<AppliedStep>, BootstrapError> {
        let col = self.db.collection::<AppliedStep>(ledger);

        let mut cursor = col
            .find(None, None)
            .await
            .map_err(|e| BootstrapError::from_mongo(e, Operation::Catalog))?;

        let mut steps = Vec::new();
        while let Some(item) = cursor.next().await {
            steps.push(item.map_err(|e| BootstrapError::from_mongo(e, Operation::Catalog))?);
        }
        steps.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(steps)
    }

    async fn record_step(&self, ledger: &str, step: &AppliedStep) -> Result<(), BootstrapError> {
        let col = self.db.collection::<AppliedStep>(ledger);
        col.replace_one(
            doc! { "_id": step.id.as_str() },
            step,
            ReplaceOptions::builder().upsert(true).build(),
        )
        .await
        .map_err(|e| BootstrapError::from_mongo(e, Operation::Catalog))?;
        Ok(())
    }
}
