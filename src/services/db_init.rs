use std::collections::HashSet;
use std::time::Duration;

use mongodb::bson::Document;
use serde::Serialize;
use tokio::time;

use crate::{
    catalog::{self, CollectionSpec, IndexSpec},
    config::Settings,
    error::BootstrapError,
    models::AppliedStep,
    store::{IndexInfo, SchemaStore},
};

pub const COMPLETION_MESSAGE: &str = "✅ MongoDB Collections and Indexes created successfully.";

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    CreateCollection(CollectionSpec),
    CreateIndex(IndexSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStep {
    pub id: String,
    pub description: String,
    pub action: Action,
}

impl MigrationStep {
    fn collection(id: &str, spec: CollectionSpec) -> Self {
        let description = match spec.validator {
            Some(_) => format!("create collection {} with validator", spec.name),
            None => format!("create collection {}", spec.name),
        };
        MigrationStep {
            id: id.to_string(),
            description,
            action: Action::CreateCollection(spec),
        }
    }

    fn index(id: &str, spec: IndexSpec) -> Self {
        let description = format!(
            "create {}index {} on {}",
            if spec.unique { "unique " } else { "" },
            spec.name(),
            spec.collection
        );
        MigrationStep {
            id: id.to_string(),
            description,
            action: Action::CreateIndex(spec),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Created by this run.
    Applied,
    /// Not in the ledger, but the catalog already had it.
    AlreadyPresent,
    /// In the ledger; the store was not touched.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub id: String,
    pub description: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BootstrapReport {
    pub backend: String,
    pub steps: Vec<StepReport>,
}

impl BootstrapReport {
    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.steps.iter().filter(|s| s.outcome == outcome).count()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The catalog, in the order it must be built: each collection followed by
/// its indexes. Ids are numbered by position, e.g. `0002_user_profiles_user_id_1`.
pub fn bootstrap_steps() -> Vec<MigrationStep> {
    let groups = [
        (catalog::user_profiles(), catalog::user_profiles_indexes()),
        (catalog::playlists(), catalog::playlists_indexes()),
    ];

    let mut steps = Vec::new();
    for (collection, indexes) in groups {
        let id = format!("{:04}_create_{}", steps.len() + 1, collection.name);
        steps.push(MigrationStep::collection(&id, collection));

        for index in indexes {
            let id = format!("{:04}_{}_{}", steps.len() + 1, index.collection, index.name());
            steps.push(MigrationStep::index(&id, index));
        }
    }
    steps
}

pub async fn create_user_profiles_collection(
    store: &dyn SchemaStore,
) -> Result<StepOutcome, BootstrapError> {
    ensure_collection(store, &catalog::user_profiles()).await
}

pub async fn create_playlists_collection(
    store: &dyn SchemaStore,
) -> Result<StepOutcome, BootstrapError> {
    ensure_collection(store, &catalog::playlists()).await
}

pub async fn create_index(
    store: &dyn SchemaStore,
    collection: &str,
    keys: Document,
    unique: bool,
) -> Result<StepOutcome, BootstrapError> {
    let spec = IndexSpec {
        collection: collection.to_string(),
        keys,
        unique,
    };
    ensure_index(store, &spec).await
}

/// Creates the collection unless it exists. An existing collection is never
/// altered, even when its validator differs.
pub async fn ensure_collection(
    store: &dyn SchemaStore,
    spec: &CollectionSpec,
) -> Result<StepOutcome, BootstrapError> {
    spec.check()?;

    if let Some(existing) = store.collection(&spec.name).await? {
        if existing.validator != spec.validator {
            tracing::warn!(
                "collection {} exists with a different validator; leaving it untouched",
                spec.name
            );
        }
        return Ok(StepOutcome::AlreadyPresent);
    }

    match store.create_collection(spec).await {
        Ok(()) => Ok(StepOutcome::Applied),
        // created by someone else between the check and the create
        Err(BootstrapError::CollectionAlreadyExists { .. }) => Ok(StepOutcome::AlreadyPresent),
        Err(e) => Err(e),
    }
}

/// Creates the index unless an identical one exists. A same-named or
/// same-keyed index with other options is an `IndexConflict`.
pub async fn ensure_index(
    store: &dyn SchemaStore,
    spec: &IndexSpec,
) -> Result<StepOutcome, BootstrapError> {
    spec.check()?;

    let name = spec.name();
    let existing = store.list_indexes(&spec.collection).await?;

    if let Some(found) = existing
        .iter()
        .find(|i| i.name == name || i.same_keys(&spec.keys))
    {
        if found.matches(spec) {
            return Ok(StepOutcome::AlreadyPresent);
        }
        return Err(conflict(spec, found));
    }

    store.create_index(spec).await?;
    Ok(StepOutcome::Applied)
}

fn conflict(spec: &IndexSpec, found: &IndexInfo) -> BootstrapError {
    BootstrapError::IndexConflict {
        collection: spec.collection.clone(),
        index: spec.name(),
        reason: format!(
            "existing index `{}` has keys {} unique={}",
            found.name, found.keys, found.unique
        ),
    }
}

async fn bounded<T, F>(label: &str, limit: Duration, fut: F) -> Result<T, BootstrapError>
where
    F: Future<Output = Result<T, BootstrapError>>,
{
    match time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(BootstrapError::Timeout {
            step: label.to_string(),
            after: limit,
        }),
    }
}

async fn apply(store: &dyn SchemaStore, action: &Action) -> Result<StepOutcome, BootstrapError> {
    match action {
        Action::CreateCollection(spec) => ensure_collection(store, spec).await,
        Action::CreateIndex(spec) => ensure_index(store, spec).await,
    }
}

/// Runs the CloudMusic catalog bootstrap against `store`.
pub async fn run_bootstrap(
    store: &dyn SchemaStore,
    settings: &Settings,
) -> Result<BootstrapReport, BootstrapError> {
    run_steps(store, settings, &bootstrap_steps()).await
}

/// Applies `steps` in order. Stops at the first failure; steps already
/// applied stay applied and recorded, so a re-run resumes after them.
pub async fn run_steps(
    store: &dyn SchemaStore,
    settings: &Settings,
    steps: &[MigrationStep],
) -> Result<BootstrapReport, BootstrapError> {
    let limit = settings.op_timeout;
    let ledger = settings.migrations_collection.as_str();

    let mut ids = HashSet::new();
    for step in steps {
        if !ids.insert(step.id.as_str()) {
            return Err(BootstrapError::InvalidDefinition(format!(
                "duplicate step id `{}`",
                step.id
            )));
        }
    }

    bounded("ping", limit, store.ping()).await?;
    tracing::info!("connected to {} store", store.backend_tag());

    let applied: HashSet<String> = bounded("read ledger", limit, store.applied_steps(ledger))
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();

    let mut report = BootstrapReport {
        backend: store.backend_tag().to_string(),
        steps: Vec::with_capacity(steps.len()),
    };

    for step in steps {
        let outcome = if applied.contains(&step.id) {
            tracing::debug!("step {} already recorded, skipping", step.id);
            StepOutcome::Skipped
        } else {
            let outcome = bounded(&step.id, limit, apply(store, &step.action))
                .await
                .inspect_err(|e| tracing::error!("step {} failed: {}", step.id, e))?;

            let record = AppliedStep::now(&step.id, &step.description);
            bounded(&step.id, limit, store.record_step(ledger, &record)).await?;

            tracing::info!("step {}: {} ({:?})", step.id, step.description, outcome);
            outcome
        };

        report.steps.push(StepReport {
            id: step.id.clone(),
            description: step.description.clone(),
            outcome,
        });
    }

    Ok(report)
}
