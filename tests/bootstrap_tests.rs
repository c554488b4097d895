use std::time::Duration;

use cloudmusic_schema::{
    catalog::{self, IndexSpec},
    config::Settings,
    error::BootstrapError,
    services::db_init::{self, StepOutcome},
    store::{MemoryStore, SchemaStore},
};
use mongodb::bson::doc;

fn test_settings() -> Settings {
    Settings {
        op_timeout: Duration::from_secs(2),
        ..Settings::default()
    }
}

async fn index_names(store: &MemoryStore, collection: &str) -> Vec<String> {
    store
        .list_indexes(collection)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect()
}

#[test]
fn steps_follow_catalog_order() {
    let ids: Vec<String> = db_init::bootstrap_steps().into_iter().map(|s| s.id).collect();
    assert_eq!(
        ids,
        vec![
            "0001_create_user_profiles",
            "0002_user_profiles_user_id_1",
            "0003_user_profiles_preferences.preferred_genres_1",
            "0004_create_playlists",
            "0005_playlists_owner_id_1",
            "0006_playlists_tags_1",
        ]
    );
}

#[tokio::test]
async fn fresh_store_gets_collections_and_indexes() {
    let store = MemoryStore::new();
    let settings = test_settings();

    let report = db_init::run_bootstrap(&store, &settings).await.unwrap();
    assert_eq!(report.backend, "memory");
    assert_eq!(report.count(StepOutcome::Applied), 6);

    assert_eq!(
        store.collection_names().await,
        vec!["playlists", "schema_migrations", "user_profiles"]
    );
    assert_eq!(
        index_names(&store, catalog::USER_PROFILES).await,
        vec!["user_id_1", "preferences.preferred_genres_1"]
    );
    assert_eq!(
        index_names(&store, catalog::PLAYLISTS).await,
        vec!["owner_id_1", "tags_1"]
    );

    let profile_indexes = store.list_indexes(catalog::USER_PROFILES).await.unwrap();
    assert!(profile_indexes[0].unique);
    assert!(!profile_indexes[1].unique);

    let profiles = store.collection(catalog::USER_PROFILES).await.unwrap().unwrap();
    assert_eq!(profiles.validator, Some(catalog::user_profiles_validator()));
    let playlists = store.collection(catalog::PLAYLISTS).await.unwrap().unwrap();
    assert_eq!(playlists.validator, None);

    assert_eq!(store.applied_steps("schema_migrations").await.unwrap().len(), 6);
}

#[tokio::test]
async fn second_run_skips_everything() {
    let store = MemoryStore::new();
    let settings = test_settings();

    db_init::run_bootstrap(&store, &settings).await.unwrap();
    let calls = store.create_calls();

    let report = db_init::run_bootstrap(&store, &settings).await.unwrap();
    assert_eq!(report.count(StepOutcome::Skipped), 6);
    assert_eq!(store.create_calls(), calls);

    assert_eq!(index_names(&store, catalog::USER_PROFILES).await.len(), 2);
    assert_eq!(index_names(&store, catalog::PLAYLISTS).await.len(), 2);
}

#[tokio::test]
async fn rerun_without_ledger_does_not_duplicate_indexes() {
    let store = MemoryStore::new();

    db_init::run_bootstrap(&store, &test_settings()).await.unwrap();

    // a fresh ledger name means nothing is recorded, so every step re-checks the catalog
    let settings = Settings {
        migrations_collection: "other_ledger".to_string(),
        ..test_settings()
    };
    let report = db_init::run_bootstrap(&store, &settings).await.unwrap();

    assert_eq!(report.count(StepOutcome::AlreadyPresent), 6);
    assert_eq!(index_names(&store, catalog::USER_PROFILES).await.len(), 2);
    assert_eq!(index_names(&store, catalog::PLAYLISTS).await.len(), 2);
}

#[tokio::test]
async fn failure_stops_the_run_and_rerun_resumes() {
    let store = MemoryStore::new();
    let settings = test_settings();

    store.fail_index(Some("owner_id_1")).await;
    let err = db_init::run_bootstrap(&store, &settings).await.unwrap_err();
    assert!(matches!(err, BootstrapError::Store(_)));

    // steps before the failure stay applied, later ones never ran
    let recorded: Vec<String> = store
        .applied_steps("schema_migrations")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(recorded.len(), 4);
    assert!(recorded.contains(&"0004_create_playlists".to_string()));
    assert!(index_names(&store, catalog::PLAYLISTS).await.is_empty());

    store.fail_index(None).await;
    let report = db_init::run_bootstrap(&store, &settings).await.unwrap();
    assert_eq!(report.count(StepOutcome::Skipped), 4);
    assert_eq!(report.count(StepOutcome::Applied), 2);
    assert_eq!(
        index_names(&store, catalog::PLAYLISTS).await,
        vec!["owner_id_1", "tags_1"]
    );
}

#[tokio::test]
async fn offline_store_is_a_connection_failure() {
    let store = MemoryStore::new();
    store.set_offline(true);

    let err = db_init::run_bootstrap(&store, &test_settings()).await.unwrap_err();
    assert!(matches!(err, BootstrapError::ConnectionFailure(_)));

    store.set_offline(false);
    assert!(store.collection_names().await.is_empty());
}

#[tokio::test]
async fn slow_store_times_out() {
    let store = MemoryStore::new().with_delay(Duration::from_millis(300));
    let settings = Settings {
        op_timeout: Duration::from_millis(50),
        ..Settings::default()
    };

    let err = db_init::run_bootstrap(&store, &settings).await.unwrap_err();
    match err {
        BootstrapError::Timeout { step, after } => {
            assert_eq!(step, "ping");
            assert_eq!(after, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_index_step_times_out_with_its_step_id() {
    let store = MemoryStore::new();
    store
        .delay_index("owner_id_1", Duration::from_millis(500))
        .await;
    let settings = Settings {
        op_timeout: Duration::from_millis(100),
        ..Settings::default()
    };

    let err = db_init::run_bootstrap(&store, &settings).await.unwrap_err();
    match err {
        BootstrapError::Timeout { step, after } => {
            assert_eq!(step, "0005_playlists_owner_id_1");
            assert_eq!(after, Duration::from_millis(100));
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    // earlier steps stay recorded, the slow one and everything after it do not
    let recorded = store.applied_steps("schema_migrations").await.unwrap();
    assert_eq!(recorded.len(), 4);
    assert!(recorded.iter().all(|s| s.id.as_str() < "0005"));
}

#[tokio::test]
async fn compound_key_order_makes_a_different_index() {
    let store = MemoryStore::new();

    let first = db_init::create_index(&store, "playlists", doc! { "a": 1, "b": 1 }, false)
        .await
        .unwrap();
    assert_eq!(first, StepOutcome::Applied);

    let swapped = db_init::create_index(&store, "playlists", doc! { "b": 1, "a": 1 }, false)
        .await
        .unwrap();
    assert_eq!(swapped, StepOutcome::Applied);

    assert_eq!(index_names(&store, "playlists").await, vec!["a_1_b_1", "b_1_a_1"]);

    let again = db_init::create_index(&store, "playlists", doc! { "a": 1, "b": 1 }, false)
        .await
        .unwrap();
    assert_eq!(again, StepOutcome::AlreadyPresent);
}

#[tokio::test]
async fn double_direction_matches_integer_direction() {
    let store = MemoryStore::new();
    store
        .create_index(&IndexSpec {
            collection: catalog::PLAYLISTS.to_string(),
            keys: doc! { "owner_id": 1.0 },
            unique: false,
        })
        .await
        .unwrap();

    let outcome = db_init::create_index(&store, catalog::PLAYLISTS, doc! { "owner_id": 1 }, false)
        .await
        .unwrap();
    assert_eq!(outcome, StepOutcome::AlreadyPresent);
    assert_eq!(index_names(&store, catalog::PLAYLISTS).await, vec!["owner_id_1"]);
}

#[tokio::test]
async fn raw_create_on_existing_collection_signals_exists() {
    let store = MemoryStore::new();
    store.create_collection(&catalog::playlists()).await.unwrap();

    let err = store.create_collection(&catalog::playlists()).await.unwrap_err();
    assert!(matches!(err, BootstrapError::CollectionAlreadyExists { .. }));

    // the idempotent operation treats it as present
    let outcome = db_init::create_playlists_collection(&store).await.unwrap();
    assert_eq!(outcome, StepOutcome::AlreadyPresent);
}

#[tokio::test]
async fn existing_collection_validator_is_left_alone() {
    let store = MemoryStore::new();
    store
        .create_collection(&catalog::CollectionSpec::new(catalog::USER_PROFILES))
        .await
        .unwrap();

    let outcome = db_init::create_user_profiles_collection(&store).await.unwrap();
    assert_eq!(outcome, StepOutcome::AlreadyPresent);

    let info = store.collection(catalog::USER_PROFILES).await.unwrap().unwrap();
    assert_eq!(info.validator, None);
}

#[tokio::test]
async fn index_with_same_name_and_other_options_conflicts() {
    let store = MemoryStore::new();
    store
        .create_index(&IndexSpec::ascending(catalog::USER_PROFILES, "user_id"))
        .await
        .unwrap();

    let err = db_init::create_index(&store, catalog::USER_PROFILES, doc! { "user_id": 1 }, true)
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::IndexConflict { .. }));

    let same = db_init::create_index(&store, catalog::USER_PROFILES, doc! { "user_id": 1 }, false)
        .await
        .unwrap();
    assert_eq!(same, StepOutcome::AlreadyPresent);
}

#[tokio::test]
async fn malformed_validator_is_rejected() {
    let store = MemoryStore::new();
    let spec = catalog::CollectionSpec::new("broken").with_validator(doc! {
        "$jsonSchema": { "bsonType": "object", "properties": { "n": { "bsonType": "integer" } } }
    });

    let err = db_init::ensure_collection(&store, &spec).await.unwrap_err();
    assert!(matches!(err, BootstrapError::ValidationSchemaRejected { .. }));
    assert!(store.collection("broken").await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_definitions_never_reach_the_store() {
    let store = MemoryStore::new();

    let err = db_init::create_index(&store, "playlists", doc! { "$tags": 1 }, false)
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::InvalidDefinition(_)));

    let err = db_init::create_index(&store, "system.users", doc! { "tags": 1 }, false)
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::InvalidDefinition(_)));

    let err = db_init::create_index(&store, "playlists", doc! { "tags": "text" }, false)
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::InvalidDefinition(_)));

    assert_eq!(store.create_calls(), 0);
}

#[tokio::test]
async fn duplicate_step_ids_are_refused() {
    let store = MemoryStore::new();
    let mut steps = db_init::bootstrap_steps();
    steps[1].id = steps[0].id.clone();

    let err = db_init::run_steps(&store, &test_settings(), &steps)
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::InvalidDefinition(_)));
}

#[tokio::test]
async fn report_serializes_outcomes() {
    let store = MemoryStore::new();
    let report = db_init::run_bootstrap(&store, &test_settings()).await.unwrap();

    let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
    assert_eq!(json["backend"], "memory");
    assert_eq!(json["steps"][0]["outcome"], "applied");
    assert_eq!(json["steps"].as_array().unwrap().len(), 6);
}
