use std::{env, time::Duration};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Settings {
    pub mongodb_uri: String,
    pub mongodb_db: String,

    // bound applied to every administrative call
    pub op_timeout: Duration,
    pub migrations_collection: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_db: "cloudmusic".to_string(),
            op_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            migrations_collection: "schema_migrations".to_string(),
        }
    }
}

pub fn load() -> Settings {
    // Loads .env if present (no crash if missing)
    dotenvy::dotenv().ok();

    let defaults = Settings::default();

    let mongodb_uri = env::var("MONGODB_URI").unwrap_or(defaults.mongodb_uri);

    let mongodb_db = env::var("MONGODB_DB").unwrap_or(defaults.mongodb_db);

    let op_timeout = env::var("BOOTSTRAP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(defaults.op_timeout);

    let migrations_collection =
        env::var("MIGRATIONS_COLLECTION").unwrap_or(defaults.migrations_collection);

    Settings {
        mongodb_uri,
        mongodb_db,
        op_timeout,
        migrations_collection,
    }
}
