use std::process::ExitCode;

use cloudmusic_schema::{
    config,
    error::BootstrapError,
    services::db_init::{self, BootstrapReport, COMPLETION_MESSAGE},
    store::MongoStore,
};

async fn run(settings: &config::Settings) -> Result<BootstrapReport, BootstrapError> {
    let store = MongoStore::connect(settings).await?;
    db_init::run_bootstrap(&store, settings).await
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let settings = config::load();
    tracing::info!(
        "bootstrapping database {} (timeout {:?}, ledger {})",
        settings.mongodb_db,
        settings.op_timeout,
        settings.migrations_collection
    );

    match run(&settings).await {
        Ok(report) => {
            tracing::info!("report: {}", report.to_json());
            println!("{}", COMPLETION_MESSAGE);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("bootstrap failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
