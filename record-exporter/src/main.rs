use std::env;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use record_exporter::{Dependencies, Settings};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C, running until end of input");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_tracing();

    let settings = Settings::from_env()?;
    settings.validate()?;

    let dependencies = Dependencies::new(settings).await?;
    let summary = dependencies.runner.run(shutdown_signal()).await?;

    info!(
        exported = summary.records_exported,
        position = summary.last_committed_position,
        "Record exporter stopped"
    );
    Ok(())
}
