use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use transit_collector::config::{AppConfig, VaultProvider};
use transit_collector::cycle::CycleDeps;
use transit_collector::gate::TimeGate;
use transit_collector::scheduler::{self, SchedulerConfig};
use transit_collector::sources::{self, SourceFetcher};
use transit_collector::table_store::SqliteTableStore;
use transit_collector::vault::{EnvSecretProvider, KeyVaultClient, SecretNames, SecretProvider};
use transit_collector::version::{NAME, VERSION};
use transit_collector::writer::TableTarget;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = AppConfig::load()?;
    tracing::info!(name = NAME, version = VERSION, "starting collector");

    let timeout = Duration::from_secs(app_config.http.timeout_secs);
    let secrets: Arc<dyn SecretProvider> = match app_config.vault.provider {
        VaultProvider::Azure => Arc::new(KeyVaultClient::from_config(&app_config.vault, timeout)?),
        VaultProvider::Env => Arc::new(EnvSecretProvider),
    };

    let deps = Arc::new(CycleDeps {
        gate: TimeGate::from_config(&app_config.schedule)?,
        secrets,
        secret_names: SecretNames::from_config(&app_config.vault),
        fetcher: SourceFetcher::new(timeout)?,
        endpoints: sources::catalog(&app_config.sources),
        store: Arc::new(SqliteTableStore::new()),
        target: TableTarget::from_config(&app_config.storage),
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let scheduler_handle = scheduler::spawn(
        deps,
        SchedulerConfig::from_config(&app_config.schedule)?,
        shutdown_rx,
    );
    tracing::info!(cron = %app_config.schedule.cron, "collection scheduled");

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    tracing::info!("Received shutdown signal");
    let _ = shutdown_tx.send(());
    let _ = scheduler_handle.await;

    Ok(())
}
