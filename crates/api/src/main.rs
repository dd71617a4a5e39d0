//! API server entry point.

use std::sync::Arc;

use api::StartupError;
use api::config::{Config, LogFormat};
use domain::Catalog;
use metrics_exporter_prometheus::PrometheusHandle;
use movement_store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve<S: LedgerStore + 'static, C: Catalog + 'static>(
    store: Arc<S>,
    catalog: Arc<C>,
    config: &Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), StartupError> {
    let state = api::create_state(Arc::clone(&store), catalog, config);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // In-flight requests have drained; release the store either way.
    store.close().await;
    served?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Catalog collaborator
    let catalog = Arc::new(api::load_catalog(&config).await?);

    // 4. Ledger store, then serve
    match &config.database_url {
        Some(url) => {
            let store = PostgresLedgerStore::connect(url, config.database_max_connections)
                .await?
                .with_lock_timeout(config.commit_timeout);
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL ledger store");
            serve(Arc::new(store), catalog, &config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set; movements are kept in memory only");
            serve(Arc::new(InMemoryLedgerStore::new()), catalog, &config, metrics_handle).await
        }
    }
}
