//! HTTP API server with observability for the inventory ledger.
//!
//! Provides REST endpoints for submitting movements, reading balances and
//! history, reservations, drift audits, and an SSE change feed, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::{Catalog, DomainError, InMemoryCatalog};
use ledger::MovementLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use movement_store::{LedgerStore, StoreError};
use projections::{BalanceProjector, ChangeFeed, StockQueries};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load catalog: {0}")]
    Catalog(#[from] DomainError),

    #[error("failed to open ledger store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: LedgerStore + 'static, C: Catalog + 'static>(
    state: Arc<AppState<S, C>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/movements", post(routes::movements::create::<S, C>))
        .route("/movements/{id}", get(routes::movements::get::<S, C>))
        .route(
            "/transfers/{correlation_id}",
            get(routes::movements::transfer_legs::<S, C>),
        )
        .route("/balances", get(routes::balances::list::<S, C>))
        .route("/items/{id}", get(routes::balances::item_detail::<S, C>))
        .route(
            "/items/{id}/balances",
            get(routes::balances::item_balances::<S, C>),
        )
        .route(
            "/items/{id}/movements",
            get(routes::balances::item_movements::<S, C>),
        )
        .route(
            "/items/{id}/warehouses/{warehouse_id}/balance",
            get(routes::balances::key_balance::<S, C>),
        )
        .route(
            "/items/{id}/warehouses/{warehouse_id}/rebuild",
            post(routes::audit::rebuild::<S, C>),
        )
        .route("/reservations", post(routes::reservations::reserve::<S, C>))
        .route(
            "/reservations/release",
            post(routes::reservations::release::<S, C>),
        )
        .route("/audit/drift", get(routes::audit::drift::<S, C>))
        .route("/feed", get(routes::feed::subscribe::<S, C>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the projector, ledger, feed and query layer over a store and catalog.
pub fn create_state<S: LedgerStore + 'static, C: Catalog + 'static>(
    store: Arc<S>,
    catalog: Arc<C>,
    config: &Config,
) -> Arc<AppState<S, C>> {
    let projector = BalanceProjector::with_policy(Arc::clone(&store), config.commit_policy());
    let feed = ChangeFeed::new(config.feed_capacity);
    let ledger = MovementLedger::new(projector, Arc::clone(&catalog), feed);
    let queries = StockQueries::new(store, catalog);

    Arc::new(AppState { ledger, queries })
}

/// Loads the catalog named by `CATALOG_FILE`, or starts with an empty one.
pub async fn load_catalog(config: &Config) -> Result<InMemoryCatalog, StartupError> {
    match &config.catalog_file {
        Some(path) => {
            let catalog = InMemoryCatalog::from_file(path).await?;
            tracing::info!(path = %path.display(), "catalog loaded");
            Ok(catalog)
        }
        None => {
            tracing::warn!("CATALOG_FILE not set; every movement will reference an unknown item");
            Ok(InMemoryCatalog::new())
        }
    }
}
