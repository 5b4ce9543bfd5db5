//! Internal HTTP surface used by the ledger and operators.
//!
//! Everything under `/internal` requires `x-internal-api-key`; `/health`
//! is open for liveness probes.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{CustodyPolicy, SecretString};
use crate::engine::EngineStats;
use crate::keys::KeyDerivationService;
use crate::lifecycle::shutdown::Shutdown;
use crate::pricing::PriceCache;
use crate::store::MemoryStore;
use crate::sweep::ReclaimQueue;

use self::auth::internal_auth_middleware;
use self::handlers::*;

/// Shared state injected into handlers.
#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<MemoryStore>,
    pub policy: Arc<CustodyPolicy>,
    pub keys: Option<Arc<KeyDerivationService>>,
    pub stats: Arc<EngineStats>,
    pub price: Arc<PriceCache>,
    pub reclaims: Option<Arc<ReclaimQueue>>,
    pub api_key: Option<SecretString>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    let internal = Router::new()
        .route("/internal/status", get(get_status))
        .route("/internal/deposits", get(list_deposits))
        .route("/internal/deposits/{id}/credited", post(mark_credited))
        .route("/internal/addresses", post(provision))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            internal_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(internal)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        .with_state(state)
}

/// Serve the internal API until `shutdown` fires.
pub async fn serve(listener: TcpListener, state: AdminState, shutdown: Shutdown) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Internal API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

    tracing::info!("Internal API stopped");
    Ok(())
}
