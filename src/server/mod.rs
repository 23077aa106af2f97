//! HTTP surface over the detection and selection pipelines.

pub mod handlers;
pub mod payloads;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::core::store::{FsRouteStore, RouteStore};
use crate::detection::{DetectionService, HoldDetector, RoboflowDetector};
use crate::route::{
    DuplicateMatcher, GeminiComparator, RouteComparator, RouteRenderer, SelectionOrchestrator,
};
use crate::worker::WorkerPool;

pub const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Shared services behind every request.
pub struct AppState<D, S, C> {
    pub detection: DetectionService<D>,
    pub orchestrator: SelectionOrchestrator<S, C>,
    pub pool: WorkerPool,
}

impl<D, S, C> AppState<D, S, C> {
    pub fn new(
        detection: DetectionService<D>,
        orchestrator: SelectionOrchestrator<S, C>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            detection,
            orchestrator,
            pool,
        }
    }
}

pub type DefaultState = AppState<RoboflowDetector, FsRouteStore, GeminiComparator>;

/// Wire the hosted detector, comparator and on-disk store from `config`.
pub async fn build_state(config: &Config) -> anyhow::Result<DefaultState> {
    let pool = WorkerPool::new(config.workers);
    tracing::info!(workers = pool.size(), routes_dir = %config.routes_dir.display(), "building service state");
    let store = Arc::new(FsRouteStore::open(&config.routes_dir).await?);

    let detection = DetectionService::new(Arc::new(config.detector()?), pool.clone())
        .with_canonical_size(config.canonical_size)
        .with_min_confidence(config.min_confidence);
    let renderer = RouteRenderer::new(config.annotator()?).with_recolor(!config.trust_client_colors);
    let matcher = DuplicateMatcher::new(Arc::new(config.comparator()?), pool.clone())
        .with_policy(config.match_policy());
    let orchestrator = SelectionOrchestrator::new(renderer, matcher, store, pool.clone());

    Ok(AppState::new(detection, orchestrator, pool))
}

pub fn build_router<D, S, C>(state: Arc<AppState<D, S, C>>) -> Router
where
    D: HoldDetector,
    S: RouteStore,
    C: RouteComparator,
{
    Router::new()
        .route("/", get(handlers::root))
        .route("/detect-holds", post(handlers::detect_holds::<D, S, C>))
        .route("/select/:submission_id", post(handlers::select_holds::<D, S, C>))
        .route("/routes", get(handlers::list_routes::<D, S, C>))
        .route("/routes/images/:filename", get(handlers::route_image::<D, S, C>))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `addr` until ctrl-c.
pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
