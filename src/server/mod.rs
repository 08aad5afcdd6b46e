// HTTP surface - router and shared state

pub mod handlers;
pub mod health;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;

use crate::resolver::cache::MetadataCache;
use crate::resolver::orchestrator::FallbackOrchestrator;

pub use handlers::{ApiError, InfoResponse};
pub use health::{HealthProbe, HealthReport, ServiceStatus};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<FallbackOrchestrator>,
    pub cache: Arc<MetadataCache>,
    pub health: Arc<HealthProbe>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(orchestrator: FallbackOrchestrator, cache: MetadataCache, health: HealthProbe) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            cache: Arc::new(cache),
            health: Arc::new(health),
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/resolve-info/{content_id}", get(handlers::resolve_info))
        .route("/resolve-info", get(handlers::missing_id))
        .route("/resolve-info/", get(handlers::missing_id))
        .route("/stream/{content_id}", get(handlers::stream))
        .route("/stream", get(handlers::missing_id))
        .route("/stream/", get(handlers::missing_id))
        .route("/health", get(handlers::health))
        .with_state(state)
}
