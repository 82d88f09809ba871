use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use tokio::sync::watch;

use crate::data::{BroadcastStats, PairSnapshot, StatsSnapshot, TopicBus};
use crate::rates::PairView;

#[derive(Clone)]
pub struct ApiState {
    /// Written by the broadcast loop after each refresh.
    pub pairs: watch::Receiver<PairSnapshot>,
    pub stats: Arc<BroadcastStats>,
    pub bus: Arc<TopicBus>,
}

#[derive(Debug, Serialize)]
pub struct PairListResponse {
    pub total: usize,
    pub pairs: Vec<PairView>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub broadcast: StatsSnapshot,
    pub subscribers: usize,
}

// GET /api/pairs - Pair universe with client rates as of the last refresh
pub async fn get_pairs(State(state): State<ApiState>) -> Json<PairListResponse> {
    let pairs: PairSnapshot = state.pairs.borrow().clone();
    Json(PairListResponse {
        total: pairs.len(),
        pairs: pairs.as_ref().clone(),
    })
}

// GET /api/stats - Broadcast counters and connected subscribers
pub async fn get_stats(State(state): State<ApiState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        broadcast: state.stats.snapshot(),
        subscribers: state.bus.subscriber_count(),
    })
}

// GET /api/health - Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "fx_rate_feed",
        "timestamp": chrono::Utc::now()
    }))
}

pub fn create_api_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/pairs", get(get_pairs))
        .route("/stats", get(get_stats))
        .with_state(state);

    Router::new().nest("/api", api_routes)
}
