use std::sync::Arc;

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::config::AppConfig;
use crate::services::hub::HubController;

#[derive(Clone)]
pub struct SystemState {
    pub config: AppConfig,
    pub hub: Arc<HubController>,
}

pub fn routes(config: AppConfig, hub: Arc<HubController>) -> Router {
    Router::new()
        .route("/alive", get(is_alive))
        .route("/version", get(version))
        .route("/stats", get(stats))
        .with_state(SystemState { config, hub })
}

/// GET /system/alive
async fn is_alive() -> &'static str {
    "OK"
}

/// GET /system/version
async fn version(State(state): State<SystemState>) -> Json<serde_json::Value> {
    Json(json!({
        "version": state.config.server_version
    }))
}

/// GET /system/stats
async fn stats(State(state): State<SystemState>) -> Json<serde_json::Value> {
    let store = state.hub.store();
    let counters = state.hub.stats().snapshot();

    Json(json!({
        "topics": store.topic_count(),
        "subscriptions": store.subscription_count(),
        "counters": counters,
    }))
}
