use std::sync::Arc;

use axum::Router;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::AppConfig;
use crate::routes::{hub_routes, system_routes};
use crate::services::hub::HubController;

/// Build the complete Axum application:
/// - /         (hub endpoint: subscribe, unsubscribe, publish)
/// - /system   (alive, version, stats)
pub fn build_app(hub: Arc<HubController>, cfg: AppConfig) -> Router {
    Router::new()
        // POST /
        .merge(hub_routes::routes(hub.clone()))

        // /system/*
        .nest("/system", system_routes::routes(cfg, hub))

        // Logging middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;

    use super::*;
    use crate::state::subscriptions::SubscriptionStore;

    #[tokio::test]
    async fn system_routes_are_mounted() {
        let cfg = AppConfig::from_json(r#"{ "port": 8080, "server_version": "9.9.9" }"#).unwrap();
        let hub = Arc::new(HubController::from_config(&cfg, Arc::new(SubscriptionStore::in_memory())));
        let server = TestServer::new(build_app(hub, cfg)).unwrap();

        server.get("/system/alive").await.assert_text("OK");

        let version: serde_json::Value = server.get("/system/version").await.json();
        assert_eq!(version["version"], "9.9.9");

        let stats = server.get("/system/stats").await;
        stats.assert_status(StatusCode::OK);
        let stats: serde_json::Value = stats.json();
        assert_eq!(stats["subscriptions"], 0);
        assert_eq!(stats["counters"]["deliveries_failed"], 0);
    }
}
