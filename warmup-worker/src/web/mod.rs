//! HTTP surface of the warmup engine.
//!
//! - Inbound webhook from the delivery provider (Svix-signed)
//! - Cron trigger for one warmup cycle (bearer-authenticated)
//! - Stats read API and health checks

pub mod handlers;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    cron_health, cron_warmup, health, inbound_webhook, warmup_stats, webhook_health, AppState,
    CronResponse, HealthResponse, StatsQuery, StatsResponse, WebhookResponse,
};
pub use signature::{is_signature_verification_enabled, verify_svix_signature};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/webhooks/resend/warmup",
            post(inbound_webhook).get(webhook_health),
        )
        .route("/api/cron/warmup", post(cron_warmup).get(cron_health))
        .route("/api/warmup/stats", get(warmup_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
