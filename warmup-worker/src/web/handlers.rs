//! HTTP endpoint handlers.
//!
//! Each handler runs its operation to completion before responding. Error
//! bodies carry short fixed messages; inner error text only goes to the log.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::WarmupError;
use crate::inbound::{InboundEvent, InboundOutcome, InboundProcessor};
use crate::limits::LimitUpdater;
use crate::mailer::Mailer;
use crate::models::DailyStat;
use crate::scheduler::{CyclePolicy, Scheduler};
use crate::stats::{DomainOverview, StatsLedger};
use crate::store::WarmupStore;
use crate::util::Chance;
use crate::web::signature::{
    constant_time_compare, is_signature_verification_enabled, verify_svix_signature,
};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub scheduler: Scheduler,
    pub limits: LimitUpdater,
    pub inbound: InboundProcessor,
    pub stats: StatsLedger,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn WarmupStore>,
        mailer: Arc<dyn Mailer>,
        chance: Arc<dyn Chance>,
    ) -> Self {
        let policy = CyclePolicy::from(&config);
        Self {
            config: Arc::new(config),
            scheduler: Scheduler::new(store.clone(), mailer, chance, policy),
            limits: LimitUpdater::new(store.clone()),
            inbound: InboundProcessor::new(store.clone()),
            stats: StatsLedger::new(store),
        }
    }
}

// =============================================================================
// Health Checks
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: None,
        timestamp: None,
    })
}

pub async fn webhook_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: Some("Warmup webhook endpoint is active"),
        timestamp: None,
    })
}

pub async fn cron_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: Some("Warmup cron endpoint is active"),
        timestamp: Some(Utc::now().to_rfc3339()),
    })
}

// =============================================================================
// Inbound Webhook
// =============================================================================

const SVIX_ID: &str = "svix-id";
const SVIX_TIMESTAMP: &str = "svix-timestamp";
const SVIX_SIGNATURE: &str = "svix-signature";

/// Webhook response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<Uuid>,
}

impl WebhookResponse {
    fn failed(status: StatusCode, message: &'static str) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                success: false,
                message,
                thread_id: None,
            }),
        )
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Inbound email webhook.
///
/// The signature is verified against the raw body before anything is parsed
/// or written.
pub async fn inbound_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !is_signature_verification_enabled(&state.config.webhook_secret) {
        error!("webhook_secret_not_configured");
        return WebhookResponse::failed(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook secret not configured",
        );
    }
    let secret = state.config.webhook_secret.as_deref().unwrap_or_default();

    let (Some(id), Some(timestamp), Some(signature)) = (
        header(&headers, SVIX_ID),
        header(&headers, SVIX_TIMESTAMP),
        header(&headers, SVIX_SIGNATURE),
    ) else {
        warn!(body_length = body.len(), "webhook_headers_missing");
        return WebhookResponse::failed(StatusCode::BAD_REQUEST, "Missing webhook headers");
    };

    if let Err(e) = verify_svix_signature(
        secret,
        id,
        timestamp,
        signature,
        &body,
        state.config.webhook_signature_max_age,
    ) {
        warn!(svix_id = %id, error = %e, "webhook_signature_invalid");
        return WebhookResponse::failed(StatusCode::BAD_REQUEST, "Invalid signature");
    }

    let event: InboundEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(svix_id = %id, error = %e, "webhook_payload_invalid");
            return WebhookResponse::failed(StatusCode::BAD_REQUEST, "Invalid payload");
        }
    };

    match state.inbound.process(event).await {
        Ok(InboundOutcome::Ignored { reason }) => (
            StatusCode::OK,
            Json(WebhookResponse {
                success: true,
                message: reason,
                thread_id: None,
            }),
        ),
        Ok(InboundOutcome::Recorded { thread_id, .. }) => (
            StatusCode::OK,
            Json(WebhookResponse {
                success: true,
                message: "Email processed",
                thread_id: Some(thread_id),
            }),
        ),
        Err(WarmupError::Validation(e)) => {
            warn!(svix_id = %id, error = %e, "webhook_payload_invalid");
            WebhookResponse::failed(StatusCode::BAD_REQUEST, "Invalid payload")
        }
        Err(e) => {
            error!(svix_id = %id, error = %e, "webhook_processing_failed");
            WebhookResponse::failed(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

// =============================================================================
// Cron Trigger
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronResponse {
    pub success: bool,
    pub emails_sent: u32,
    pub errors: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: &'static str,
}

impl ErrorResponse {
    fn new(status: StatusCode, error: &'static str) -> axum::response::Response {
        (
            status,
            Json(Self {
                success: false,
                error,
            }),
        )
            .into_response()
    }
}

/// Cron endpoint: ramp limits, then run one cycle.
pub async fn cron_warmup(State(state): State<AppState>, headers: HeaderMap) -> axum::response::Response {
    let Some(secret) = state.config.cron_secret.as_deref().filter(|s| !s.is_empty()) else {
        error!("cron_secret_not_configured");
        return ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Cron secret not configured");
    };

    let expected = format!("Bearer {secret}");
    let authorized = header(&headers, AUTHORIZATION.as_str())
        .map(|provided| constant_time_compare(provided, &expected))
        .unwrap_or(false);
    if !authorized {
        warn!("cron_unauthorized");
        return ErrorResponse::new(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    info!("cron_triggered");

    if let Err(e) = state.limits.update_limits().await {
        error!(error = %e, "warmup_limit_update_failed");
    }

    // Cycle failures are reported in the body; the request itself succeeded.
    let result = state.scheduler.run_cycle().await;

    (
        StatusCode::OK,
        Json(CronResponse {
            success: result.success,
            emails_sent: result.emails_sent,
            errors: result.errors,
            timestamp: Utc::now().to_rfc3339(),
        }),
    )
        .into_response()
}

// =============================================================================
// Stats
// =============================================================================

const DEFAULT_STATS_DAYS: u32 = 7;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub domain: Option<String>,
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StatsData {
    pub overview: Vec<DomainOverview>,
    pub stats: Vec<DailyStat>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub data: StatsData,
}

/// Per-domain overview plus the trailing window of daily rows.
pub async fn warmup_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> axum::response::Response {
    let days = query.days.unwrap_or(DEFAULT_STATS_DAYS);
    let domain = query.domain.as_deref().filter(|d| !d.is_empty());

    let overview = match state.stats.domain_overview().await {
        Ok(overview) => overview,
        Err(e) => {
            error!(error = %e, "warmup_stats_overview_failed");
            return ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch stats");
        }
    };

    let stats = match state.stats.list(domain, days).await {
        Ok(stats) => stats,
        Err(e) => {
            error!(error = %e, "warmup_stats_list_failed");
            return ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch stats");
        }
    };

    Json(StatsResponse {
        success: true,
        data: StatsData { overview, stats },
    })
    .into_response()
}
