//! HTTP API over the reconciliation engine
//!
//! ## Route Structure
//!
//! - `GET /api/status` - Engine status, next check, last known IP
//! - `GET /api/history` - Update history, newest first
//! - `POST /api/check` - Force a check (cooldown and single-flight apply)
//! - `GET /api/check/cooldown` - Time until the next force check is allowed
//! - `GET /api/settings` - Persisted settings
//! - `PUT /api/settings` - Change poll interval and/or display theme
//!
//! Errors are JSON `{ "error": "..." }` bodies; cooldown rejections also
//! carry `retry_after_secs` and a `Retry-After` header.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use ddns_core::engine::cooldown::{ForceCheckGate, GateRejection, ceil_secs};
use ddns_core::{
    EngineStatus, ForceCheckOutcome, PollInterval, ReconciliationEngine, Settings, SettingsPatch,
    StateStore, Theme, UpdateEntry,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("force check cooling down, retry in {retry_after_secs}s")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ddns_core::Error> for ApiError {
    fn from(err: ddns_core::Error) -> Self {
        match err {
            ddns_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => {
                error!("Request failed: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after_secs = match &self {
            ApiError::TooManyRequests { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        let body = ErrorBody {
            error: self.to_string(),
            retry_after_secs,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    engine: ReconciliationEngine,
    gate: Arc<ForceCheckGate>,
    store: Arc<dyn StateStore>,
}

impl AppState {
    pub fn new(engine: ReconciliationEngine, force_check_cooldown: Duration) -> Self {
        let store = engine.state_store();
        Self {
            engine,
            gate: Arc::new(ForceCheckGate::new(force_check_cooldown)),
            store,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: EngineStatus,
    pub last_error: Option<String>,
    pub next_check_time: Option<DateTime<Utc>>,
    pub last_known_ip: Option<IpAddr>,
    pub poll_interval_minutes: u32,
    pub dns_writes_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<UpdateEntry>,
}

#[derive(Debug, Serialize)]
pub struct CooldownResponse {
    pub available: bool,
    pub remaining_secs: u64,
    pub cooldown_secs: u64,
}

/// Body of `PUT /api/settings`; at least one field is required
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub poll_interval_minutes: Option<u32>,
    #[serde(default)]
    pub display_theme: Option<String>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/status", get(get_status))
        .route("/history", get(get_history))
        .route("/check", post(force_check))
        .route("/check/cooldown", get(get_cooldown))
        .route("/settings", get(get_settings).put(update_settings));

    Router::new().nest("/api", api_routes).with_state(state)
}

async fn get_status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let snapshot = state.engine.snapshot();
    let settings = state.store.settings().await?;

    Ok(Json(StatusResponse {
        status: snapshot.status,
        last_error: snapshot.last_error,
        next_check_time: snapshot.next_check_time,
        last_known_ip: settings.last_known_ip,
        poll_interval_minutes: settings.poll_interval.minutes(),
        dns_writes_enabled: state.engine.writes_enabled(),
    }))
}

async fn get_history(State(state): State<AppState>) -> ApiResult<Json<HistoryResponse>> {
    let entries = state.store.history().await?;
    Ok(Json(HistoryResponse { entries }))
}

async fn force_check(State(state): State<AppState>) -> ApiResult<Json<ForceCheckOutcome>> {
    let now = Instant::now();
    let permit = state.gate.try_begin(now).map_err(|rejection| match rejection {
        GateRejection::CoolingDown { remaining } => ApiError::TooManyRequests {
            retry_after_secs: ceil_secs(remaining),
        },
        GateRejection::InProgress => ApiError::Conflict("check already in progress".to_string()),
    })?;

    let outcome = state.engine.force_check().await;
    if !outcome.accepted {
        debug!("Force check rejected by engine: {}", outcome.message);
        return Err(if state.engine.is_stopped() {
            ApiError::ServiceUnavailable(outcome.message)
        } else {
            ApiError::Conflict(outcome.message)
        });
    }

    permit.accept(now);
    Ok(Json(outcome))
}

async fn get_cooldown(State(state): State<AppState>) -> Json<CooldownResponse> {
    let remaining = state.gate.remaining(Instant::now());
    Json(CooldownResponse {
        available: remaining.is_none(),
        remaining_secs: remaining.map(ceil_secs).unwrap_or(0),
        cooldown_secs: state.gate.cooldown().as_secs(),
    })
}

async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<Settings>> {
    Ok(Json(state.store.settings().await?))
}

async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Json<Settings>> {
    if update.poll_interval_minutes.is_none() && update.display_theme.is_none() {
        return Err(ApiError::BadRequest(
            "expected poll_interval_minutes and/or display_theme".to_string(),
        ));
    }

    // Validate everything before applying anything
    let patch = SettingsPatch {
        poll_interval: update
            .poll_interval_minutes
            .map(PollInterval::new)
            .transpose()?,
        display_theme: update.display_theme.as_deref().map(parse_theme).transpose()?,
    };

    Ok(Json(state.store.update_settings(patch).await?))
}

fn parse_theme(value: &str) -> ApiResult<Theme> {
    match value {
        "light" => Ok(Theme::Light),
        "dark" => Ok(Theme::Dark),
        other => Err(ApiError::BadRequest(format!(
            "display_theme must be 'light' or 'dark', got '{}'",
            other
        ))),
    }
}
