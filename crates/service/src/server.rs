//! HTTP API.
//!
//! JSON endpoints over the registry, the session manager and the swap gate.
//! The caller identity comes from the `x-caller` header and is trusted as
//! already authenticated by the transport in front of this service.
//!
//! ## Endpoints
//!
//! - `GET /health`, `GET /status`
//! - `GET|PUT /tokens/:token`, `POST /tokens/batch`
//! - `POST /auth`, `POST /owner`
//! - `GET /gate?token_a=..&token_b=..`
//! - `POST /sessions`, `GET /sessions/:id`, `GET|POST /sessions/:id/actions`,
//!   `GET /sessions/:id/valid`, `POST /sessions/:id/settle`,
//!   `POST /sessions/:id/cleanup`, `GET /users/:user/session`

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use rg_core::config::GateMode;
use rg_core::types::{Identity, SessionId, TokenId};
use rg_gate::{GateDecision, RiskReason};
use rg_registry::{RegistryError, RiskRecord, ScoreUpdate};
use rg_session::{ActionType, Session, SessionAction, SessionError};

use crate::engine::SharedState;

/// Header carrying the authenticated caller address.
pub const CALLER_HEADER: &str = "x-caller";

// ── Errors ─────────────────────────────────────────────────────────────

/// Failures surfaced to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The operation was applied in memory but its events are not yet
    /// durable. They stay queued and are written by the next flush.
    #[error("change applied but not persisted: {0:#}")]
    Journal(anyhow::Error),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            Self::Registry(RegistryError::Unauthorized { .. })
            | Self::Session(SessionError::Unauthorized { .. }) => "unauthorized",
            Self::Registry(RegistryError::OutOfRange { .. }) => "out_of_range",
            Self::Registry(RegistryError::InvalidKey { .. })
            | Self::Session(SessionError::InvalidKey { .. }) => "invalid_key",
            Self::Session(SessionError::NotActive { .. }) => "not_active",
            Self::Session(SessionError::Expired { .. }) => "expired",
            Self::Session(SessionError::LimitReached { .. }) => "limit_reached",
            Self::Session(SessionError::NotExpired { .. }) => "not_expired",
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Journal(_) => "journal_unavailable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Registry(RegistryError::Unauthorized { .. })
            | Self::Session(SessionError::Unauthorized { .. }) => StatusCode::FORBIDDEN,
            Self::Registry(RegistryError::OutOfRange { .. } | RegistryError::InvalidKey { .. })
            | Self::Session(SessionError::InvalidKey { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Session(
                SessionError::NotActive { .. }
                | SessionError::Expired { .. }
                | SessionError::LimitReached { .. }
                | SessionError::NotExpired { .. },
            ) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Journal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_address(what: &str, raw: &str) -> Result<Address, ApiError> {
    raw.parse::<Address>()
        .map_err(|e| ApiError::BadRequest(format!("invalid {} '{}': {}", what, raw, e)))
}

fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    raw.parse::<B256>()
        .map_err(|e| ApiError::BadRequest(format!("invalid session id '{}': {}", raw, e)))
}

fn caller(headers: &HeaderMap) -> Result<Identity, ApiError> {
    let raw = headers
        .get(CALLER_HEADER)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {} header", CALLER_HEADER)))?
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("{} header is not ASCII", CALLER_HEADER)))?;
    parse_address("caller", raw)
}

/// Persist whatever the last operation emitted.
///
/// A journal failure cannot undo the in-memory change, so the request fails
/// with 500 and the events stay queued for the next flush.
fn flush(state: &SharedState) -> Result<(), ApiError> {
    state.flush_events().map(|_| ()).map_err(|e| {
        tracing::error!(
            error = %format!("{:#}", e),
            pending = state.pending_events(),
            "event journal write failed"
        );
        ApiError::Journal(e)
    })
}

// ── Request / response bodies ──────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub owner: Address,
    pub tokens: usize,
    pub active_sessions: usize,
    pub gate_mode: GateMode,
    pub high_threshold: u8,
    pub medium_threshold: u8,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: TokenId,
    pub exists: bool,
    pub record: RiskRecord,
    pub composite: u8,
    pub data_age_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub holder_concentration: u32,
    pub liquidity_ownership: u32,
    pub governance_capture: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    pub entries: Vec<ScoreUpdate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub updated: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthRequest {
    pub identity: Address,
    pub authorized: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OwnerRequest {
    pub new_owner: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct GateQuery {
    pub token_a: String,
    pub token_b: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GateResponse {
    pub should_block: bool,
    pub token: TokenId,
    pub score: u8,
    pub reason: RiskReason,
    pub message: String,
    pub mode: GateMode,
}

impl From<GateDecision> for GateResponse {
    fn from(d: GateDecision) -> Self {
        Self {
            should_block: d.should_block,
            token: d.token,
            score: d.score,
            reason: d.reason,
            message: d.reason.message().to_string(),
            mode: d.mode,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionIdResponse {
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidResponse {
    pub valid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action_type: ActionType,
    pub token: TokenId,
    #[serde(default)]
    pub payload: Bytes,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettleRequest {
    pub final_state_hash: B256,
}

// ── Handlers ───────────────────────────────────────────────────────────

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn status_handler(State(state): State<Arc<SharedState>>) -> Json<StatusResponse> {
    let thresholds = state.gate.thresholds();
    Json(StatusResponse {
        owner: state.registry.owner(),
        tokens: state.registry.token_count(),
        active_sessions: state.sessions.active_count(),
        gate_mode: state.gate.mode(),
        high_threshold: thresholds.high(),
        medium_threshold: thresholds.medium(),
    })
}

fn token_response(state: &SharedState, token: TokenId) -> TokenResponse {
    let record = state.registry.read(&token);
    TokenResponse {
        token,
        exists: record.exists(),
        record,
        composite: record.composite_score(),
        data_age_secs: state.registry.data_age(&token),
    }
}

/// `GET /tokens/:token`
async fn read_token_handler(
    State(state): State<Arc<SharedState>>,
    Path(token): Path<String>,
) -> ApiResult<TokenResponse> {
    let token = parse_address("token", &token)?;
    Ok(Json(token_response(&state, token)))
}

/// `PUT /tokens/:token`
async fn update_token_handler(
    State(state): State<Arc<SharedState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> ApiResult<TokenResponse> {
    let Json(req) = body?;
    let token = parse_address("token", &token)?;
    let caller = caller(&headers)?;
    state.registry.update(
        token,
        req.holder_concentration,
        req.liquidity_ownership,
        req.governance_capture,
        caller,
    )?;
    flush(&state)?;
    Ok(Json(token_response(&state, token)))
}

/// `POST /tokens/batch`
async fn batch_update_handler(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> ApiResult<BatchResponse> {
    let Json(req) = body?;
    let caller = caller(&headers)?;
    let records = state.registry.update_batch(&req.entries, caller)?;
    flush(&state)?;
    Ok(Json(BatchResponse {
        updated: records.len(),
    }))
}

/// `POST /auth`
async fn set_authorized_handler(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    body: Result<Json<AuthRequest>, JsonRejection>,
) -> ApiResult<AckResponse> {
    let Json(req) = body?;
    let caller = caller(&headers)?;
    state
        .registry
        .set_authorized(req.identity, req.authorized, caller)?;
    flush(&state)?;
    Ok(Json(AckResponse {
        status: "ok".to_string(),
    }))
}

/// `POST /owner`
async fn transfer_ownership_handler(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    body: Result<Json<OwnerRequest>, JsonRejection>,
) -> ApiResult<AckResponse> {
    let Json(req) = body?;
    let caller = caller(&headers)?;
    state.registry.transfer_ownership(req.new_owner, caller)?;
    flush(&state)?;
    Ok(Json(AckResponse {
        status: "ok".to_string(),
    }))
}

/// `GET /gate?token_a=..&token_b=..`
async fn gate_handler(
    State(state): State<Arc<SharedState>>,
    Query(query): Query<GateQuery>,
) -> ApiResult<GateResponse> {
    let token_a = parse_address("token_a", &query.token_a)?;
    let token_b = parse_address("token_b", &query.token_b)?;
    let decision = state.gate.decide(token_a, token_b);
    flush(&state)?;
    Ok(Json(decision.into()))
}

/// `POST /sessions`: start a session for the caller.
async fn start_session_handler(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<SessionIdResponse>), ApiError> {
    let user = caller(&headers)?;
    let id = state.sessions.start(user)?;
    flush(&state)?;
    Ok((
        StatusCode::CREATED,
        Json(SessionIdResponse {
            session_id: Some(id),
        }),
    ))
}

/// `GET /sessions/:id`
async fn get_session_handler(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> ApiResult<Session> {
    let id = parse_session_id(&id)?;
    state
        .sessions
        .get_session(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("session {}", id)))
}

/// `GET /sessions/:id/actions`
async fn get_actions_handler(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<SessionAction>> {
    let id = parse_session_id(&id)?;
    Ok(Json(state.sessions.get_session_actions(&id)))
}

/// `POST /sessions/:id/actions`
async fn record_action_handler(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    let id = parse_session_id(&id)?;
    let caller = caller(&headers)?;
    state
        .sessions
        .record_action(id, req.action_type, req.token, req.payload, caller)?;
    flush(&state)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /sessions/:id/valid`
async fn is_valid_handler(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> ApiResult<ValidResponse> {
    let id = parse_session_id(&id)?;
    Ok(Json(ValidResponse {
        valid: state.sessions.is_valid(&id),
    }))
}

/// `POST /sessions/:id/settle`
async fn settle_handler(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<SettleRequest>, JsonRejection>,
) -> ApiResult<Session> {
    let Json(req) = body?;
    let id = parse_session_id(&id)?;
    let caller = caller(&headers)?;
    let settled = state.sessions.settle(id, req.final_state_hash, caller)?;
    flush(&state)?;
    Ok(Json(settled))
}

/// `POST /sessions/:id/cleanup`. Anyone may clean up.
async fn cleanup_handler(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> ApiResult<Session> {
    let id = parse_session_id(&id)?;
    let ended = state.sessions.cleanup_expired(id)?;
    flush(&state)?;
    Ok(Json(ended))
}

/// `GET /users/:user/session`
async fn user_session_handler(
    State(state): State<Arc<SharedState>>,
    Path(user): Path<String>,
) -> ApiResult<SessionIdResponse> {
    let user = parse_address("user", &user)?;
    Ok(Json(SessionIdResponse {
        session_id: state.sessions.get_user_active_session(&user),
    }))
}

/// Build the full API router.
pub fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/tokens/batch", post(batch_update_handler))
        .route(
            "/tokens/:token",
            get(read_token_handler).put(update_token_handler),
        )
        .route("/auth", post(set_authorized_handler))
        .route("/owner", post(transfer_ownership_handler))
        .route("/gate", get(gate_handler))
        .route("/sessions", post(start_session_handler))
        .route("/sessions/:id", get(get_session_handler))
        .route(
            "/sessions/:id/actions",
            get(get_actions_handler).post(record_action_handler),
        )
        .route("/sessions/:id/valid", get(is_valid_handler))
        .route("/sessions/:id/settle", post(settle_handler))
        .route("/sessions/:id/cleanup", post(cleanup_handler))
        .route("/users/:user/session", get(user_session_handler))
        .with_state(state)
}

/// Bind and serve until `cancel` fires.
pub async fn run_server(
    state: Arc<SharedState>,
    port: u16,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "HTTP server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await?;

    Ok(())
}
