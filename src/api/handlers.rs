//! Request Handlers
//!
//! Thin adapters: decode, call `MinesService` with the authenticated user,
//! encode. No game rules live here.

use super::{
    auth::{AuthUser, Authenticator},
    errors::ApiError,
    middleware::RequestId,
    models::*,
};
use crate::{
    games::{RoundId, RoundSnapshot},
    service::{MinesService, PlayerProfile},
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub service: Arc<MinesService>,
    pub authenticator: Arc<dyn Authenticator>,
    pub version: String,
}

impl AppState {
    pub fn new(service: Arc<MinesService>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            service,
            authenticator,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn decode<T>(request_id: &RequestId, payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::bad_request(request_id.0.clone(), e.body_text()))
}

fn decode_query<T>(request_id: &RequestId, query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(q)| q)
        .map_err(|e| ApiError::bad_request(request_id.0.clone(), e.body_text()))
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.version.clone(),
    })
}

/// GET /api/me
pub async fn profile_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<PlayerProfile>, ApiError> {
    state
        .service
        .profile(&user)
        .await
        .map(Json)
        .map_err(|e| ApiError::casino(request_id.0, e))
}

/// POST /api/topup
pub async fn top_up_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<PlayerProfile>, ApiError> {
    state
        .service
        .top_up(&user)
        .await
        .map(Json)
        .map_err(|e| ApiError::casino(request_id.0, e))
}

/// GET /api/mines/odds?bet=&mines=
pub async fn odds_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    query: Result<Query<OddsQuery>, QueryRejection>,
) -> Result<Json<OddsResponse>, ApiError> {
    let OddsQuery { bet, mines } = decode_query(&request_id, query)?;
    let steps = state
        .service
        .odds(bet, mines)
        .map_err(|e| ApiError::casino(request_id.0, e))?;
    Ok(Json(OddsResponse { bet, mines, steps }))
}

/// POST /api/mines/rounds
pub async fn start_round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<StartRoundRequest>, JsonRejection>,
) -> Result<Json<RoundSnapshot>, ApiError> {
    let request = decode(&request_id, payload)?;
    state
        .service
        .start_round(&user, request.bet, request.mines)
        .await
        .map(Json)
        .map_err(|e| ApiError::casino(request_id.0, e))
}

/// GET /api/mines/rounds
pub async fn active_rounds_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Json<ActiveRoundsResponse> {
    Json(ActiveRoundsResponse {
        rounds: state.service.active_rounds(&user),
    })
}

/// GET /api/mines/rounds/:round_id
pub async fn round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(round_id): Path<String>,
) -> Result<Json<RoundSnapshot>, ApiError> {
    state
        .service
        .round(&user, &RoundId::from(round_id.as_str()))
        .await
        .map(Json)
        .map_err(|e| ApiError::casino(request_id.0, e))
}

/// POST /api/mines/rounds/:round_id/reveal
pub async fn reveal_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(round_id): Path<String>,
    payload: Result<Json<RevealRequest>, JsonRejection>,
) -> Result<Json<RoundSnapshot>, ApiError> {
    let request = decode(&request_id, payload)?;
    state
        .service
        .reveal(&user, &RoundId::from(round_id.as_str()), request.index)
        .await
        .map(Json)
        .map_err(|e| ApiError::casino(request_id.0, e))
}

/// POST /api/mines/rounds/:round_id/cashout
pub async fn cash_out_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(round_id): Path<String>,
) -> Result<Json<RoundSnapshot>, ApiError> {
    state
        .service
        .cash_out(&user, &RoundId::from(round_id.as_str()))
        .await
        .map(Json)
        .map_err(|e| ApiError::casino(request_id.0, e))
}

/// GET /api/mines/history?limit=
pub async fn history_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let HistoryQuery { limit } = decode_query(&request_id, query)?;
    let rounds = state
        .service
        .history(&user, limit)
        .map_err(|e| ApiError::casino(request_id.0, e))?;
    Ok(Json(HistoryResponse { rounds }))
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.service.metrics().render(),
    )
}
