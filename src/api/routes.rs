//! Route Definitions

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        // Account
        .route("/api/me", get(profile_handler))
        .route("/api/topup", post(top_up_handler))
        // Mines
        .route("/api/mines/odds", get(odds_handler))
        .route(
            "/api/mines/rounds",
            get(active_rounds_handler).post(start_round_handler),
        )
        .route("/api/mines/rounds/:round_id", get(round_handler))
        .route("/api/mines/rounds/:round_id/reveal", post(reveal_handler))
        .route("/api/mines/rounds/:round_id/cashout", post(cash_out_handler))
        .route("/api/mines/history", get(history_handler))
        .with_state(state)
}
