//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Liveness, metrics and integrity
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/rng/health", get(rng_health_handler))

        .route("/games", get(games_handler))

        // Sessions and play
        .route("/sessions", post(start_session_handler))
        .route("/sessions/:id", get(session_handler))
        .route("/sessions/:id/play", post(play_handler))
        .route("/sessions/:id/end", post(end_session_handler))

        // Wallet and recall
        .route("/players/:id/balance", get(balance_handler))
        .route("/players/:id/transactions", get(transactions_handler))
        .route("/players/:id/deposit", post(deposit_handler))
        .route("/players/:id/withdraw", post(withdraw_handler))
        .route("/players/:id/history", get(history_handler))
        .route("/players/:id/interrupted", get(interrupted_handler))

        // Interrupted game recovery
        .route("/cycles/:id", get(cycle_handler))
        .route("/cycles/:id/interrupt", post(interrupt_handler))
        .route("/cycles/:id/void", post(void_handler))
        .route("/cycles/:id/resume", post(resume_handler))

        .with_state(state)
}
