//! Request Handlers
//!
//! Thin adapters from HTTP onto the engine, ledger and integrity monitor.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::{
    common::{money::Money, types::Transaction},
    control::GamingControl,
    engine::{new_cycle_id, GameCycle, GameEngine, GameError, GameSession, PlayRequest, PlayResult},
    errors::RgsError,
    integrity::HealthMonitor,
    ledger::Ledger,
    metrics::EngineMetrics,
    rng::HealthReport,
    services::ServiceContainer,
};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use std::{sync::Arc, time::Duration};
use tracing::{error, warn};
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    pub engine: Arc<GameEngine>,
    pub ledger: Arc<Ledger>,
    pub monitor: Arc<HealthMonitor>,
    pub control: Arc<GamingControl>,
    pub metrics: Arc<EngineMetrics>,
    pub currency: String,
    pub play_timeout: Duration,
    pub version: String,
}

impl AppState {
    pub fn from_services(services: &ServiceContainer) -> Self {
        Self {
            engine: services.engine(),
            ledger: services.ledger(),
            monitor: services.monitor(),
            control: services.control(),
            metrics: services.metrics(),
            currency: services.config().game.currency.clone(),
            play_timeout: services.config().play_timeout(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn core_error<E: Into<RgsError>>(request_id: &RequestId) -> impl FnOnce(E) -> ApiError + '_ {
    move |err| ApiError::from_core(request_id.0.clone(), err.into())
}

/// Liveness plus the last periodic RNG report
/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let rng = state.monitor.last_report().await;
    let gaming_enabled = state.control.is_gaming_enabled().await;
    let status = match &rng {
        Some(report) if !report.healthy => "Degraded",
        _ if !gaming_enabled => "Suspended",
        _ => "Running",
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: state.version.clone(),
        uptime_secs: state.metrics.uptime().as_secs(),
        gaming_enabled,
        rng,
    })
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Run the RNG self test now
/// GET /rng/health
pub async fn rng_health_handler(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(state.monitor.check_once().await)
}

/// GET /games
pub async fn games_handler(State(state): State<Arc<AppState>>) -> Json<GamesResponse> {
    Json(GamesResponse {
        games: state.engine.list_games(),
    })
}

/// POST /sessions
pub async fn start_session_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartSessionRequest>,
) -> Result<Json<GameSession>, ApiError> {
    let session = state
        .engine
        .start_session(&body.player_id, &body.game_id)
        .await
        .map_err(core_error(&request_id))?;
    Ok(Json(session))
}

/// GET /sessions/:id
pub async fn session_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<GameSession>, ApiError> {
    let session = state
        .engine
        .get_session(&session_id)
        .await
        .map_err(core_error(&request_id))?;
    Ok(Json(session))
}

/// POST /sessions/:id/end
pub async fn end_session_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<GameSession>, ApiError> {
    let session = state
        .engine
        .end_session(&session_id)
        .await
        .map_err(core_error(&request_id))?;
    Ok(Json(session))
}

/// Play one cycle. Past the deadline the cycle is interrupted and the
/// player recovers it through the interrupted-games endpoints.
/// POST /sessions/:id/play
pub async fn play_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(body): Json<PlayBody>,
) -> Result<Json<PlayResult>, ApiError> {
    let cycle_id = body.cycle_id.unwrap_or_else(new_cycle_id);
    let request = PlayRequest {
        session_id,
        wager_amount: body.wager_amount,
        cycle_id: Some(cycle_id.clone()),
    };

    match tokio::time::timeout(state.play_timeout, state.engine.play(request)).await {
        Ok(result) => result.map(Json).map_err(core_error(&request_id)),
        Err(_) => {
            warn!("play on cycle {} exceeded {:?}", cycle_id, state.play_timeout);
            match state.engine.mark_interrupted(&cycle_id, "play timed out").await {
                Ok(_) | Err(GameError::CycleNotFound(_)) => {}
                Err(e) => error!("timed out cycle {} not interrupted: {}", cycle_id, e),
            }
            let mut err = ApiError::gateway_timeout(
                request_id.0.clone(),
                format!("play did not finish within {}ms", state.play_timeout.as_millis()),
            );
            err.details = Some(serde_json::json!({ "cycle_id": cycle_id }));
            Err(err)
        }
    }
}

/// GET /players/:id/balance
pub async fn balance_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state
        .ledger
        .get_balance(&player_id)
        .await
        .map_err(core_error(&request_id))?;
    let available = balance.available().map_err(core_error(&request_id))?;
    Ok(Json(BalanceResponse {
        player_id,
        real_money: balance.real_money,
        bonus: balance.bonus,
        available,
        updated_at: balance.updated_at,
    }))
}

/// GET /players/:id/transactions?limit={n}
pub async fn transactions_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let transactions = state
        .ledger
        .get_transactions(&player_id, query.limit)
        .await
        .map_err(core_error(&request_id))?;
    Ok(Json(TransactionsResponse {
        player_id,
        transactions,
    }))
}

/// Accounts are opened on first deposit.
/// POST /players/:id/deposit
pub async fn deposit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
    Json(body): Json<WalletRequest>,
) -> Result<Json<Transaction>, ApiError> {
    state
        .ledger
        .ensure_account(&player_id, &state.currency)
        .await
        .map_err(core_error(&request_id))?;
    let reference = body.reference.unwrap_or_else(|| Uuid::new_v4().to_string());
    let tx = state
        .ledger
        .deposit(&player_id, &Money::new(body.amount, state.currency.clone()), &reference)
        .await
        .map_err(core_error(&request_id))?;
    Ok(Json(tx))
}

/// POST /players/:id/withdraw
pub async fn withdraw_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
    Json(body): Json<WalletRequest>,
) -> Result<Json<Transaction>, ApiError> {
    let reference = body.reference.unwrap_or_else(|| Uuid::new_v4().to_string());
    let tx = state
        .ledger
        .withdraw(&player_id, &Money::new(body.amount, state.currency.clone()), &reference)
        .await
        .map_err(core_error(&request_id))?;
    Ok(Json(tx))
}

/// GET /players/:id/history?limit={n}
pub async fn history_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state
        .engine
        .get_history(&player_id, query.limit)
        .await
        .map_err(core_error(&request_id))?;
    Ok(Json(HistoryResponse { player_id, history }))
}

/// GET /players/:id/interrupted
pub async fn interrupted_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
) -> Result<Json<InterruptedResponse>, ApiError> {
    let games = state
        .engine
        .get_interrupted_games(&player_id)
        .await
        .map_err(core_error(&request_id))?;
    Ok(Json(InterruptedResponse { player_id, games }))
}

/// GET /cycles/:id
pub async fn cycle_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(cycle_id): Path<String>,
) -> Result<Json<GameCycle>, ApiError> {
    let cycle = state
        .engine
        .get_cycle(&cycle_id)
        .await
        .map_err(core_error(&request_id))?;
    Ok(Json(cycle))
}

/// POST /cycles/:id/interrupt
pub async fn interrupt_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(cycle_id): Path<String>,
    Json(body): Json<ReasonRequest>,
) -> Result<Json<GameCycle>, ApiError> {
    let reason = if body.reason.is_empty() {
        "interrupted by operator".to_string()
    } else {
        body.reason
    };
    let cycle = state
        .engine
        .mark_interrupted(&cycle_id, &reason)
        .await
        .map_err(core_error(&request_id))?;
    Ok(Json(cycle))
}

/// POST /cycles/:id/void
pub async fn void_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(cycle_id): Path<String>,
    Json(body): Json<ReasonRequest>,
) -> Result<Json<GameCycle>, ApiError> {
    if body.reason.trim().is_empty() {
        return Err(ApiError::bad_request(
            request_id.0.clone(),
            "a reason is required to void a cycle".to_string(),
        ));
    }
    let cycle = state
        .engine
        .void_game(&cycle_id, &body.reason)
        .await
        .map_err(core_error(&request_id))?;
    Ok(Json(cycle))
}

/// POST /cycles/:id/resume
pub async fn resume_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(cycle_id): Path<String>,
) -> Result<Json<GameCycle>, ApiError> {
    let cycle = state
        .engine
        .resume_game(&cycle_id)
        .await
        .map_err(core_error(&request_id))?;
    Ok(Json(cycle))
}
