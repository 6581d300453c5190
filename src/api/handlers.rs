//! Request Handlers
//!
//! Thin adapters from HTTP onto the settlement engine, wallet and catalog.

use super::{
    errors::ApiError,
    middleware::{AuthenticatedUser, RequestId},
    models::*,
};
use crate::{
    games::{
        catalog::{GameDetails, GameUpdate, NewGame},
        random::SystemRandom,
        settlement::PlayRequest,
        types::{Game, GameId, LedgerEntry, LedgerEntryId, PlayRecord, User, UserId},
    },
    Platform,
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub platform: Platform,
    /// Required value of the admin key header; admin routes are open when unset
    pub admin_key: Option<String>,
    pub metrics_enabled: bool,
    pub version: String,
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// GET /metrics
pub async fn metrics_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    if !state.metrics_enabled {
        return Err(ApiError::not_found(
            request_id.0,
            "Metrics are disabled".to_string(),
        ));
    }

    let body = state
        .platform
        .metrics
        .render()
        .map_err(|e| ApiError::internal_error(request_id.0.clone(), format!("Failed to render metrics: {}", e)))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response())
}

/// GET /games
pub async fn list_games_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Game>>, ApiError> {
    let games = state
        .platform
        .catalog
        .list_games(true)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok(Json(games))
}

/// GET /games/:id
pub async fn game_detail_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
) -> Result<Json<GameDetails>, ApiError> {
    let details = state
        .platform
        .catalog
        .get_game(game_id)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;

    if !details.game.active {
        return Err(ApiError::not_found(
            request_id.0,
            format!("Game {} not found", game_id),
        ));
    }
    Ok(Json(details))
}

/// POST /games/:id/play
pub async fn play_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    body: Bytes,
) -> Result<Json<PlayResponse>, ApiError> {
    let body = PlayBody::from_bytes(&body).map_err(|e| {
        ApiError::bad_request(request_id.0.clone(), format!("Invalid play request body: {}", e))
    })?;

    let mut request = PlayRequest::new(user_id, game_id);
    if let Some(price) = body.expected_price {
        request = request.expecting_price(price);
    }

    let mut rng = SystemRandom::new();
    let result = state
        .platform
        .engine
        .play(request, &mut rng)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;

    let message = if result.is_winner {
        format!("You won {}!", result.prize_value)
    } else {
        "No prize this time".to_string()
    };

    Ok(Json(PlayResponse { result, message }))
}

/// GET /me/balance
pub async fn balance_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state
        .platform
        .wallet
        .balance(user_id)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok(Json(BalanceResponse { user_id, balance }))
}

/// GET /me/plays?limit={n}
pub async fn plays_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse<PlayRecord>>, ApiError> {
    let plays = state
        .platform
        .engine
        .play_history(user_id, query.limit)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok(Json(HistoryResponse::new(plays)))
}

/// GET /me/transactions?limit={n}
pub async fn transactions_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse<LedgerEntry>>, ApiError> {
    let entries = state
        .platform
        .wallet
        .ledger_history(user_id, query.limit)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok(Json(HistoryResponse::new(entries)))
}

/// POST /me/withdrawals
pub async fn withdrawal_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(body): Json<WithdrawalBody>,
) -> Result<(StatusCode, Json<LedgerEntry>), ApiError> {
    let entry = state
        .platform
        .wallet
        .request_withdrawal(user_id, body.amount)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /admin/games
pub async fn admin_list_games_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Game>>, ApiError> {
    let games = state
        .platform
        .catalog
        .list_games(false)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok(Json(games))
}

/// POST /admin/games
pub async fn create_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewGame>,
) -> Result<(StatusCode, Json<Game>), ApiError> {
    let game = state
        .platform
        .catalog
        .create_game(body)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok((StatusCode::CREATED, Json(game)))
}

/// PATCH /admin/games/:id
pub async fn update_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
    Json(body): Json<GameUpdate>,
) -> Result<Json<Game>, ApiError> {
    let game = state
        .platform
        .catalog
        .update_game(game_id, body)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok(Json(game))
}

/// PUT /admin/games/:id/prizes
pub async fn replace_prizes_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
    Json(body): Json<PrizeTableBody>,
) -> Result<Json<GameDetails>, ApiError> {
    let details = state
        .platform
        .catalog
        .replace_payout_table(game_id, body.prizes)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok(Json(details))
}

/// POST /admin/games/:id/status
pub async fn game_status_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
    Json(body): Json<GameStatusBody>,
) -> Result<Json<Game>, ApiError> {
    let game = state
        .platform
        .catalog
        .set_active(game_id, body.active)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok(Json(game))
}

/// POST /admin/users
pub async fn register_user_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterUserBody>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state
        .platform
        .wallet
        .register_user(&body.name)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /admin/users/:id?limit={n}
pub async fn user_details_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<UserDetailsResponse>, ApiError> {
    let wallet = &state.platform.wallet;
    let user = wallet
        .user(user_id)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    let transactions = wallet
        .ledger_history(user_id, query.limit)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok(Json(UserDetailsResponse { user, transactions }))
}

/// POST /admin/users/:id/deposit
pub async fn deposit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Json(body): Json<DepositBody>,
) -> Result<(StatusCode, Json<LedgerEntry>), ApiError> {
    let entry = state
        .platform
        .wallet
        .deposit(user_id, body.amount, body.description)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /admin/withdrawals/pending?limit={n}
pub async fn pending_withdrawals_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse<LedgerEntry>>, ApiError> {
    let entries = state
        .platform
        .wallet
        .pending_withdrawals(query.limit)
        .await
        .map_err(|e| ApiError::domain(&request_id, e))?;
    Ok(Json(HistoryResponse::new(entries)))
}

/// POST /admin/withdrawals/:id/approve
pub async fn approve_withdrawal_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<LedgerEntryId>,
) -> Result<Json<LedgerEntry>, ApiError> {
    resolve_withdrawal(&request_id, &state, entry_id, true).await
}

/// POST /admin/withdrawals/:id/cancel
pub async fn cancel_withdrawal_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<LedgerEntryId>,
) -> Result<Json<LedgerEntry>, ApiError> {
    resolve_withdrawal(&request_id, &state, entry_id, false).await
}

async fn resolve_withdrawal(
    request_id: &RequestId,
    state: &AppState,
    entry_id: LedgerEntryId,
    approve: bool,
) -> Result<Json<LedgerEntry>, ApiError> {
    let entry = state
        .platform
        .wallet
        .resolve_withdrawal(entry_id, approve)
        .await
        .map_err(|e| ApiError::domain(request_id, e))?;
    Ok(Json(entry))
}
