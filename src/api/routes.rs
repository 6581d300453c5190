//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::{handlers::*, middleware::admin_key_middleware};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/admin/games", get(admin_list_games_handler).post(create_game_handler))
        .route("/admin/games/:id", patch(update_game_handler))
        .route("/admin/games/:id/prizes", put(replace_prizes_handler))
        .route("/admin/games/:id/status", post(game_status_handler))
        .route("/admin/users", post(register_user_handler))
        .route("/admin/users/:id", get(user_details_handler))
        .route("/admin/users/:id/deposit", post(deposit_handler))
        .route("/admin/withdrawals/pending", get(pending_withdrawals_handler))
        .route("/admin/withdrawals/:id/approve", post(approve_withdrawal_handler))
        .route("/admin/withdrawals/:id/cancel", post(cancel_withdrawal_handler))
        .route_layer(from_fn_with_state(state.clone(), admin_key_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        // Catalog
        .route("/games", get(list_games_handler))
        .route("/games/:id", get(game_detail_handler))
        .route("/games/:id/play", post(play_handler))
        // Player account
        .route("/me/balance", get(balance_handler))
        .route("/me/plays", get(plays_handler))
        .route("/me/transactions", get(transactions_handler))
        .route("/me/withdrawals", post(withdrawal_handler))
        .merge(admin)
        .with_state(state)
}
