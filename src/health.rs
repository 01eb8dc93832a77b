//! Liveness endpoint.

use std::sync::Arc;

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use serde_json::{Map, Value, json};
use tower_http::cors::CorsLayer;

use crate::sync::AccountStatus;

#[derive(Clone)]
struct HealthState {
    accounts: Arc<Vec<AccountStatus>>,
}

/// `GET /health` reporting each account's session state and how many
/// accounts currently hold an open connection.
pub fn health_routes(accounts: Vec<AccountStatus>) -> Router {
    let state = HealthState {
        accounts: Arc::new(accounts),
    };
    Router::new()
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    let accounts: Map<String, Value> = state
        .accounts
        .iter()
        .map(|s| (s.account.clone(), json!(*s.state.borrow())))
        .collect();
    let connected = state
        .accounts
        .iter()
        .filter(|s| s.state.borrow().is_connected())
        .count();
    Json(json!({ "ok": true, "connected": connected, "accounts": accounts }))
}
