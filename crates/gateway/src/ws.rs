// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-facing HTTP surface: health probe and the WebSocket upgrade.

use std::sync::Arc;

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::session;
use crate::state::GatewayState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    session_count: usize,
}

/// Query parameters for `GET /ws`.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    pub id: i64,
    pub token: String,
    pub device: Option<String>,
}

pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        session_count: state.registry.session_count(),
    })
}

/// `GET /ws?id=&token=&device=` — upgrade after verifying the token against
/// the session record minted at login. Mismatch or store trouble rejects the
/// upgrade with 401.
async fn ws_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let device = query.device.unwrap_or_else(|| "PC".to_owned());

    let stored = match state.kv.session_token(query.id, &device).await {
        Ok(stored) => stored,
        Err(e) => {
            warn!(user_id = query.id, err = %e, "session lookup failed during upgrade");
            return unauthorized();
        }
    };
    if stored.as_deref() != Some(query.token.as_str()) {
        warn!(user_id = query.id, device = %device, "ws auth failed: token/device mismatch");
        return unauthorized();
    }

    ws.on_upgrade(move |socket| session::run_session(state, socket, query.id, device))
        .into_response()
}

fn unauthorized() -> axum::response::Response {
    axum::http::Response::builder()
        .status(401)
        .body(axum::body::Body::from("auth failed"))
        .unwrap_or_default()
        .into_response()
}
