// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the dispatch boundary.
//!
//! Every response uses the `{code, msg, data}` envelope: `code = 0` is
//! success, non-zero a logic failure. Auth failures additionally carry 401.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use im_core::directory::service_names;
use im_proto::auth::{LoginReq, LogoutReq, RegisterReq};

use crate::DispatchState;

// -- Envelope -----------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

fn ok(msg: &str, data: serde_json::Value) -> Envelope {
    Envelope { code: 0, msg: msg.to_owned(), data: Some(data) }
}

fn fail(msg: impl Into<String>) -> Envelope {
    Envelope { code: 1, msg: msg.into(), data: None }
}

// -- Request bodies -----------------------------------------------------------

fn default_device() -> String {
    "PC".to_owned()
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_device")]
    pub device: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub device: String,
}

// -- Helpers ------------------------------------------------------------------

async fn pick_gateway(state: &DispatchState) -> Option<String> {
    state
        .backends
        .discovery
        .discover(service_names::GATEWAY)
        .await
        .map(|addr| format!("ws://{addr}/ws"))
}

// -- Handlers -----------------------------------------------------------------

/// `POST /api/register`
pub async fn register(
    State(state): State<Arc<DispatchState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let mut client = match state.backends.auth().await {
        Ok(client) => client,
        Err(e) => {
            warn!(err = %e, "no auth service");
            return (StatusCode::SERVICE_UNAVAILABLE, Json(fail("Auth service unavailable")));
        }
    };

    let rpc = RegisterReq { username: req.username, password: req.password, nickname: req.nickname };
    match client.register(rpc).await {
        Ok(resp) => {
            let resp = resp.into_inner();
            if resp.success {
                (
                    StatusCode::OK,
                    Json(ok("Register Success", serde_json::json!({ "user_id": resp.user_id }))),
                )
            } else {
                (StatusCode::OK, Json(fail(resp.error_message)))
            }
        }
        Err(status) => (StatusCode::OK, Json(fail(format!("RPC error: {}", status.message())))),
    }
}

/// `POST /api/login`
pub async fn login(
    State(state): State<Arc<DispatchState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let mut client = match state.backends.auth().await {
        Ok(client) => client,
        Err(e) => {
            warn!(err = %e, "no auth service");
            return (StatusCode::SERVICE_UNAVAILABLE, Json(fail("Auth service unavailable")));
        }
    };

    let rpc = LoginReq { username: req.username, password: req.password, device: req.device };
    let resp = match client.login(rpc).await {
        Ok(resp) => resp.into_inner(),
        Err(status) => {
            return (StatusCode::OK, Json(fail(format!("RPC error: {}", status.message()))))
        }
    };
    if !resp.success {
        return (StatusCode::UNAUTHORIZED, Json(fail(resp.error_message)));
    }

    let Some(gateway_url) = pick_gateway(&state).await else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(fail("No gateways available")));
    };
    (
        StatusCode::OK,
        Json(ok(
            "Login Success",
            serde_json::json!({
                "user_id": resp.user_id,
                "token": resp.token,
                "nickname": resp.nickname,
                "gateway_url": gateway_url,
            }),
        )),
    )
}

/// `POST /api/logout`
pub async fn logout(
    State(state): State<Arc<DispatchState>>,
    Json(req): Json<LogoutRequest>,
) -> impl IntoResponse {
    if req.user_id <= 0 {
        return (StatusCode::OK, Json(fail("Missing user_id")));
    }
    let mut client = match state.backends.auth().await {
        Ok(client) => client,
        Err(e) => {
            warn!(err = %e, "no auth service");
            return (StatusCode::SERVICE_UNAVAILABLE, Json(fail("Auth service unavailable")));
        }
    };

    let rpc = LogoutReq { user_id: req.user_id, device: req.device, token: req.token };
    match client.logout(rpc).await {
        Ok(resp) => {
            if resp.into_inner().success {
                (StatusCode::OK, Json(Envelope { code: 0, msg: "Logged out".to_owned(), data: None }))
            } else {
                (StatusCode::OK, Json(fail("Logout failed")))
            }
        }
        Err(status) => (StatusCode::OK, Json(fail(format!("RPC error: {}", status.message())))),
    }
}

/// `GET /api/discover/chat`
pub async fn discover_chat(State(state): State<Arc<DispatchState>>) -> impl IntoResponse {
    match pick_gateway(&state).await {
        Some(gateway_url) => (
            StatusCode::OK,
            Json(ok("OK", serde_json::json!({ "gateway_url": gateway_url }))),
        ),
        None => (StatusCode::SERVICE_UNAVAILABLE, Json(fail("No gateways available"))),
    }
}
