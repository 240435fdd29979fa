// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the dispatch HTTP boundary.
//!
//! Uses `axum_test::TestServer` plus an in-process auth server on an
//! ephemeral port; the directory cache is seeded directly so no key-value
//! store is needed.

use std::sync::Arc;

use axum_test::TestServer;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};

use im_core::channels::ChannelPool;
use im_core::directory::Discovery;
use im_core::kv::Kv;
use im_core::rpc::Backends;
use im_dispatch::config::DispatchConfig;
use im_dispatch::{build_router, DispatchState};
use im_proto::auth::auth_service_server::{AuthService, AuthServiceServer};
use im_proto::auth::{LoginReq, LoginResp, LogoutReq, LogoutResp, RegisterReq, RegisterResp};

/// Canned auth backend: `alice/123` logs in, `taken` is already registered.
#[derive(Clone, Default)]
struct FakeAuth;

#[tonic::async_trait]
impl AuthService for FakeAuth {
    async fn register(
        &self,
        request: Request<RegisterReq>,
    ) -> Result<Response<RegisterResp>, Status> {
        let req = request.into_inner();
        if req.username == "taken" {
            return Ok(Response::new(RegisterResp {
                success: false,
                user_id: 0,
                error_message: "Register failed: user may exist".into(),
            }));
        }
        Ok(Response::new(RegisterResp { success: true, user_id: 7, error_message: String::new() }))
    }

    async fn login(&self, request: Request<LoginReq>) -> Result<Response<LoginResp>, Status> {
        let req = request.into_inner();
        if req.username == "alice" && req.password == "123" {
            Ok(Response::new(LoginResp {
                success: true,
                user_id: 7,
                token: "token_7_1_deadbeef".into(),
                nickname: "Alice".into(),
                error_message: String::new(),
            }))
        } else {
            Ok(Response::new(LoginResp {
                success: false,
                user_id: 0,
                token: String::new(),
                nickname: String::new(),
                error_message: "Invalid password".into(),
            }))
        }
    }

    async fn logout(&self, _request: Request<LogoutReq>) -> Result<Response<LogoutResp>, Status> {
        Ok(Response::new(LogoutResp { success: true }))
    }
}

fn test_config() -> DispatchConfig {
    DispatchConfig {
        host: "127.0.0.1".into(),
        port: 0,
        // Nothing listens on port 1; tests seed the directory cache instead.
        redis_url: "redis://127.0.0.1:1/".into(),
    }
}

fn test_state() -> anyhow::Result<Arc<DispatchState>> {
    let kv = Kv::open(&test_config().redis_url)?;
    let backends = Backends::new(Discovery::new(kv), ChannelPool::new());
    Ok(Arc::new(DispatchState { config: test_config(), backends }))
}

async fn spawn_fake_auth() -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = tonic::transport::Server::builder()
            .add_service(AuthServiceServer::new(FakeAuth))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await;
    });
    Ok(addr.to_string())
}

/// State with a live fake auth server and the given gateway addresses.
async fn wired_state(gateways: &[&str]) -> anyhow::Result<Arc<DispatchState>> {
    let state = test_state()?;
    let auth_addr = spawn_fake_auth().await?;
    state.backends.discovery.replace("auth", vec![auth_addr]);
    state
        .backends
        .discovery
        .replace("gateway", gateways.iter().map(|s| (*s).to_owned()).collect());
    Ok(state)
}

fn test_server(state: Arc<DispatchState>) -> TestServer {
    TestServer::new(build_router(state)).expect("failed to create test server")
}

#[tokio::test]
async fn register_returns_user_id_in_envelope() -> anyhow::Result<()> {
    let server = test_server(wired_state(&["127.0.0.1:8081"]).await?);
    let resp = server
        .post("/api/register")
        .json(&serde_json::json!({"username": "bob", "password": "pw", "nickname": "Bob"}))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["user_id"], 7);
    Ok(())
}

#[tokio::test]
async fn duplicate_register_is_a_logic_failure() -> anyhow::Result<()> {
    let server = test_server(wired_state(&["127.0.0.1:8081"]).await?);
    let resp = server
        .post("/api/register")
        .json(&serde_json::json!({"username": "taken", "password": "pw", "nickname": ""}))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["code"], 1);
    let msg = body["msg"].as_str().unwrap_or_default();
    assert!(msg.contains("exist"), "msg should hint duplication: {msg}");
    Ok(())
}

#[tokio::test]
async fn login_returns_token_and_gateway_url() -> anyhow::Result<()> {
    let server = test_server(wired_state(&["127.0.0.1:8081"]).await?);
    let resp = server
        .post("/api/login")
        .json(&serde_json::json!({"username": "alice", "password": "123", "device": "PC"}))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["user_id"], 7);
    assert_eq!(body["data"]["gateway_url"], "ws://127.0.0.1:8081/ws");
    assert!(body["data"]["token"].as_str().unwrap_or_default().starts_with("token_"));
    Ok(())
}

#[tokio::test]
async fn gateway_urls_rotate_round_robin() -> anyhow::Result<()> {
    let server = test_server(wired_state(&["127.0.0.1:8081", "127.0.0.1:8082"]).await?);

    let mut urls = Vec::new();
    for _ in 0..4 {
        let resp = server
            .post("/api/login")
            .json(&serde_json::json!({"username": "alice", "password": "123"}))
            .await;
        let body: serde_json::Value = resp.json();
        urls.push(body["data"]["gateway_url"].as_str().unwrap_or_default().to_owned());
    }
    assert_eq!(
        urls,
        vec![
            "ws://127.0.0.1:8081/ws",
            "ws://127.0.0.1:8082/ws",
            "ws://127.0.0.1:8081/ws",
            "ws://127.0.0.1:8082/ws",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() -> anyhow::Result<()> {
    let server = test_server(wired_state(&["127.0.0.1:8081"]).await?);
    let resp = server
        .post("/api/login")
        .json(&serde_json::json!({"username": "alice", "password": "wrong"}))
        .await;
    resp.assert_status(axum::http::StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["code"], 1);
    Ok(())
}

#[tokio::test]
async fn login_without_gateways_is_unavailable() -> anyhow::Result<()> {
    let server = test_server(wired_state(&[]).await?);
    let resp = server
        .post("/api/login")
        .json(&serde_json::json!({"username": "alice", "password": "123"}))
        .await;
    resp.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn discover_chat_hands_out_a_gateway() -> anyhow::Result<()> {
    let server = test_server(wired_state(&["127.0.0.1:9090"]).await?);
    let resp = server.get("/api/discover/chat").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["gateway_url"], "ws://127.0.0.1:9090/ws");
    Ok(())
}

#[tokio::test]
async fn logout_reports_success() -> anyhow::Result<()> {
    let server = test_server(wired_state(&["127.0.0.1:8081"]).await?);
    let resp = server
        .post("/api/logout")
        .json(&serde_json::json!({"user_id": 7, "device": "PC"}))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["code"], 0);
    Ok(())
}

#[tokio::test]
async fn missing_auth_service_is_unavailable() -> anyhow::Result<()> {
    // No auth seeded; directory fallback hits the dead store and comes back
    // empty.
    let state = test_state()?;
    let server = test_server(state);
    let resp = server
        .post("/api/login")
        .json(&serde_json::json!({"username": "alice", "password": "123"}))
        .await;
    resp.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}
