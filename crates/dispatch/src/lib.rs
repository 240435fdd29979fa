// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch front-end: the HTTP boundary clients hit before opening a
//! framed channel. Fronts register/login/logout and hands out a gateway
//! WebSocket URL picked round-robin from the directory.

pub mod config;
pub mod http;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use im_core::channels::ChannelPool;
use im_core::directory::{service_names, Discovery};
use im_core::kv::Kv;
use im_core::rpc::Backends;

use crate::config::DispatchConfig;

/// Shared dispatch state.
pub struct DispatchState {
    pub config: DispatchConfig,
    pub backends: Backends,
}

/// Build the axum `Router` with all dispatch routes. CORS is permissive so
/// browser clients can preflight from any origin.
pub fn build_router(state: Arc<DispatchState>) -> Router {
    Router::new()
        .route("/api/register", post(http::register))
        .route("/api/login", post(http::login))
        .route("/api/logout", post(http::logout))
        .route("/api/discover/chat", get(http::discover_chat))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the dispatch server until shutdown.
pub async fn run(config: DispatchConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let kv = Kv::open(&config.redis_url)?;

    let discovery = Discovery::new(kv);
    discovery.observe(service_names::AUTH);
    discovery.observe(service_names::GATEWAY);
    Arc::clone(&discovery).spawn_poller(shutdown.clone());
    let backends = Backends::new(discovery, ChannelPool::new());

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(DispatchState { config, backends });

    info!("dispatch listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
