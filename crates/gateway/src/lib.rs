// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway node: client session plane plus the push endpoint peers dial.

pub mod config;
pub mod dispatch;
pub mod push;
pub mod registry;
pub mod session;
pub mod state;
pub mod subscriber;
pub mod ws;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use im_core::channels::ChannelPool;
use im_core::directory::{service_names, Discovery, Registrar};
use im_core::kv::Kv;
use im_core::rpc::Backends;
use im_proto::gateway::gateway_service_server::GatewayServiceServer;

use crate::config::GatewayConfig;
use crate::push::GatewayGrpc;
use crate::registry::ConnectionRegistry;
use crate::state::GatewayState;

/// Run the gateway until shutdown.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let kv = Kv::open(&config.redis_url)?;
    let registry = Arc::new(ConnectionRegistry::new());

    let discovery = Discovery::new(kv.clone());
    for name in [service_names::AUTH, service_names::CHAT, service_names::RELATION] {
        discovery.observe(name);
    }
    Arc::clone(&discovery).spawn_poller(shutdown.clone());
    let backends = Backends::new(discovery, ChannelPool::new());

    let state = Arc::new(GatewayState {
        config: config.clone(),
        kv: kv.clone(),
        registry: Arc::clone(&registry),
        backends,
        shutdown: shutdown.clone(),
    });

    // Clients find this node through the directory; the record's value is
    // the public WebSocket address.
    Registrar::spawn(kv, service_names::GATEWAY, &config.ws_advertise_addr(), shutdown.clone());
    subscriber::spawn_kick_subscriber(Arc::clone(&state));

    // Push endpoint for peer services; its address is what location records
    // carry.
    let grpc_addr: std::net::SocketAddr =
        format!("{}:{}", config.host, config.grpc_port).parse()?;
    let push = GatewayGrpc::new(registry);
    tokio::spawn(async move {
        if let Err(e) = tonic::transport::Server::builder()
            .add_service(GatewayServiceServer::new(push))
            .serve(grpc_addr)
            .await
        {
            error!(err = %e, "push endpoint failed");
        }
    });

    let addr = format!("{}:{}", config.host, config.port);
    info!(
        "gateway listening on {addr} (push endpoint {})",
        config.push_advertise_addr()
    );
    let router = ws::build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
