// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Back-end IM services: auth, chat, and relation gRPC servers.
//!
//! One binary hosts all three behind subcommands so deployments can scale
//! each role independently while sharing the infrastructure stack.

pub mod auth;
pub mod chat;
pub mod config;
pub mod relation;
pub mod token;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use im_core::channels::ChannelPool;
use im_core::db::Db;
use im_core::directory::{service_names, Discovery, Registrar};
use im_core::kv::Kv;
use im_core::rpc::Backends;
use im_proto::auth::auth_service_server::AuthServiceServer;
use im_proto::chat::chat_service_server::ChatServiceServer;
use im_proto::relation::relation_service_server::RelationServiceServer;

use crate::config::ServiceConfig;

pub const AUTH_PORT: u16 = 50051;
pub const CHAT_PORT: u16 = 50052;
pub const RELATION_PORT: u16 = 50053;

/// Run the auth server until shutdown.
pub async fn run_auth(config: ServiceConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let kv = Kv::open(&config.redis_url)?;
    let db = Db::connect(&config.db_url, &config.db_read_urls, config.db_max_conns)?;

    Registrar::spawn(
        kv.clone(),
        service_names::AUTH,
        &config.advertise(AUTH_PORT),
        shutdown.clone(),
    );

    let addr: std::net::SocketAddr = config.listen_addr(AUTH_PORT).parse()?;
    info!("auth service listening on {addr}");
    let service = auth::AuthGrpc::new(kv, db, config.auth_secret.clone());
    tonic::transport::Server::builder()
        .add_service(AuthServiceServer::new(service))
        .serve(addr)
        .await?;
    Ok(())
}

/// Run the chat server until shutdown.
pub async fn run_chat(config: ServiceConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let kv = Kv::open(&config.redis_url)?;
    let db = Db::connect(&config.db_url, &config.db_read_urls, config.db_max_conns)?;

    Registrar::spawn(
        kv.clone(),
        service_names::CHAT,
        &config.advertise(CHAT_PORT),
        shutdown.clone(),
    );

    let addr: std::net::SocketAddr = config.listen_addr(CHAT_PORT).parse()?;
    info!("chat service listening on {addr}");
    let service = chat::ChatGrpc::new(kv, db, ChannelPool::new());
    tonic::transport::Server::builder()
        .add_service(ChatServiceServer::new(service))
        .serve(addr)
        .await?;
    Ok(())
}

/// Run the relation server until shutdown.
pub async fn run_relation(config: ServiceConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let kv = Kv::open(&config.redis_url)?;
    let db = Db::connect(&config.db_url, &config.db_read_urls, config.db_max_conns)?;

    Registrar::spawn(
        kv.clone(),
        service_names::RELATION,
        &config.advertise(RELATION_PORT),
        shutdown.clone(),
    );

    // Relation rides on chat for system messages.
    let discovery = Discovery::new(kv);
    discovery.observe(service_names::CHAT);
    Arc::clone(&discovery).spawn_poller(shutdown.clone());
    let backends = Backends::new(discovery, ChannelPool::new());

    let addr: std::net::SocketAddr = config.listen_addr(RELATION_PORT).parse()?;
    info!("relation service listening on {addr}");
    let service = relation::RelationGrpc::new(db, backends);
    tonic::transport::Server::builder()
        .add_service(RelationServiceServer::new(service))
        .serve(addr)
        .await?;
    Ok(())
}
