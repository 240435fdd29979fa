// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed clients for the internal RPC plane, resolved through the service
//! directory and memoized channel pool.

use std::sync::Arc;

use anyhow::Context;
use tonic::transport::Channel;

use im_proto::auth::auth_service_client::AuthServiceClient;
use im_proto::chat::chat_service_client::ChatServiceClient;
use im_proto::gateway::gateway_service_client::GatewayServiceClient;
use im_proto::relation::relation_service_client::RelationServiceClient;

use crate::channels::ChannelPool;
use crate::directory::{service_names, Discovery};

/// Handle bundle for reaching back-end peers. Cheap to clone.
#[derive(Clone)]
pub struct Backends {
    pub discovery: Arc<Discovery>,
    pub channels: ChannelPool,
}

impl Backends {
    pub fn new(discovery: Arc<Discovery>, channels: ChannelPool) -> Self {
        Self { discovery, channels }
    }

    async fn resolve(&self, name: &str) -> anyhow::Result<Channel> {
        let addr = self
            .discovery
            .discover(name)
            .await
            .with_context(|| format!("no live {name} instance"))?;
        self.channels.get(&addr)
    }

    pub async fn auth(&self) -> anyhow::Result<AuthServiceClient<Channel>> {
        Ok(AuthServiceClient::new(self.resolve(service_names::AUTH).await?))
    }

    pub async fn chat(&self) -> anyhow::Result<ChatServiceClient<Channel>> {
        Ok(ChatServiceClient::new(self.resolve(service_names::CHAT).await?))
    }

    pub async fn relation(&self) -> anyhow::Result<RelationServiceClient<Channel>> {
        Ok(RelationServiceClient::new(self.resolve(service_names::RELATION).await?))
    }

    /// Gateway push endpoints are routed by the address in the location
    /// record, not by directory lookup.
    pub fn gateway_at(&self, addr: &str) -> anyhow::Result<GatewayServiceClient<Channel>> {
        Ok(GatewayServiceClient::new(self.channels.get(addr)?))
    }
}
