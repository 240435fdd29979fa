// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kick event subscriber.
//!
//! Auth publishes `"{user_id}:{device}"` on the `kick` channel when a login
//! displaces an existing same-device session. Every gateway holds one
//! dedicated subscriber connection (subscribing mutates connection state, so
//! it never shares the pooled one) and translates events into local
//! `kick_user` calls.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures_util::StreamExt;
use tracing::{info, warn};

use im_core::kv::{parse_kick_payload, KICK_CHANNEL};

use crate::state::GatewayState;

/// Kick reason for login-displaced sessions; clients match on the prefix.
pub const KICK_REASON_LOGIN: &str = "Kicked by another device login";

pub fn spawn_kick_subscriber(state: Arc<GatewayState>) {
    tokio::spawn(async move {
        loop {
            if state.shutdown.is_cancelled() {
                break;
            }
            if let Err(e) = listen(&state).await {
                warn!(err = %e, "kick subscriber disconnected, retrying");
            }
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }
    });
}

async fn listen(state: &GatewayState) -> anyhow::Result<()> {
    let mut pubsub = state.kv.client().get_async_pubsub().await?;
    pubsub.subscribe(KICK_CHANNEL).await?;
    info!(channel = KICK_CHANNEL, "kick subscriber online");

    let mut messages = pubsub.on_message();
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => return Ok(()),
            msg = messages.next() => {
                let msg = msg.ok_or_else(|| anyhow!("pub/sub stream ended"))?;
                let payload: String = msg.get_payload()?;
                match parse_kick_payload(&payload) {
                    Some((user_id, device)) => {
                        let kicked = state
                            .registry
                            .kick_user(user_id, &device, KICK_REASON_LOGIN)
                            .await;
                        info!(user_id, device = %device, kicked, "kick event");
                    }
                    None => warn!(payload = %payload, "malformed kick payload"),
                }
            }
        }
    }
}
