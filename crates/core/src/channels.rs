// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Memoized gRPC channels, one long-lived channel per peer address.
//!
//! Channels are created lazily and never dropped until process exit; tonic
//! reconnects under the hood, so a cached channel survives peer restarts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tonic::transport::{Channel, Endpoint};
use tracing::debug;

#[derive(Clone, Default)]
pub struct ChannelPool {
    inner: Arc<Mutex<HashMap<String, Channel>>>,
}

impl ChannelPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel for `addr` (`host:port`), creating and caching it on first use.
    pub fn get(&self, addr: &str) -> anyhow::Result<Channel> {
        {
            let cache = lock(&self.inner);
            if let Some(channel) = cache.get(addr) {
                return Ok(channel.clone());
            }
        }

        let endpoint = Endpoint::from_shared(format!("http://{addr}"))?;
        let channel = endpoint.connect_lazy();

        let mut cache = lock(&self.inner);
        let entry = cache.entry(addr.to_owned()).or_insert_with(|| {
            debug!(addr = %addr, "created gRPC channel");
            channel
        });
        Ok(entry.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

fn lock(
    inner: &Mutex<HashMap<String, Channel>>,
) -> std::sync::MutexGuard<'_, HashMap<String, Channel>> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
#[path = "channels_tests.rs"]
mod tests;
