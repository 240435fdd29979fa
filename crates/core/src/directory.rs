// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service directory: heartbeat self-registration and polled cached
//! discovery with round-robin selection.
//!
//! Freshness contract: a just-registered service becomes visible within one
//! poll interval; a just-expired one may linger in the cache for up to one
//! interval. Callers tolerate a single failed RPC and re-resolve.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::kv::{Kv, SERVICE_REFRESH_SECS};

/// Well-known service names.
pub mod service_names {
    pub const GATEWAY: &str = "gateway";
    pub const AUTH: &str = "auth";
    pub const CHAT: &str = "chat";
    pub const RELATION: &str = "relation";
}

/// Keeps one `(service_name, address)` record alive in the directory:
/// writes it immediately, then refreshes every 3 s against the 10 s TTL.
pub struct Registrar;

impl Registrar {
    pub fn spawn(kv: Kv, name: &str, addr: &str, shutdown: CancellationToken) {
        let name = name.to_owned();
        let addr = addr.to_owned();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(SERVICE_REFRESH_SECS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(service = %name, addr = %addr, "registering in service directory");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if let Err(e) = kv.register_service(&name, &addr).await {
                    warn!(service = %name, err = %e, "directory heartbeat failed");
                }
            }
        });
    }
}

#[derive(Default)]
struct CacheEntry {
    addrs: Vec<String>,
    rr: usize,
}

struct DiscoveryState {
    observed: Vec<String>,
    cache: HashMap<String, CacheEntry>,
}

/// Cache-first discovery. `observe` a service once, let the poller keep the
/// cache fresh, then `discover` round-robins over the cached list. A cache
/// miss falls back to one direct enumeration so the first call works before
/// the poller has run.
pub struct Discovery {
    kv: Kv,
    state: Mutex<DiscoveryState>,
}

impl Discovery {
    pub fn new(kv: Kv) -> Arc<Self> {
        Arc::new(Self {
            kv,
            state: Mutex::new(DiscoveryState { observed: Vec::new(), cache: HashMap::new() }),
        })
    }

    /// Add a service name to the poll set. Idempotent.
    pub fn observe(&self, name: &str) {
        let mut state = lock(&self.state);
        if !state.observed.iter().any(|s| s == name) {
            state.observed.push(name.to_owned());
            info!(service = %name, "observing service");
        }
    }

    /// Atomically replace the cached address list for a service. The
    /// round-robin cursor survives so selection keeps rotating across
    /// refreshes.
    pub fn replace(&self, name: &str, addrs: Vec<String>) {
        let mut state = lock(&self.state);
        let entry = state.cache.entry(name.to_owned()).or_default();
        entry.addrs = addrs;
    }

    /// Round-robin pick from the cache; `None` when the service has no live
    /// instances. On cache miss, enumerates the directory directly once.
    pub async fn discover(&self, name: &str) -> Option<String> {
        if let Some(found) = self.pick(name) {
            return Some(found);
        }

        // Cache miss: one-shot direct enumeration.
        match self.kv.service_addrs(name).await {
            Ok(addrs) if !addrs.is_empty() => {
                self.replace(name, addrs);
                self.pick(name)
            }
            Ok(_) => {
                warn!(service = %name, "no live instances");
                None
            }
            Err(e) => {
                warn!(service = %name, err = %e, "directory enumeration failed");
                None
            }
        }
    }

    fn pick(&self, name: &str) -> Option<String> {
        let mut state = lock(&self.state);
        let entry = state.cache.get_mut(name)?;
        if entry.addrs.is_empty() {
            return None;
        }
        let picked = entry.addrs[entry.rr % entry.addrs.len()].clone();
        entry.rr = entry.rr.wrapping_add(1);
        Some(picked)
    }

    /// One poll round over every observed service.
    pub async fn refresh(&self) {
        let observed = lock(&self.state).observed.clone();
        for name in observed {
            match self.kv.service_addrs(&name).await {
                Ok(addrs) => {
                    debug!(service = %name, count = addrs.len(), "directory cache refreshed");
                    self.replace(&name, addrs);
                }
                Err(e) => {
                    warn!(service = %name, err = %e, "directory poll failed");
                }
            }
        }
    }

    /// Background poller: refreshes every observed service every 3 s.
    pub fn spawn_poller(self: Arc<Self>, shutdown: CancellationToken) {
        let this = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(SERVICE_REFRESH_SECS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                this.refresh().await;
            }
        });
    }
}

fn lock(state: &Mutex<DiscoveryState>) -> std::sync::MutexGuard<'_, DiscoveryState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;
