// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key-value store client and the namespace it speaks.
//!
//! Keys:
//! - `session:{user_id}` — hash device → token, TTL 24 h
//! - `location:{user_id}` — hash device → push-endpoint addr, TTL 60 s
//! - `seq:{owner_id}` — per-owner timeline counter
//! - `service:{name}:{addr}` — directory record, TTL 10 s
//! - pub/sub channel `kick`, payload `"{user_id}:{device}"`

use std::collections::HashMap;
use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::OnceCell;

/// Pub/sub channel carrying same-device eviction events.
pub const KICK_CHANNEL: &str = "kick";

/// Session hash lifetime; refreshed on login and on heartbeat.
pub const SESSION_TTL_SECS: i64 = 24 * 3600;

/// Location hash lifetime; refreshed by the owning gateway. Bounds how long
/// a crashed gateway's records linger.
pub const LOCATION_TTL_SECS: i64 = 60;

/// Directory record lifetime; owners refresh every [`SERVICE_REFRESH_SECS`].
pub const SERVICE_TTL_SECS: u64 = 10;

/// Directory heartbeat and discovery poll interval.
pub const SERVICE_REFRESH_SECS: u64 = 3;

pub fn session_key(user_id: i64) -> String {
    format!("session:{user_id}")
}

pub fn location_key(user_id: i64) -> String {
    format!("location:{user_id}")
}

pub fn seq_key(owner_id: i64) -> String {
    format!("seq:{owner_id}")
}

pub fn service_key(name: &str, addr: &str) -> String {
    format!("service:{name}:{addr}")
}

pub fn service_pattern(name: &str) -> String {
    format!("service:{name}:*")
}

pub fn kick_payload(user_id: i64, device: &str) -> String {
    format!("{user_id}:{device}")
}

/// Parse a `kick` channel payload. Devices never contain `:` so the first
/// separator is authoritative.
pub fn parse_kick_payload(payload: &str) -> Option<(i64, String)> {
    let (uid, device) = payload.split_once(':')?;
    let user_id = uid.parse::<i64>().ok()?;
    if device.is_empty() {
        return None;
    }
    Some((user_id, device.to_owned()))
}

/// Handle to the key-value store. Cheap to clone; the underlying multiplexed
/// connection is established lazily on first use so processes can start
/// before the store does.
#[derive(Clone)]
pub struct Kv {
    client: redis::Client,
    conn: Arc<OnceCell<ConnectionManager>>,
}

impl Kv {
    /// Parse the URL and build a handle. Does not touch the network.
    pub fn open(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self { client, conn: Arc::new(OnceCell::new()) })
    }

    /// The underlying client, for callers that need a dedicated connection
    /// (the pub/sub subscriber mutates connection state and must not share
    /// the pooled one).
    pub fn client(&self) -> &redis::Client {
        &self.client
    }

    async fn conn(&self) -> anyhow::Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| self.client.get_connection_manager())
            .await?;
        Ok(conn.clone())
    }

    // -- Sessions -------------------------------------------------------------

    pub async fn session_token(&self, user_id: i64, device: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn().await?;
        let token: Option<String> = conn.hget(session_key(user_id), device).await?;
        Ok(token)
    }

    pub async fn set_session_token(
        &self,
        user_id: i64,
        device: &str,
        token: &str,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let key = session_key(user_id);
        let _: () = conn.hset(&key, device, token).await?;
        let _: () = conn.expire(&key, SESSION_TTL_SECS).await?;
        Ok(())
    }

    pub async fn clear_session_device(&self, user_id: i64, device: &str) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.hdel(session_key(user_id), device).await?;
        Ok(())
    }

    pub async fn clear_session(&self, user_id: i64) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(session_key(user_id)).await?;
        Ok(())
    }

    pub async fn session_exists(&self, user_id: i64) -> anyhow::Result<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(session_key(user_id)).await?;
        Ok(exists)
    }

    pub async fn touch_session(&self, user_id: i64) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.expire(session_key(user_id), SESSION_TTL_SECS).await?;
        Ok(())
    }

    // -- Sequence counters ----------------------------------------------------

    /// Atomically advance the owner's timeline counter. Returned values are
    /// strictly increasing; authoritative for new inserts only.
    pub async fn next_seq(&self, owner_id: i64) -> anyhow::Result<i64> {
        let mut conn = self.conn().await?;
        let seq: i64 = conn.incr(seq_key(owner_id), 1i64).await?;
        Ok(seq)
    }

    // -- Locations ------------------------------------------------------------

    pub async fn set_location(
        &self,
        user_id: i64,
        device: &str,
        push_addr: &str,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let key = location_key(user_id);
        let _: () = conn.hset(&key, device, push_addr).await?;
        let _: () = conn.expire(&key, LOCATION_TTL_SECS).await?;
        Ok(())
    }

    pub async fn del_location(&self, user_id: i64, device: &str) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.hdel(location_key(user_id), device).await?;
        Ok(())
    }

    pub async fn touch_location(&self, user_id: i64) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.expire(location_key(user_id), LOCATION_TTL_SECS).await?;
        Ok(())
    }

    /// Device → push-endpoint address for every live session of the user.
    pub async fn locations(&self, user_id: i64) -> anyhow::Result<HashMap<String, String>> {
        let mut conn = self.conn().await?;
        let map: HashMap<String, String> = conn.hgetall(location_key(user_id)).await?;
        Ok(map)
    }

    // -- Service directory ----------------------------------------------------

    pub async fn register_service(&self, name: &str, addr: &str) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set_ex(service_key(name, addr), addr, SERVICE_TTL_SECS).await?;
        Ok(())
    }

    /// Enumerate live addresses for a service name.
    pub async fn service_addrs(&self, name: &str) -> anyhow::Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let keys: Vec<String> = conn.keys(service_pattern(name)).await?;
        let mut addrs = Vec::with_capacity(keys.len());
        for key in keys {
            let val: Option<String> = conn.get(&key).await?;
            if let Some(addr) = val {
                if !addr.is_empty() {
                    addrs.push(addr);
                }
            }
        }
        Ok(addrs)
    }

    // -- Kick pub/sub ---------------------------------------------------------

    pub async fn publish_kick(&self, user_id: i64, device: &str) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.publish(KICK_CHANNEL, kick_payload(user_id, device)).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "kv_tests.rs"]
mod tests;
