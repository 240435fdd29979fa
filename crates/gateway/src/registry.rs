// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local connection registry: `user_id → live sessions`.
//!
//! One lock guards the map; handles are cloned out and the guard dropped
//! before any session method is invoked, so the registry never holds its
//! lock across a queue post.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use tracing::info;

use crate::session::SessionHandle;

#[derive(Default)]
pub struct ConnectionRegistry {
    users: Mutex<HashMap<i64, Vec<SessionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, handle: SessionHandle) {
        let mut users = lock(&self.users);
        let sessions = users.entry(handle.user_id()).or_default();
        sessions.push(handle.clone());
        info!(user_id = handle.user_id(), device = %handle.device(), total = sessions.len(), "session joined");
    }

    /// Drop the back-reference for this exact session. No-op if it already
    /// left (cleanup may race with kick paths).
    pub fn leave(&self, handle: &SessionHandle) {
        let mut users = lock(&self.users);
        if let Some(sessions) = users.get_mut(&handle.user_id()) {
            sessions.retain(|s| s.id() != handle.id());
            if sessions.is_empty() {
                users.remove(&handle.user_id());
            }
        }
        info!(user_id = handle.user_id(), device = %handle.device(), "session left");
    }

    /// Snapshot of the user's sessions.
    pub fn sessions_for(&self, user_id: i64) -> Vec<SessionHandle> {
        lock(&self.users).get(&user_id).cloned().unwrap_or_default()
    }

    /// Deliver an encoded frame to every device of the user. Returns how many
    /// sessions accepted it.
    pub async fn send_to_user(&self, user_id: i64, frame: Bytes) -> usize {
        let sessions = self.sessions_for(user_id);
        let mut delivered = 0;
        for session in sessions {
            if session.send(frame.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Kick every session of the user matching `device_filter` (empty filter
    /// matches all). Returns how many sessions were newly kicked.
    pub async fn kick_user(&self, user_id: i64, device_filter: &str, reason: &str) -> usize {
        let sessions = self.sessions_for(user_id);
        let mut kicked = 0;
        for session in sessions {
            if device_filter.is_empty() || session.device() == device_filter {
                if session.kick(reason).await {
                    kicked += 1;
                }
                info!(user_id, device = %session.device(), reason = %reason, "kicked session");
            }
        }
        kicked
    }

    pub fn session_count(&self) -> usize {
        lock(&self.users).values().map(Vec::len).sum()
    }

    pub fn user_count(&self) -> usize {
        lock(&self.users).len()
    }
}

fn lock(
    users: &Mutex<HashMap<i64, Vec<SessionHandle>>>,
) -> std::sync::MutexGuard<'_, HashMap<i64, Vec<SessionHandle>>> {
    match users.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
