// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use im_core::kv::Kv;
use im_core::rpc::Backends;

use crate::config::GatewayConfig;
use crate::registry::ConnectionRegistry;

/// Shared gateway state, constructed once per process and passed down.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub kv: Kv,
    pub registry: Arc<ConnectionRegistry>,
    pub backends: Backends,
    pub shutdown: CancellationToken,
}

/// Return current epoch millis.
pub fn epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
