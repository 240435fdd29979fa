// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for one gateway node.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "im-gateway", about = "IM gateway node: client sessions + push endpoint")]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "IM_GATEWAY_HOST")]
    pub host: String,

    /// Client-facing HTTP/WebSocket port.
    #[arg(long, default_value_t = 8080, env = "IM_GATEWAY_PORT")]
    pub port: u16,

    /// Push-endpoint (gRPC) port for peer services.
    #[arg(long, default_value_t = 8090, env = "IM_GATEWAY_GRPC_PORT")]
    pub grpc_port: u16,

    /// Host peers and clients use to reach this node.
    #[arg(long, default_value = "127.0.0.1", env = "IM_GATEWAY_ADVERTISE_HOST")]
    pub advertise_host: String,

    /// Key-value store URL.
    #[arg(long, default_value = "redis://127.0.0.1:6379", env = "IM_REDIS_URL")]
    pub redis_url: String,

    /// Idle read timeout in milliseconds. Clients must heartbeat within this
    /// window or the session closes.
    #[arg(long, default_value_t = 5000, env = "IM_GATEWAY_IDLE_TIMEOUT_MS")]
    pub idle_timeout_ms: u64,

    /// Session open (post-upgrade handshake) timeout in milliseconds.
    #[arg(long, default_value_t = 5000, env = "IM_GATEWAY_HANDSHAKE_TIMEOUT_MS")]
    pub handshake_timeout_ms: u64,

    /// Per-session outbound queue depth.
    #[arg(long, default_value_t = 64, env = "IM_GATEWAY_WRITE_QUEUE_DEPTH")]
    pub write_queue_depth: usize,
}

impl GatewayConfig {
    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Address clients dial for WebSocket upgrade; the directory value.
    pub fn ws_advertise_addr(&self) -> String {
        format!("{}:{}", self.advertise_host, self.port)
    }

    /// Address stored in location records; peers dial it for push RPCs.
    pub fn push_advertise_addr(&self) -> String {
        format!("{}:{}", self.advertise_host, self.grpc_port)
    }
}
