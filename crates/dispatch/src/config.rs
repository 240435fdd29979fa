// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the dispatch front-end.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "im-dispatch", about = "IM HTTP boundary: register/login/logout/discover")]
pub struct DispatchConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "IM_DISPATCH_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000, env = "IM_DISPATCH_PORT")]
    pub port: u16,

    /// Key-value store URL.
    #[arg(long, default_value = "redis://127.0.0.1:6379", env = "IM_REDIS_URL")]
    pub redis_url: String,
}
