// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};
use tracing::error;

use im_services::config::ServiceConfig;

#[derive(Parser)]
#[command(name = "im-services", about = "IM back-end services")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the auth server.
    Auth(ServiceConfig),
    /// Run the chat server.
    Chat(ServiceConfig),
    /// Run the relation server.
    Relation(ServiceConfig),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let result = match cli.command {
        Command::Auth(config) => im_services::run_auth(config).await,
        Command::Chat(config) => im_services::run_chat(config).await,
        Command::Relation(config) => im_services::run_relation(config).await,
    };
    if let Err(e) = result {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
