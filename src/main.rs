use std::sync::Arc;

use anyhow::Context;
use ballot::{node::Node, transport::HttpTransport};
use ballotd::{api, cli::Cli, settings};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = settings::load(&cli)?;
    let transport = Arc::new(HttpTransport::new(config.request_timeout())?);
    let node = Arc::new(Node::new(config, transport)?);

    let listener = TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    info!(
        addr = %cli.bind,
        node_id = %node.config().node_id,
        mode = %node.info().election_mode,
        "ballotd listening"
    );

    node.start();
    axum::serve(listener, api::router(node.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    node.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
