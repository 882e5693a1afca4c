//! `oramad` entry point: parse flags, resolve configuration, bring up the
//! node, and wait for a shutdown signal.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod cli;
mod config;
mod node;

use cli::Cli;
use crate::config::LogFormat;
use node::OramaNode;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let resolved = match crate::config::resolve(cli) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            std::process::exit(1);
        }
    };

    init_logging(resolved.log_format);

    info!("starting oramad");

    let node = match OramaNode::start(&resolved.node, &resolved.sql_engine_binary).await {
        Ok(node) => node,
        Err(e) => {
            error!("failed to start node: {e:#}");
            std::process::exit(1);
        }
    };

    info!("oramad started");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => error!("unable to listen for shutdown signal: {e}"),
    }

    if let Err(e) = node.stop().await {
        error!("error during shutdown: {e:#}");
        return Err(e);
    }

    info!("oramad stopped");
    Ok(())
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
