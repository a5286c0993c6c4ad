// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};
use token_bridge_federator::config::{Config, FederatorConfig};
use token_bridge_federator::metrics::start_metrics_server;
use token_bridge_federator::node::run_federator_node;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
#[clap(name = env!("CARGO_BIN_NAME"))]
#[clap(version)]
struct Args {
    #[clap(long)]
    pub config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = FederatorConfig::load(&args.config_path)?;
    config.validate()?;

    let prometheus_registry = prometheus::Registry::new();
    let metrics_address =
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), config.metrics_port);
    start_metrics_server(metrics_address, prometheus_registry.clone()).await?;
    info!("Metrics server started at port {}", config.metrics_port);

    let (scheduler, mut handle) = run_federator_node(config, &prometheus_registry).await?;
    let finished = tokio::select! {
        result = &mut handle => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let result = match finished {
        Some(result) => result,
        None => {
            info!("Shutting down after the current cycle");
            scheduler.stop();
            handle.await
        }
    };
    match result.map_err(|e| anyhow::anyhow!("Task join error: {}", e))? {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Federator stopped with a fatal error: {}", e);
            Err(e.into())
        }
    }
}
