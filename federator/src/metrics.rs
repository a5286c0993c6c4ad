// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use axum::{extract::State, http::StatusCode, routing::get, Router};
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_vec_with_registry, register_int_gauge_with_registry, Encoder,
    HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Registry, TextEncoder,
};
use std::net::SocketAddr;
use tokio::task::JoinHandle;

const FINE_GRAINED_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4, 0.45, 0.5, 0.6, 0.7, 0.8, 0.9,
    1.0, 1.2, 1.4, 1.6, 1.8, 2.0, 2.5, 3.0, 3.5, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10., 15., 20., 25.,
    30., 40., 50., 60., 90., 120.,
];

#[derive(Clone, Debug)]
pub struct FederatorMetrics {
    pub(crate) rpc_queries: IntCounterVec,
    pub(crate) rpc_queries_latency: HistogramVec,
    pub(crate) node_connected: IntGaugeVec,

    pub(crate) cycles_run: IntCounterVec,
    pub(crate) cycle_failures: IntCounterVec,
    pub(crate) last_scanned_block: IntGaugeVec,
    pub(crate) events_scanned: IntCounterVec,
    pub(crate) events_skipped: IntCounterVec,

    pub(crate) votes_submitted: IntCounterVec,
    pub(crate) votes_mined: IntCounterVec,
    pub(crate) votes_reverted: IntCounterVec,
    pub(crate) votes_unknown: IntCounterVec,

    pub(crate) uptime_seconds: IntGauge,
}

impl FederatorMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            rpc_queries: register_int_counter_vec_with_registry!(
                "federator_rpc_queries",
                "Total number of queries issued to chain providers, by chain and method",
                &["chain", "method"],
                registry,
            )
            .unwrap(),
            rpc_queries_latency: register_histogram_vec_with_registry!(
                "federator_rpc_queries_latency",
                "Latency of queries issued to chain providers, by chain and method",
                &["chain", "method"],
                FINE_GRAINED_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            node_connected: register_int_gauge_vec_with_registry!(
                "federator_node_connected",
                "Whether the last request to the chain node succeeded (1) or failed (0)",
                &["chain"],
                registry,
            )
            .unwrap(),
            cycles_run: register_int_counter_vec_with_registry!(
                "federator_cycles_run",
                "Total number of federator cycles that attempted work, by chain pair",
                &["pair"],
                registry,
            )
            .unwrap(),
            cycle_failures: register_int_counter_vec_with_registry!(
                "federator_cycle_failures",
                "Total number of failed federator cycles, by chain pair and error type",
                &["pair", "error_type"],
                registry,
            )
            .unwrap(),
            last_scanned_block: register_int_gauge_vec_with_registry!(
                "federator_last_scanned_block",
                "Last origin block persisted as fully scanned, by chain pair",
                &["pair"],
                registry,
            )
            .unwrap(),
            events_scanned: register_int_counter_vec_with_registry!(
                "federator_events_scanned",
                "Total number of Cross events read from the origin bridge, by chain pair",
                &["pair"],
                registry,
            )
            .unwrap(),
            events_skipped: register_int_counter_vec_with_registry!(
                "federator_events_skipped",
                "Total number of Cross events not voted, by chain pair and reason",
                &["pair", "reason"],
                registry,
            )
            .unwrap(),
            votes_submitted: register_int_counter_vec_with_registry!(
                "federator_votes_submitted",
                "Total number of vote transactions submitted, by chain pair",
                &["pair"],
                registry,
            )
            .unwrap(),
            votes_mined: register_int_counter_vec_with_registry!(
                "federator_votes_mined",
                "Total number of vote transactions mined successfully, by chain pair",
                &["pair"],
                registry,
            )
            .unwrap(),
            votes_reverted: register_int_counter_vec_with_registry!(
                "federator_votes_reverted",
                "Total number of vote transactions recorded as reverted, by chain pair",
                &["pair"],
                registry,
            )
            .unwrap(),
            votes_unknown: register_int_counter_vec_with_registry!(
                "federator_votes_unknown",
                "Total number of vote transactions with unknown outcome, by chain pair",
                &["pair"],
                registry,
            )
            .unwrap(),
            uptime_seconds: register_int_gauge_with_registry!(
                "federator_uptime_seconds",
                "Seconds since the federator process started",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}

async fn metrics_handler(State(registry): State<Registry>) -> (StatusCode, String) {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Serves the registry in the Prometheus text format on `/metrics`.
pub async fn start_metrics_server(
    address: SocketAddr,
    registry: Registry,
) -> anyhow::Result<JoinHandle<()>> {
    let router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!("Metrics server listening on {}", address);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("Metrics server error: {:?}", e);
        }
    }))
}
