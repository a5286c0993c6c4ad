// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain_handle::ChainHandle;
use crate::config::{ChainConfig, FederatorConfig};
use crate::contracts::{
    AllowTokensAdapter, AllowTokensContract, BridgeAdapter, BridgeContract, FederationAdapter,
    FederationContract,
};
use crate::error::{FederatorError, FederatorResult};
use crate::federator::{Federator, PairContracts};
use crate::metered_eth_provider::MeteredEthHttpProvider;
use crate::metrics::FederatorMetrics;
use crate::progress_store::{FileStore, ProgressStore};
use crate::retry::{RetryError, RetryPolicy, Retryable};
use crate::retry_with_max_elapsed_time;
use crate::scheduler::Scheduler;
use crate::transaction_sender::{TransactionSender, VoteSender};
use crate::types::ChainPair;
use ethers::providers::Provider;
use ethers::signers::LocalWallet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tap::TapFallible;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Time spent reaching a node at startup before giving up.
const CONNECT_MAX_ELAPSED: Duration = Duration::from_secs(120);

type EthProvider = Provider<MeteredEthHttpProvider>;

/// Everything deployed on one chain that its federators read or vote on.
struct ChainContracts {
    handle: Arc<ChainHandle<MeteredEthHttpProvider>>,
    bridge: Arc<dyn BridgeContract>,
    federation: Arc<dyn FederationContract>,
    allow_tokens: Arc<dyn AllowTokensContract>,
    sender: Arc<dyn VoteSender>,
}

/// Wraps a cycle error so the per pair budget retries every non fatal error,
/// not only transient RPC failures.
#[derive(Debug)]
struct CycleError(FederatorError);

impl Retryable for CycleError {
    fn is_transient(&self) -> bool {
        !self.0.is_fatal()
    }
}

/// A federator together with the budget its cycle runs under.
pub struct PairFederator {
    federator: Federator,
    retry: RetryPolicy,
    metrics: Arc<FederatorMetrics>,
}

impl PairFederator {
    pub fn new(federator: Federator, retry: RetryPolicy, metrics: Arc<FederatorMetrics>) -> Self {
        Self {
            federator,
            retry,
            metrics,
        }
    }

    pub fn pair(&self) -> ChainPair {
        self.federator.pair()
    }

    /// Runs one cycle, retrying failed cycles. Only fatal errors are
    /// returned; running out of attempts is one.
    pub async fn run(&self) -> FederatorResult<bool> {
        let pair = self.pair().to_string();
        let result = self
            .retry
            .retry(&pair, || async {
                self.federator.run().await.map_err(CycleError).tap_err(|e| {
                    error!("[{}] Federator cycle failed: {}", pair, e.0);
                    self.metrics
                        .cycle_failures
                        .with_label_values(&[&pair, e.0.error_type()])
                        .inc();
                })
            })
            .await;
        match result {
            Ok(worked) => Ok(worked),
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => Err(FederatorError::RetriesExhausted {
                attempts,
                last_error: last_error.0.to_string(),
            }),
            Err(RetryError::Aborted(e)) => Err(e.0),
        }
    }
}

/// Runs every pair in order. The first fatal error stops the cycle.
pub async fn run_all(federators: &[PairFederator]) -> FederatorResult<()> {
    for federator in federators {
        let worked = federator.run().await?;
        info!(
            "[{}] Federator cycle finished, work attempted: {}",
            federator.pair(),
            worked
        );
    }
    Ok(())
}

async fn connect_chain(
    config: &ChainConfig,
    retry: &RetryPolicy,
    metrics: &Arc<FederatorMetrics>,
) -> anyhow::Result<Arc<ChainHandle<MeteredEthHttpProvider>>> {
    let handle = retry_with_max_elapsed_time!(
        ChainHandle::connect(config, retry.clone(), metrics.clone()),
        CONNECT_MAX_ELAPSED
    )
    .map_err(|e| anyhow::anyhow!("[{}] Failed to connect: {:?}", config.name, e))??;
    Ok(Arc::new(handle))
}

async fn load_chain_contracts(
    config: &ChainConfig,
    handle: Arc<ChainHandle<MeteredEthHttpProvider>>,
    signer: Option<LocalWallet>,
    federator_config: &FederatorConfig,
) -> anyhow::Result<ChainContracts> {
    let client: Arc<EthProvider> = handle.provider();
    let retry = handle.retry_policy().clone();
    let bridge =
        BridgeAdapter::create(client.clone(), config.chain_id, config.bridge, retry.clone())
            .await?;
    let federation_address = match config.federation {
        Some(address) => address,
        None => bridge.federation_address().await?,
    };
    let allow_tokens_address = match config.allow_tokens {
        Some(address) => address,
        None => bridge.allow_tokens_address().await?,
    };
    let federation =
        FederationAdapter::create(client.clone(), federation_address, retry.clone()).await?;
    let allow_tokens =
        AllowTokensAdapter::create(client, config.chain_id, allow_tokens_address, retry).await?;
    let sender = TransactionSender::new(
        handle.clone(),
        signer,
        federator_config.etherscan_api_key.as_deref(),
        federator_config.receipt_timeout,
        federator_config.manual_check_path(),
    )
    .await?;
    info!(
        "[{}] Bridge {:?}, federation {:?}, allow tokens {:?}, federator {:?}",
        config.name,
        config.bridge,
        federation_address,
        allow_tokens_address,
        sender.address()
    );
    Ok(ChainContracts {
        handle,
        bridge: Arc::new(bridge),
        federation: Arc::new(federation),
        allow_tokens: Arc::new(allow_tokens),
        sender: Arc::new(sender),
    })
}

fn pair_federator(
    origin: (&ChainConfig, &ChainContracts),
    destination: (&ChainConfig, &ChainContracts),
    storage: &Path,
    federator_retries: u32,
    metrics: &Arc<FederatorMetrics>,
) -> PairFederator {
    let (origin_config, origin) = origin;
    let (destination_config, destination) = destination;
    let pair = ChainPair::new(origin_config.chain_id, destination_config.chain_id);
    let federator = Federator::new(
        pair,
        origin.handle.clone(),
        destination.handle.clone(),
        PairContracts {
            origin_bridge: origin.bridge.clone(),
            origin_allow_tokens: origin.allow_tokens.clone(),
            destination_federation: destination.federation.clone(),
        },
        destination.sender.clone(),
        ProgressStore::new(
            Arc::new(FileStore::new(storage)),
            pair,
            origin_config.from_block,
        ),
        metrics.clone(),
    );
    PairFederator::new(
        federator,
        RetryPolicy::new(federator_retries, origin_config.block_time()),
        metrics.clone(),
    )
}

/// Connects to every chain and builds a federator per direction: main to
/// side chain under the storage path, side to main chain under `side-fed`.
pub async fn build_federators(
    config: &FederatorConfig,
    metrics: Arc<FederatorMetrics>,
) -> anyhow::Result<Vec<PairFederator>> {
    let signer = config.signer()?;
    let main_handle = connect_chain(&config.mainchain, &config.rpc_retry, &metrics).await?;
    let main = load_chain_contracts(&config.mainchain, main_handle, signer.clone(), config).await?;

    let mut federators = vec![];
    for side_config in &config.sidechain {
        let side_handle = connect_chain(side_config, &config.rpc_retry, &metrics).await?;
        let side = load_chain_contracts(side_config, side_handle, signer.clone(), config).await?;
        federators.push(pair_federator(
            (&config.mainchain, &main),
            (side_config, &side),
            &config.storage_path,
            config.federator_retries,
            &metrics,
        ));
        federators.push(pair_federator(
            (side_config, &side),
            (&config.mainchain, &main),
            &config.side_storage_path(),
            config.federator_retries,
            &metrics,
        ));
    }
    Ok(federators)
}

/// Starts the federators on a scheduler. The returned handle resolves with
/// the first fatal error, or `Ok` once the scheduler is stopped.
pub async fn run_federator_node(
    config: FederatorConfig,
    prometheus_registry: &prometheus::Registry,
) -> anyhow::Result<(Scheduler, JoinHandle<FederatorResult<()>>)> {
    let metrics = Arc::new(FederatorMetrics::new(prometheus_registry));
    let start_time = std::time::Instant::now();

    let uptime_metrics = metrics.clone();
    tokio::spawn(async move {
        loop {
            uptime_metrics
                .uptime_seconds
                .set(start_time.elapsed().as_secs() as i64);
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    });

    let federators = Arc::new(build_federators(&config, metrics).await?);
    let scheduler = Scheduler::new(config.run_every());
    info!(
        "Running {} federators every {:?}",
        federators.len(),
        config.run_every()
    );
    let handle = scheduler.start(move || {
        let federators = federators.clone();
        async move { run_all(&federators).await }
    })?;
    Ok((scheduler, handle))
}
