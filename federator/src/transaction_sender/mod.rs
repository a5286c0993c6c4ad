// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Builds, signs and submits transactions, then waits for their receipt.

use crate::chain_handle::{ChainHandle, ChainReader};
use crate::error::{FederatorError, FederatorResult};
use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, Middleware, PendingTransaction};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, TransactionReceipt, TransactionRequest, H256, U256};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tap::TapFallible;
use tokio::io::AsyncWriteExt;

pub mod gas_oracle;

use gas_oracle::{eth_gas_price, rsk_gas_price, EtherscanGasOracle};

/// Gas estimation is unreliable on RSK and on Ethereum after London.
pub const MIN_GAS_LIMIT: u64 = 250_000;
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(750);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const ETH_MAINNET_CHAIN_ID: u64 = 1;
const RSK_MAINNET_CHAIN_ID: u64 = 30;
const RSK_TESTNET_CHAIN_ID: u64 = 31;

pub fn is_rsk(chain_id: u64) -> bool {
    chain_id == RSK_MAINNET_CHAIN_ID || chain_id == RSK_TESTNET_CHAIN_ID
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Receipt with status 1.
    Mined {
        transaction_hash: H256,
        block_number: Option<u64>,
    },
    /// Receipt with status 0, or the node rejected the transaction.
    Reverted {
        transaction_hash: Option<H256>,
        error: String,
    },
    /// Submitted but no receipt was observed. It may still be mined.
    Unknown { transaction_hash: Option<H256> },
}

/// Submits transactions to the destination chain on behalf of the federator.
#[async_trait]
pub trait VoteSender: Send + Sync {
    fn address(&self) -> Address;

    async fn send(&self, to: Address, data: Bytes, value: U256) -> FederatorResult<SendOutcome>;
}

pub struct TransactionSender<P> {
    chain: Arc<ChainHandle<P>>,
    signer: Option<LocalWallet>,
    from: Address,
    gas_oracle: Option<EtherscanGasOracle>,
    receipt_timeout: Duration,
    poll_interval: Duration,
    manual_check_path: PathBuf,
}

impl<P> TransactionSender<P>
where
    P: JsonRpcClient + 'static,
{
    /// Without a wallet the node's first account signs, which only works
    /// against development nodes.
    pub async fn new(
        chain: Arc<ChainHandle<P>>,
        signer: Option<LocalWallet>,
        etherscan_api_key: Option<&str>,
        receipt_timeout: Duration,
        manual_check_path: PathBuf,
    ) -> FederatorResult<Self> {
        let from = match &signer {
            Some(wallet) => wallet.address(),
            None => {
                let accounts = chain.provider().get_accounts().await?;
                accounts.first().copied().ok_or_else(|| {
                    FederatorError::SignerError(format!(
                        "[{}] No private key configured and the node has no accounts",
                        chain.name()
                    ))
                })?
            }
        };
        let gas_oracle = etherscan_api_key
            .filter(|key| !key.is_empty())
            .map(EtherscanGasOracle::new)
            .transpose()?;
        Ok(Self {
            chain,
            signer,
            from,
            gas_oracle,
            receipt_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            manual_check_path,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub async fn gas_price(&self) -> FederatorResult<U256> {
        let chain_id = self.chain.chain_id().await?;
        let provider = self.chain.provider();
        if is_rsk(chain_id) {
            let block: Value = provider
                .request("eth_getBlockByNumber", ("latest", false))
                .await?;
            let minimum = block
                .get("minimumGasPrice")
                .cloned()
                .map(serde_json::from_value::<U256>)
                .transpose()
                .map_err(|e| FederatorError::ProviderError(format!("minimumGasPrice: {}", e)))?
                .unwrap_or_default();
            return Ok(rsk_gas_price(minimum));
        }
        let node_gas_price = provider.get_gas_price().await?;
        let reading = match (&self.gas_oracle, chain_id) {
            (Some(oracle), ETH_MAINNET_CHAIN_ID) => oracle
                .reading()
                .await
                .tap_err(|e| {
                    tracing::warn!(
                        "[{}] Gas oracle unavailable, using node gas price: {:?}",
                        self.chain.name(),
                        e
                    )
                })
                .ok(),
            _ => None,
        };
        Ok(eth_gas_price(node_gas_price, reading))
    }

    /// Nonce, gas price and chain id. These are plain reads, so an error
    /// response here is reported as transient rather than as a rejection.
    async fn prepare_transaction(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> FederatorResult<TypedTransaction> {
        let prepared: FederatorResult<TypedTransaction> = async {
            let chain_id = self.chain.chain_id().await?;
            let nonce = self
                .chain
                .provider()
                .get_transaction_count(self.from, Some(BlockNumber::Pending.into()))
                .await?;
            let gas_price = self.gas_price().await?;
            Ok(TransactionRequest::new()
                .from(self.from)
                .to(to)
                .data(data)
                .value(value)
                .nonce(nonce)
                .gas_price(gas_price)
                .chain_id(chain_id)
                .into())
        }
        .await;
        prepared.map_err(read_error)
    }

    async fn estimate_gas(&self, tx: &mut TypedTransaction) -> FederatorResult<()> {
        let estimate = self.chain.provider().estimate_gas(tx, None).await?;
        tx.set_gas(estimate.max(U256::from(MIN_GAS_LIMIT)));
        tracing::debug!("[{}] Built transaction {:?}", self.chain.name(), tx);
        Ok(())
    }

    async fn submit(&self, tx: TypedTransaction) -> FederatorResult<H256> {
        let provider = self.chain.provider();
        let pending = match &self.signer {
            Some(wallet) => {
                let chain_id = tx.chain_id().map(|id| id.as_u64()).unwrap_or_default();
                let wallet = wallet.clone().with_chain_id(chain_id);
                let signature = wallet
                    .sign_transaction(&tx)
                    .await
                    .map_err(|e| FederatorError::SignerError(e.to_string()))?;
                provider.send_raw_transaction(tx.rlp_signed(&signature)).await?
            }
            None => provider.send_transaction(tx, None).await?,
        };
        Ok(pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Option<TransactionReceipt> {
        let provider = self.chain.provider();
        let pending = PendingTransaction::new(tx_hash, provider.as_ref())
            .interval(self.poll_interval);
        match tokio::time::timeout(self.receipt_timeout, pending).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                tracing::warn!(
                    "[{}] Error waiting for receipt of {:?}: {:?}",
                    self.chain.name(),
                    tx_hash,
                    e
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    "[{}] Transaction {:?} was not mined within {:?}, it might still be mined",
                    self.chain.name(),
                    tx_hash,
                    self.receipt_timeout
                );
                None
            }
        }
    }

    async fn record_for_manual_check(&self, tx_hash: Option<H256>, to: Address, data: &Bytes) {
        let hash = tx_hash.map_or_else(|| "unknown".to_string(), |h| format!("{:?}", h));
        let line = format!("transactionHash:{} to:{:?} data:{}\n", hash, to, data);
        let result = async {
            if let Some(parent) = self.manual_check_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.manual_check_path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = result {
            tracing::error!(
                "Failed to append to {:?}: {:?}. Check manually: {}",
                self.manual_check_path,
                e,
                line.trim_end()
            );
        }
    }
}

fn read_error(e: FederatorError) -> FederatorError {
    match e {
        FederatorError::ProviderError(message) => FederatorError::TransientProviderError(message),
        e => e,
    }
}

/// Error responses to gas estimation or submission mean the node refused
/// the vote itself.
fn rejected(chain: &str, to: Address, e: FederatorError) -> FederatorResult<SendOutcome> {
    match e {
        FederatorError::ProviderError(error) => {
            tracing::error!("[{}] Node rejected transaction to {:?}: {}", chain, to, error);
            Ok(SendOutcome::Reverted {
                transaction_hash: None,
                error,
            })
        }
        e => Err(e),
    }
}

pub fn outcome_from_receipt(tx_hash: H256, receipt: Option<TransactionReceipt>) -> SendOutcome {
    match receipt {
        Some(receipt) if receipt.status == Some(1u64.into()) => SendOutcome::Mined {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|b| b.as_u64()),
        },
        Some(receipt) if receipt.status == Some(0u64.into()) => SendOutcome::Reverted {
            transaction_hash: Some(receipt.transaction_hash),
            error: "transaction receipt status failed".to_string(),
        },
        _ => SendOutcome::Unknown {
            transaction_hash: Some(tx_hash),
        },
    }
}

#[async_trait]
impl<P> VoteSender for TransactionSender<P>
where
    P: JsonRpcClient + 'static,
{
    fn address(&self) -> Address {
        self.from
    }

    async fn send(&self, to: Address, data: Bytes, value: U256) -> FederatorResult<SendOutcome> {
        let name = self.chain.name().to_string();
        let mut tx = self.prepare_transaction(to, data.clone(), value).await?;
        if let Err(e) = self.estimate_gas(&mut tx).await {
            return rejected(&name, to, e);
        }
        let tx_hash = match self.submit(tx).await {
            Ok(hash) => hash,
            Err(e) => return rejected(&name, to, e),
        };
        tracing::info!("[{}] Sent transaction {:?} to {:?}", name, tx_hash, to);

        let receipt = self.wait_for_receipt(tx_hash).await;
        let outcome = outcome_from_receipt(tx_hash, receipt);
        match &outcome {
            SendOutcome::Mined { block_number, .. } => tracing::info!(
                "[{}] Transaction successful {:?} in block {:?}",
                name,
                tx_hash,
                block_number
            ),
            SendOutcome::Reverted { .. } => {
                tracing::error!("[{}] Transaction {:?} receipt status failed", name, tx_hash)
            }
            SendOutcome::Unknown { transaction_hash } => {
                self.record_for_manual_check(*transaction_hash, to, &data)
                    .await
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eth_mock_provider::EthMockProvider;
    use crate::retry::RetryPolicy;
    use ethers::providers::Provider;
    use ethers::types::{Transaction, U64};

    const TEST_KEY: &str = "4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d";
    const TX_HASH: H256 = H256::repeat_byte(0x77);

    fn chain(mock: &EthMockProvider, chain_id: u64) -> Arc<ChainHandle<EthMockProvider>> {
        mock.add_method_response("eth_chainId", U64::from(chain_id))
            .unwrap();
        Arc::new(ChainHandle::new(
            "eth",
            Provider::new(mock.clone()),
            None,
            RetryPolicy::new(1, Duration::from_millis(1)),
        ))
    }

    fn mock_build(mock: &EthMockProvider) {
        mock.add_method_response("eth_getTransactionCount", U256::from(7))
            .unwrap();
        mock.add_method_response("eth_gasPrice", U256::from(20_000_000_000u64))
            .unwrap();
        mock.add_method_response("eth_estimateGas", U256::from(90_000))
            .unwrap();
        mock.add_method_response("eth_sendRawTransaction", TX_HASH)
            .unwrap();
    }

    fn mock_mined(mock: &EthMockProvider, status: u64) {
        mock.add_method_response(
            "eth_getTransactionByHash",
            Transaction {
                hash: TX_HASH,
                block_number: Some(U64::from(100)),
                ..Default::default()
            },
        )
        .unwrap();
        mock.add_method_response(
            "eth_getTransactionReceipt",
            TransactionReceipt {
                transaction_hash: TX_HASH,
                block_number: Some(U64::from(100)),
                status: Some(U64::from(status)),
                ..Default::default()
            },
        )
        .unwrap();
    }

    async fn sender(
        mock: &EthMockProvider,
        chain_id: u64,
        dir: &tempfile::TempDir,
    ) -> TransactionSender<EthMockProvider> {
        TransactionSender::new(
            chain(mock, chain_id),
            Some(TEST_KEY.parse().unwrap()),
            None,
            Duration::from_millis(200),
            dir.path().join("manuallyCheck.txt"),
        )
        .await
        .unwrap()
        .with_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_mined_vote() {
        let dir = tempfile::tempdir().unwrap();
        let mock = EthMockProvider::new();
        mock_build(&mock);
        mock_mined(&mock, 1);
        let sender = sender(&mock, 42, &dir).await;

        let outcome = sender
            .send(Address::repeat_byte(1), vec![1, 2, 3].into(), U256::zero())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Mined {
                transaction_hash: TX_HASH,
                block_number: Some(100)
            }
        );
        assert_eq!(mock.request_count("eth_sendRawTransaction"), 1);
        assert!(!dir.path().join("manuallyCheck.txt").exists());
    }

    #[tokio::test]
    async fn test_failed_receipt_is_reverted() {
        let dir = tempfile::tempdir().unwrap();
        let mock = EthMockProvider::new();
        mock_build(&mock);
        mock_mined(&mock, 0);
        let sender = sender(&mock, 42, &dir).await;

        let outcome = sender
            .send(Address::repeat_byte(1), Bytes::default(), U256::zero())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            SendOutcome::Reverted {
                transaction_hash: Some(hash),
                ..
            } if hash == TX_HASH
        ));
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_logged_for_manual_check() {
        let dir = tempfile::tempdir().unwrap();
        let mock = EthMockProvider::new();
        mock_build(&mock);
        mock.add_method_response("eth_getTransactionByHash", Value::Null)
            .unwrap();
        let sender = sender(&mock, 42, &dir).await;
        let to = Address::repeat_byte(1);

        let outcome = sender
            .send(to, vec![0xab, 0xcd].into(), U256::zero())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Unknown {
                transaction_hash: Some(TX_HASH)
            }
        );
        let logged = std::fs::read_to_string(dir.path().join("manuallyCheck.txt")).unwrap();
        assert_eq!(
            logged,
            format!("transactionHash:{:?} to:{:?} data:0xabcd\n", TX_HASH, to)
        );
    }

    #[tokio::test]
    async fn test_receipt_timeout_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mock = EthMockProvider::new();
        mock_build(&mock);
        // Never included in a block.
        mock.add_method_response(
            "eth_getTransactionByHash",
            Transaction {
                hash: TX_HASH,
                ..Default::default()
            },
        )
        .unwrap();
        let sender = sender(&mock, 42, &dir).await;

        let outcome = sender
            .send(Address::repeat_byte(1), Bytes::default(), U256::zero())
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Unknown { .. }));
        assert!(dir.path().join("manuallyCheck.txt").exists());
    }

    #[tokio::test]
    async fn test_node_rejection_is_reverted() {
        let dir = tempfile::tempdir().unwrap();
        let mock = EthMockProvider::new();
        mock_build(&mock);
        mock.add_method_error("eth_estimateGas", -32000, "execution reverted");
        let sender = sender(&mock, 42, &dir).await;

        let outcome = sender
            .send(Address::repeat_byte(1), Bytes::default(), U256::zero())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Reverted {
                transaction_hash: None,
                error: "(code: -32000, message: execution reverted, data: None)".to_string()
            }
        );
        assert_eq!(mock.request_count("eth_sendRawTransaction"), 0);
    }

    #[tokio::test]
    async fn test_failed_gas_price_read_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let mock = EthMockProvider::new();
        mock_build(&mock);
        mock.add_method_error("eth_gasPrice", -32000, "header not found");
        let sender = sender(&mock, 42, &dir).await;

        let err = sender
            .send(Address::repeat_byte(1), Bytes::default(), U256::zero())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FederatorError::TransientProviderError(
                "(code: -32000, message: header not found, data: None)".to_string()
            )
        );
        assert_eq!(mock.request_count("eth_estimateGas"), 0);
        assert_eq!(mock.request_count("eth_sendRawTransaction"), 0);
    }

    #[tokio::test]
    async fn test_failed_nonce_read_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let mock = EthMockProvider::new();
        mock_build(&mock);
        mock.add_method_error("eth_getTransactionCount", -32000, "header not found");
        let sender = sender(&mock, 42, &dir).await;

        let err = sender
            .send(Address::repeat_byte(1), Bytes::default(), U256::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, FederatorError::TransientProviderError(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_rejected_raw_transaction_is_reverted() {
        let dir = tempfile::tempdir().unwrap();
        let mock = EthMockProvider::new();
        mock_build(&mock);
        mock.add_method_error("eth_sendRawTransaction", -32000, "nonce too low");
        let sender = sender(&mock, 42, &dir).await;

        let outcome = sender
            .send(Address::repeat_byte(1), Bytes::default(), U256::zero())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Reverted {
                transaction_hash: None,
                error: "(code: -32000, message: nonce too low, data: None)".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_rsk_block_read_failure_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let mock = EthMockProvider::new();
        mock_build(&mock);
        mock.add_method_error("eth_getBlockByNumber", -32000, "header not found");
        let sender = sender(&mock, 31, &dir).await;

        let err = sender
            .send(Address::repeat_byte(1), Bytes::default(), U256::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, FederatorError::TransientProviderError(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mock = EthMockProvider::new();
        // Nothing registered for the nonce query.
        let sender = sender(&mock, 42, &dir).await;
        let err = sender
            .send(Address::repeat_byte(1), Bytes::default(), U256::zero())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_rsk_gas_price_uses_block_minimum() {
        let dir = tempfile::tempdir().unwrap();
        let mock = EthMockProvider::new();
        mock.add_method_response(
            "eth_getBlockByNumber",
            serde_json::json!({ "number": "0x10", "minimumGasPrice": "0x3938700" }),
        )
        .unwrap();
        let sender = sender(&mock, 31, &dir).await;
        // 60000000 * 1.03
        assert_eq!(sender.gas_price().await.unwrap(), U256::from(61_800_000u64));
    }

    #[tokio::test]
    async fn test_node_account_used_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let mock = EthMockProvider::new();
        let account = Address::repeat_byte(0x42);
        mock.add_method_response("eth_accounts", vec![account])
            .unwrap();
        let sender = TransactionSender::new(
            chain(&mock, 5777),
            None,
            None,
            DEFAULT_RECEIPT_TIMEOUT,
            dir.path().join("manuallyCheck.txt"),
        )
        .await
        .unwrap();
        assert_eq!(sender.address(), account);

        let empty = EthMockProvider::new();
        empty
            .add_method_response("eth_accounts", Vec::<Address>::new())
            .unwrap();
        let result = TransactionSender::new(
            chain(&empty, 5777),
            None,
            None,
            DEFAULT_RECEIPT_TIMEOUT,
            dir.path().join("manuallyCheck.txt"),
        )
        .await;
        assert!(matches!(result, Err(FederatorError::SignerError(_))));
    }
}
