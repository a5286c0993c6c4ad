// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{call_with_retry, probe_version, BridgeContract};
use crate::abi::{bridge_v3, bridge_v4, legacy_bridge};
use crate::error::{FederatorError, FederatorResult};
use crate::retry::RetryPolicy;
use crate::types::{ContractRole, CrossTransferEvent, FUNGIBLE_TOKEN_TYPE};
use async_trait::async_trait;
use ethers::contract::LogMeta;
use ethers::providers::Middleware;
use ethers::types::{Address, H256, U256};
use std::sync::Arc;
use strum_macros::Display;

const ROLE: ContractRole = ContractRole::Bridge;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BridgeVersion {
    /// v1 and v2, and bridges without `version()`.
    Legacy,
    V3,
    /// Multichain bridge.
    V4,
}

impl BridgeVersion {
    pub fn from_probe(version: Option<&str>) -> Option<Self> {
        match version {
            None | Some("v1") | Some("v2") => Some(BridgeVersion::Legacy),
            Some("v3") => Some(BridgeVersion::V3),
            Some("v4") => Some(BridgeVersion::V4),
            Some(_) => None,
        }
    }
}

enum BridgeBinding<M> {
    Legacy(legacy_bridge::Bridge<M>),
    V3(bridge_v3::Bridge<M>),
    V4(bridge_v4::Bridge<M>),
}

pub struct BridgeAdapter<M> {
    address: Address,
    chain_id: u64,
    client: Arc<M>,
    binding: BridgeBinding<M>,
    retry: RetryPolicy,
}

impl<M: Middleware + 'static> BridgeAdapter<M> {
    /// Builds the adapter matching the deployed bridge's `version()`.
    pub async fn create(
        client: Arc<M>,
        chain_id: u64,
        address: Address,
        retry: RetryPolicy,
    ) -> FederatorResult<Self> {
        let version = probe_version(client.clone(), ROLE, address, &retry).await?;
        let generation = BridgeVersion::from_probe(version.as_deref()).ok_or_else(|| {
            FederatorError::UnknownContractVersion {
                role: ROLE,
                address,
                version: version.clone().unwrap_or_default(),
            }
        })?;
        tracing::info!(
            "[{}] Bridge {:?} uses the {} adapter",
            chain_id,
            address,
            generation
        );
        let binding = match generation {
            BridgeVersion::Legacy => {
                BridgeBinding::Legacy(legacy_bridge::Bridge::new(address, client.clone()))
            }
            BridgeVersion::V3 => BridgeBinding::V3(bridge_v3::Bridge::new(address, client.clone())),
            BridgeVersion::V4 => BridgeBinding::V4(bridge_v4::Bridge::new(address, client.clone())),
        };
        Ok(Self {
            address,
            chain_id,
            client,
            binding,
            retry,
        })
    }

    pub fn version(&self) -> BridgeVersion {
        match self.binding {
            BridgeBinding::Legacy(_) => BridgeVersion::Legacy,
            BridgeBinding::V3(_) => BridgeVersion::V3,
            BridgeBinding::V4(_) => BridgeVersion::V4,
        }
    }

    fn contract_error(&self, operation: &'static str, err: impl std::fmt::Display) -> FederatorError {
        FederatorError::contract(ROLE, self.address, operation, err)
    }

    fn event_base(&self, meta: &LogMeta) -> FederatorResult<EventPosition> {
        let log_index = u32::try_from(meta.log_index).map_err(|_| {
            FederatorError::InternalError(format!(
                "Log index {} of tx {:?} does not fit in u32",
                meta.log_index, meta.transaction_hash
            ))
        })?;
        Ok(EventPosition {
            block_hash: meta.block_hash,
            block_number: meta.block_number.as_u64(),
            transaction_hash: meta.transaction_hash,
            log_index,
        })
    }

    // Legacy events do not carry the sender, it is the origin transaction's signer.
    async fn transaction_sender(&self, transaction_hash: H256) -> FederatorResult<Address> {
        let tx = self
            .client
            .get_transaction(transaction_hash)
            .await
            .map_err(|e| self.contract_error("getTransaction", e))?
            .ok_or_else(|| {
                self.contract_error(
                    "getTransaction",
                    format!("transaction {:?} not found", transaction_hash),
                )
            })?;
        Ok(tx.from)
    }

    async fn query_events(
        &self,
        from_block: u64,
        to_block: u64,
        destination_chain_id: u64,
    ) -> FederatorResult<Vec<CrossTransferEvent>> {
        let mut events = vec![];
        match &self.binding {
            BridgeBinding::Legacy(contract) => {
                let logs = contract
                    .cross_filter()
                    .from_block(from_block)
                    .to_block(to_block)
                    .query_with_meta()
                    .await
                    .map_err(|e| self.contract_error("getPastEvents", e))?;
                for (event, meta) in logs {
                    let position = self.event_base(&meta)?;
                    let sender = self.transaction_sender(meta.transaction_hash).await?;
                    events.push(position.into_event(
                        event.token_address,
                        sender,
                        event.to,
                        event.amount,
                        self.chain_id,
                        None,
                        Some((event.symbol, event.decimals, event.granularity)),
                    ));
                }
            }
            BridgeBinding::V3(contract) => {
                let logs = contract
                    .cross_filter()
                    .from_block(from_block)
                    .to_block(to_block)
                    .query_with_meta()
                    .await
                    .map_err(|e| self.contract_error("getPastEvents", e))?;
                for (event, meta) in logs {
                    let position = self.event_base(&meta)?;
                    events.push(position.into_event(
                        event.token_address,
                        event.from,
                        event.to,
                        event.amount,
                        self.chain_id,
                        None,
                        None,
                    ));
                }
            }
            BridgeBinding::V4(contract) => {
                let logs = contract
                    .cross_filter()
                    .topic3(H256::from_low_u64_be(destination_chain_id))
                    .from_block(from_block)
                    .to_block(to_block)
                    .query_with_meta()
                    .await
                    .map_err(|e| self.contract_error("getPastEvents", e))?;
                for (event, meta) in logs {
                    let destination = chain_id_from_u256(event.destination_chain_id)?;
                    if destination != destination_chain_id {
                        continue;
                    }
                    let position = self.event_base(&meta)?;
                    events.push(position.into_event(
                        event.token_address,
                        event.from,
                        event.to,
                        event.amount,
                        chain_id_from_u256(event.origin_chain_id)?,
                        Some(destination),
                        None,
                    ));
                }
            }
        }
        Ok(events)
    }
}

fn chain_id_from_u256(value: U256) -> FederatorResult<u64> {
    u64::try_from(value)
        .map_err(|_| FederatorError::InternalError(format!("Chain id {} does not fit in u64", value)))
}

struct EventPosition {
    block_hash: H256,
    block_number: u64,
    transaction_hash: H256,
    log_index: u32,
}

impl EventPosition {
    #[allow(clippy::too_many_arguments)]
    fn into_event(
        self,
        token_address: Address,
        sender: Address,
        receiver: Address,
        amount: U256,
        origin_chain_id: u64,
        destination_chain_id: Option<u64>,
        metadata: Option<(String, u8, U256)>,
    ) -> CrossTransferEvent {
        let (symbol, decimals, granularity) = match metadata {
            Some((symbol, decimals, granularity)) => {
                (Some(symbol), Some(decimals), Some(granularity))
            }
            None => (None, None, None),
        };
        CrossTransferEvent {
            token_address,
            sender,
            receiver,
            amount,
            symbol,
            decimals,
            granularity,
            token_type: FUNGIBLE_TOKEN_TYPE,
            block_hash: self.block_hash,
            block_number: self.block_number,
            transaction_hash: self.transaction_hash,
            log_index: self.log_index,
            origin_chain_id,
            destination_chain_id,
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> BridgeContract for BridgeAdapter<M> {
    fn address(&self) -> Address {
        self.address
    }

    async fn federation_address(&self) -> FederatorResult<Address> {
        call_with_retry(&self.retry, "getFederation", || async {
            let call = match &self.binding {
                BridgeBinding::Legacy(c) => c.get_federation(),
                BridgeBinding::V3(c) => c.get_federation(),
                BridgeBinding::V4(c) => c.get_federation(),
            };
            call.call()
                .await
                .map_err(|e| self.contract_error("getFederation", e))
        })
        .await
    }

    async fn allow_tokens_address(&self) -> FederatorResult<Address> {
        call_with_retry(&self.retry, "allowTokens", || async {
            let call = match &self.binding {
                BridgeBinding::Legacy(c) => c.allow_tokens(),
                BridgeBinding::V3(c) => c.allow_tokens(),
                BridgeBinding::V4(c) => c.allow_tokens(),
            };
            call.call()
                .await
                .map_err(|e| self.contract_error("allowTokens", e))
        })
        .await
    }

    async fn past_cross_events(
        &self,
        from_block: u64,
        to_block: u64,
        destination_chain_id: u64,
    ) -> FederatorResult<Vec<CrossTransferEvent>> {
        call_with_retry(&self.retry, "getPastEvents", || {
            self.query_events(from_block, to_block, destination_chain_id)
        })
        .await
    }

    async fn mapped_token(
        &self,
        original_token: Address,
        destination_chain_id: u64,
    ) -> FederatorResult<Address> {
        call_with_retry(&self.retry, "getMappedToken", || async {
            let call = match &self.binding {
                BridgeBinding::Legacy(c) => c.mapped_tokens(original_token),
                BridgeBinding::V3(c) => c.mapped_tokens(original_token),
                BridgeBinding::V4(c) => c.side_token_address_by_original_token_address(
                    U256::from(destination_chain_id),
                    original_token,
                ),
            };
            call.call()
                .await
                .map_err(|e| self.contract_error("getMappedToken", e))
        })
        .await
    }
}
