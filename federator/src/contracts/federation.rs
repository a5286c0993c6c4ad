// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{call_with_retry, probe_version, FederationContract};
use crate::abi::{federation_v2, federation_v3, federation_v4};
use crate::error::{FederatorError, FederatorResult};
use crate::retry::RetryPolicy;
use crate::types::{ContractRole, HeartbeatPayload, TransactionIdentity, VoteFields};
use async_trait::async_trait;
use ethers::abi::AbiEncode;
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, U256};
use std::sync::Arc;
use strum_macros::Display;

const ROLE: ContractRole = ContractRole::Federation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FederationVersion {
    /// v1 and v2, and federations without `version()`.
    V2,
    /// Vote carries the token type.
    V3,
    /// Transaction id and vote carry origin and destination chain ids.
    V4,
}

impl FederationVersion {
    pub fn from_probe(version: Option<&str>) -> Option<Self> {
        match version {
            None | Some("v1") | Some("v2") => Some(FederationVersion::V2),
            Some("v3") => Some(FederationVersion::V3),
            Some("v4") => Some(FederationVersion::V4),
            Some(_) => None,
        }
    }
}

enum FederationBinding<M> {
    V2(federation_v2::Federation<M>),
    V3(federation_v3::Federation<M>),
    V4(federation_v4::Federation<M>),
}

pub struct FederationAdapter<M> {
    address: Address,
    binding: FederationBinding<M>,
    retry: RetryPolicy,
}

impl<M: Middleware + 'static> FederationAdapter<M> {
    pub async fn create(
        client: Arc<M>,
        address: Address,
        retry: RetryPolicy,
    ) -> FederatorResult<Self> {
        let version = probe_version(client.clone(), ROLE, address, &retry).await?;
        let generation = FederationVersion::from_probe(version.as_deref()).ok_or_else(|| {
            FederatorError::UnknownContractVersion {
                role: ROLE,
                address,
                version: version.clone().unwrap_or_default(),
            }
        })?;
        tracing::info!("Federation {:?} uses the {} adapter", address, generation);
        let binding = match generation {
            FederationVersion::V2 => {
                FederationBinding::V2(federation_v2::Federation::new(address, client))
            }
            FederationVersion::V3 => {
                FederationBinding::V3(federation_v3::Federation::new(address, client))
            }
            FederationVersion::V4 => {
                FederationBinding::V4(federation_v4::Federation::new(address, client))
            }
        };
        Ok(Self {
            address,
            binding,
            retry,
        })
    }

    pub fn version(&self) -> FederationVersion {
        match self.binding {
            FederationBinding::V2(_) => FederationVersion::V2,
            FederationBinding::V3(_) => FederationVersion::V3,
            FederationBinding::V4(_) => FederationVersion::V4,
        }
    }

    fn contract_error(&self, operation: &'static str, err: impl std::fmt::Display) -> FederatorError {
        FederatorError::contract(ROLE, self.address, operation, err)
    }
}

/// Calldata of `voteTransaction` for the given generation.
pub fn encode_vote(version: FederationVersion, fields: &VoteFields) -> Bytes {
    let encoded = match version {
        FederationVersion::V2 => federation_v2::VoteTransactionCall {
            original_token_address: fields.original_token_address,
            sender: fields.sender,
            receiver: fields.receiver,
            amount: fields.amount,
            block_hash: fields.block_hash.0,
            transaction_hash: fields.transaction_hash.0,
            log_index: fields.log_index,
        }
        .encode(),
        FederationVersion::V3 => federation_v3::VoteTransactionCall {
            original_token_address: fields.original_token_address,
            sender: fields.sender,
            receiver: fields.receiver,
            amount: fields.amount,
            block_hash: fields.block_hash.0,
            transaction_hash: fields.transaction_hash.0,
            log_index: fields.log_index,
            token_type: fields.token_type,
        }
        .encode(),
        FederationVersion::V4 => federation_v4::VoteTransactionCall {
            original_token_address: fields.original_token_address,
            sender: fields.sender,
            receiver: fields.receiver,
            amount: fields.amount,
            block_hash: fields.block_hash.0,
            transaction_hash: fields.transaction_hash.0,
            log_index: fields.log_index,
            origin_chain_id: U256::from(fields.origin_chain_id),
            destination_chain_id: U256::from(fields.destination_chain_id),
        }
        .encode(),
    };
    encoded.into()
}

/// `emitHeartbeat` has the same signature in every generation.
pub fn encode_heartbeat(payload: &HeartbeatPayload) -> Bytes {
    federation_v2::EmitHeartbeatCall {
        fed_rsk_block: payload.fed_rsk_block,
        fed_eth_block: payload.fed_eth_block,
        fed_version: payload.fed_version.clone(),
        node_rsk_info: payload.node_rsk_info.clone(),
        node_eth_info: payload.node_eth_info.clone(),
    }
    .encode()
    .into()
}

#[async_trait]
impl<M: Middleware + 'static> FederationContract for FederationAdapter<M> {
    fn address(&self) -> Address {
        self.address
    }

    async fn is_member(&self, member: Address) -> FederatorResult<bool> {
        call_with_retry(&self.retry, "isMember", || async {
            let call = match &self.binding {
                FederationBinding::V2(c) => c.is_member(member),
                FederationBinding::V3(c) => c.is_member(member),
                FederationBinding::V4(c) => c.is_member(member),
            };
            call.call()
                .await
                .map_err(|e| self.contract_error("isMember", e))
        })
        .await
    }

    async fn transaction_id(&self, fields: &VoteFields) -> FederatorResult<TransactionIdentity> {
        call_with_retry(&self.retry, "getTransactionId", || async {
            let call = match &self.binding {
                FederationBinding::V2(c) => c.get_transaction_id(
                    fields.original_token_address,
                    fields.sender,
                    fields.receiver,
                    fields.amount,
                    fields.block_hash.0,
                    fields.transaction_hash.0,
                    fields.log_index,
                ),
                FederationBinding::V3(c) => c.get_transaction_id(
                    fields.original_token_address,
                    fields.sender,
                    fields.receiver,
                    fields.amount,
                    fields.block_hash.0,
                    fields.transaction_hash.0,
                    fields.log_index,
                ),
                FederationBinding::V4(c) => c.get_transaction_id(
                    fields.original_token_address,
                    fields.sender,
                    fields.receiver,
                    fields.amount,
                    fields.block_hash.0,
                    fields.transaction_hash.0,
                    fields.log_index,
                    U256::from(fields.origin_chain_id),
                    U256::from(fields.destination_chain_id),
                ),
            };
            call.call()
                .await
                .map(TransactionIdentity::from)
                .map_err(|e| self.contract_error("getTransactionId", e))
        })
        .await
    }

    async fn transaction_was_processed(&self, id: TransactionIdentity) -> FederatorResult<bool> {
        call_with_retry(&self.retry, "transactionWasProcessed", || async {
            let call = match &self.binding {
                FederationBinding::V2(c) => c.transaction_was_processed(id.as_bytes()),
                FederationBinding::V3(c) => c.transaction_was_processed(id.as_bytes()),
                FederationBinding::V4(c) => c.transaction_was_processed(id.as_bytes()),
            };
            call.call()
                .await
                .map_err(|e| self.contract_error("transactionWasProcessed", e))
        })
        .await
    }

    async fn has_voted(&self, id: TransactionIdentity, member: Address) -> FederatorResult<bool> {
        call_with_retry(&self.retry, "hasVoted", || async {
            // hasVoted checks msg.sender
            let call = match &self.binding {
                FederationBinding::V2(c) => c.has_voted(id.as_bytes()),
                FederationBinding::V3(c) => c.has_voted(id.as_bytes()),
                FederationBinding::V4(c) => c.has_voted(id.as_bytes()),
            };
            call.from(member)
                .call()
                .await
                .map_err(|e| self.contract_error("hasVoted", e))
        })
        .await
    }

    fn vote_calldata(&self, fields: &VoteFields) -> Bytes {
        encode_vote(self.version(), fields)
    }

    fn heartbeat_calldata(&self, payload: &HeartbeatPayload) -> Bytes {
        encode_heartbeat(payload)
    }
}
