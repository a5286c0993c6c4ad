// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum ContractRole {
    Bridge,
    Federation,
    AllowTokens,
}

/// Token type flag carried by the vote of newer federation contracts.
/// Only fungible transfers are relayed.
pub const FUNGIBLE_TOKEN_TYPE: u8 = 0;

/// Direction a federator instance relays: events are read on `origin`
/// and votes are cast on `destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainPair {
    pub origin: u64,
    pub destination: u64,
}

impl ChainPair {
    pub fn new(origin: u64, destination: u64) -> Self {
        Self {
            origin,
            destination,
        }
    }
}

impl fmt::Display for ChainPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.origin, self.destination)
    }
}

/// A `Cross` log decoded into the fields every bridge generation shares.
/// `symbol`, `decimals` and `granularity` are only emitted by legacy bridges,
/// chain ids only by multichain bridges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossTransferEvent {
    pub token_address: Address,
    pub sender: Address,
    pub receiver: Address,
    pub amount: U256,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub granularity: Option<U256>,
    pub token_type: u8,
    pub block_hash: H256,
    pub block_number: u64,
    pub transaction_hash: H256,
    pub log_index: u32,
    pub origin_chain_id: u64,
    pub destination_chain_id: Option<u64>,
}

impl CrossTransferEvent {
    /// Fields hashed into the transaction id and sent with the vote.
    pub fn vote_fields(&self, destination_chain_id: u64) -> VoteFields {
        VoteFields {
            original_token_address: self.token_address,
            sender: self.sender,
            receiver: self.receiver,
            amount: self.amount,
            block_hash: self.block_hash,
            transaction_hash: self.transaction_hash,
            log_index: self.log_index,
            origin_chain_id: self.origin_chain_id,
            destination_chain_id: self.destination_chain_id.unwrap_or(destination_chain_id),
            token_type: self.token_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteFields {
    pub original_token_address: Address,
    pub sender: Address,
    pub receiver: Address,
    pub amount: U256,
    pub block_hash: H256,
    pub transaction_hash: H256,
    pub log_index: u32,
    pub origin_chain_id: u64,
    pub destination_chain_id: u64,
    pub token_type: u8,
}

/// Value returned by the federation's `getTransactionId`. Rendered as
/// lowercase 0x-prefixed hex, which is also its key in the reverted ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionIdentity(pub H256);

impl TransactionIdentity {
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0 .0
    }
}

impl From<[u8; 32]> for TransactionIdentity {
    fn from(bytes: [u8; 32]) -> Self {
        TransactionIdentity(H256(bytes))
    }
}

impl fmt::Display for TransactionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0.as_bytes()))
    }
}

impl FromStr for TransactionIdentity {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.to_lowercase(), &mut bytes)?;
        Ok(TransactionIdentity(H256(bytes)))
    }
}

impl Serialize for TransactionIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TransactionIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Vote payload kept for a transfer whose vote was mined with a failed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertedTransactionRecord {
    pub original_token_address: Address,
    pub sender: Address,
    pub receiver: Address,
    pub amount: U256,
    pub block_hash: H256,
    pub transaction_hash: H256,
    pub log_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RevertedTransactionRecord {
    pub fn new(fields: &VoteFields, error: Option<String>) -> Self {
        Self {
            original_token_address: fields.original_token_address,
            sender: fields.sender,
            receiver: fields.receiver,
            amount: fields.amount,
            block_hash: fields.block_hash,
            transaction_hash: fields.transaction_hash,
            log_index: fields.log_index,
            error,
        }
    }
}

/// Arguments of the federation's `emitHeartbeat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatPayload {
    pub fed_rsk_block: U256,
    pub fed_eth_block: U256,
    pub fed_version: String,
    pub node_rsk_info: String,
    pub node_eth_info: String,
}
