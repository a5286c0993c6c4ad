// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory stand-ins for the chain, contract and sender seams, for
//! exercising the federator without a node.

use crate::chain_handle::ChainReader;
use crate::confirmations::{Confirmations, TokenLimits};
use crate::contracts::{AllowTokensContract, BridgeContract, FederationContract};
use crate::error::{FederatorError, FederatorResult};
use crate::transaction_sender::{SendOutcome, VoteSender};
use crate::types::{
    CrossTransferEvent, HeartbeatPayload, TransactionIdentity, VoteFields, FUNGIBLE_TOKEN_TYPE,
};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub struct FakeChain {
    name: String,
    chain_id: u64,
    height: AtomicU64,
    syncing: AtomicBool,
}

impl FakeChain {
    pub fn new(name: &str, chain_id: u64, height: u64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            chain_id,
            height: AtomicU64::new(height),
            syncing: AtomicBool::new(false),
        })
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.syncing.store(syncing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chain_id(&self) -> FederatorResult<u64> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> FederatorResult<u64> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn is_syncing(&self) -> FederatorResult<bool> {
        Ok(self.syncing.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct FakeBridge {
    events: Mutex<Vec<CrossTransferEvent>>,
    mapped_tokens: Mutex<HashMap<Address, Address>>,
    queried_ranges: Mutex<Vec<(u64, u64)>>,
    failing: AtomicBool,
}

impl FakeBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_event(&self, event: CrossTransferEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn map_token(&self, original: Address, side: Address) {
        self.mapped_tokens.lock().unwrap().insert(original, side);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn queried_ranges(&self) -> Vec<(u64, u64)> {
        self.queried_ranges.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeContract for FakeBridge {
    fn address(&self) -> Address {
        Address::repeat_byte(0xb0)
    }

    async fn federation_address(&self) -> FederatorResult<Address> {
        Ok(Address::repeat_byte(0xfe))
    }

    async fn allow_tokens_address(&self) -> FederatorResult<Address> {
        Ok(Address::repeat_byte(0xa1))
    }

    async fn past_cross_events(
        &self,
        from_block: u64,
        to_block: u64,
        destination_chain_id: u64,
    ) -> FederatorResult<Vec<CrossTransferEvent>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FederatorError::TransientProviderError(
                "connection refused".to_string(),
            ));
        }
        self.queried_ranges
            .lock()
            .unwrap()
            .push((from_block, to_block));
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .filter(|e| {
                e.destination_chain_id
                    .map_or(true, |dest| dest == destination_chain_id)
            })
            .cloned()
            .collect())
    }

    async fn mapped_token(
        &self,
        original_token: Address,
        _destination_chain_id: u64,
    ) -> FederatorResult<Address> {
        Ok(self
            .mapped_tokens
            .lock()
            .unwrap()
            .get(&original_token)
            .copied()
            .unwrap_or_default())
    }
}

/// Transaction ids are the keccak of the vote fields. The vote calldata is
/// the id itself so `FakeVoteSender` can record who voted what.
#[derive(Default)]
pub struct FakeFederation {
    members: Mutex<HashSet<Address>>,
    processed: Mutex<HashSet<TransactionIdentity>>,
    votes: Mutex<HashSet<(TransactionIdentity, Address)>>,
}

impl FakeFederation {
    pub fn new(members: &[Address]) -> Arc<Self> {
        Arc::new(Self {
            members: Mutex::new(members.iter().copied().collect()),
            ..Default::default()
        })
    }

    pub fn mark_processed(&self, id: TransactionIdentity) {
        self.processed.lock().unwrap().insert(id);
    }

    pub fn record_vote(&self, id: TransactionIdentity, member: Address) {
        self.votes.lock().unwrap().insert((id, member));
    }

    pub fn id_for(fields: &VoteFields) -> TransactionIdentity {
        let encoded = ethers::abi::encode(&[
            ethers::abi::Token::Address(fields.original_token_address),
            ethers::abi::Token::Address(fields.sender),
            ethers::abi::Token::Address(fields.receiver),
            ethers::abi::Token::Uint(fields.amount),
            ethers::abi::Token::FixedBytes(fields.block_hash.as_bytes().to_vec()),
            ethers::abi::Token::FixedBytes(fields.transaction_hash.as_bytes().to_vec()),
            ethers::abi::Token::Uint(U256::from(fields.log_index)),
        ]);
        TransactionIdentity::from(keccak256(encoded))
    }
}

#[async_trait]
impl FederationContract for FakeFederation {
    fn address(&self) -> Address {
        Address::repeat_byte(0xfe)
    }

    async fn is_member(&self, member: Address) -> FederatorResult<bool> {
        Ok(self.members.lock().unwrap().contains(&member))
    }

    async fn transaction_id(&self, fields: &VoteFields) -> FederatorResult<TransactionIdentity> {
        Ok(Self::id_for(fields))
    }

    async fn transaction_was_processed(&self, id: TransactionIdentity) -> FederatorResult<bool> {
        Ok(self.processed.lock().unwrap().contains(&id))
    }

    async fn has_voted(&self, id: TransactionIdentity, member: Address) -> FederatorResult<bool> {
        Ok(self.votes.lock().unwrap().contains(&(id, member)))
    }

    fn vote_calldata(&self, fields: &VoteFields) -> Bytes {
        Bytes::from(Self::id_for(fields).as_bytes().to_vec())
    }

    fn heartbeat_calldata(&self, payload: &HeartbeatPayload) -> Bytes {
        Bytes::from(payload.fed_version.clone().into_bytes())
    }
}

pub struct FakeAllowTokens {
    confirmations: Confirmations,
    limits: Mutex<HashMap<Address, TokenLimits>>,
}

impl FakeAllowTokens {
    /// Tokens without explicit limits are not allowed.
    pub fn new(confirmations: Confirmations) -> Arc<Self> {
        Arc::new(Self {
            confirmations,
            limits: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_limits(&self, token: Address, limits: TokenLimits) {
        self.limits.lock().unwrap().insert(token, limits);
    }
}

#[async_trait]
impl AllowTokensContract for FakeAllowTokens {
    async fn confirmations(&self) -> FederatorResult<Confirmations> {
        Ok(self.confirmations)
    }

    async fn limits(&self, token: Address) -> FederatorResult<TokenLimits> {
        Ok(self
            .limits
            .lock()
            .unwrap()
            .get(&token)
            .copied()
            .unwrap_or(TokenLimits {
                allowed: false,
                medium_amount: U256::zero(),
                large_amount: U256::zero(),
            }))
    }
}

/// Replies with queued outcomes, `Mined` once the queue is empty. Mined
/// votes are recorded on the attached federation.
pub struct FakeVoteSender {
    address: Address,
    federation: Arc<FakeFederation>,
    outcomes: Mutex<VecDeque<SendOutcome>>,
    sent: Mutex<Vec<(Address, Bytes)>>,
}

impl FakeVoteSender {
    pub fn new(address: Address, federation: Arc<FakeFederation>) -> Arc<Self> {
        Arc::new(Self {
            address,
            federation,
            outcomes: Mutex::new(VecDeque::new()),
            sent: Mutex::new(vec![]),
        })
    }

    pub fn push_outcome(&self, outcome: SendOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn sent(&self) -> Vec<(Address, Bytes)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoteSender for FakeVoteSender {
    fn address(&self) -> Address {
        self.address
    }

    async fn send(&self, to: Address, data: Bytes, _value: U256) -> FederatorResult<SendOutcome> {
        self.sent.lock().unwrap().push((to, data.clone()));
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SendOutcome::Mined {
                transaction_hash: H256::from(keccak256(&data)),
                block_number: None,
            });
        if matches!(outcome, SendOutcome::Mined { .. }) && data.len() == 32 {
            let mut id = [0u8; 32];
            id.copy_from_slice(&data);
            self.federation
                .record_vote(TransactionIdentity::from(id), self.address);
        }
        Ok(outcome)
    }
}

pub fn get_test_cross_event(
    token: Address,
    amount: u64,
    block_number: u64,
    log_index: u32,
) -> CrossTransferEvent {
    CrossTransferEvent {
        token_address: token,
        sender: Address::repeat_byte(0x51),
        receiver: Address::repeat_byte(0x52),
        amount: U256::from(amount),
        symbol: None,
        decimals: None,
        granularity: None,
        token_type: FUNGIBLE_TOKEN_TYPE,
        block_hash: H256::from_low_u64_be(block_number),
        block_number,
        transaction_hash: H256::from(keccak256(
            [block_number.to_be_bytes(), u64::from(log_index).to_be_bytes()].concat(),
        )),
        log_index,
        origin_chain_id: 31,
        destination_chain_id: Some(42),
    }
}
