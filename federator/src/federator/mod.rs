// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! One direction of the bridge: scans `Cross` events on the origin chain and
//! votes them on the destination federation once they are deep enough.

use crate::chain_handle::ChainReader;
use crate::confirmations::{is_eligible_in_tail_pass, Confirmations, Tier, TokenLimits};
use crate::contracts::{AllowTokensContract, BridgeContract, FederationContract};
use crate::error::{FederatorError, FederatorResult};
use crate::metrics::FederatorMetrics;
use crate::progress_store::ProgressStore;
use crate::transaction_sender::{SendOutcome, VoteSender};
use crate::types::{
    ChainPair, CrossTransferEvent, RevertedTransactionRecord, TransactionIdentity, VoteFields,
};
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod pages;


pub use pages::{pages, BlockRange, BLOCKS_PER_PAGE};

/// Which scan an event was found by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPass {
    /// Up to the large confirmation bound. Every event is voted.
    Confirmed,
    /// Between the large and small bounds. Voted according to its tier.
    Tail,
}

/// Contracts one federator direction talks to. Bridge and AllowTokens live
/// on the origin chain, the federation on the destination chain.
pub struct PairContracts {
    pub origin_bridge: Arc<dyn BridgeContract>,
    pub origin_allow_tokens: Arc<dyn AllowTokensContract>,
    pub destination_federation: Arc<dyn FederationContract>,
}

pub struct Federator {
    pair: ChainPair,
    origin: Arc<dyn ChainReader>,
    destination: Arc<dyn ChainReader>,
    contracts: PairContracts,
    sender: Arc<dyn VoteSender>,
    progress: ProgressStore,
    metrics: Arc<FederatorMetrics>,
}

struct CycleContext {
    height: u64,
    confirmations: Confirmations,
    federator: Address,
}

impl Federator {
    pub fn new(
        pair: ChainPair,
        origin: Arc<dyn ChainReader>,
        destination: Arc<dyn ChainReader>,
        contracts: PairContracts,
        sender: Arc<dyn VoteSender>,
        progress: ProgressStore,
        metrics: Arc<FederatorMetrics>,
    ) -> Self {
        Self {
            pair,
            origin,
            destination,
            contracts,
            sender,
            progress,
            metrics,
        }
    }

    pub fn pair(&self) -> ChainPair {
        self.pair
    }

    fn skip(&self, reason: &str) {
        self.metrics
            .events_skipped
            .with_label_values(&[&self.pair.to_string(), reason])
            .inc();
    }

    /// Runs one cycle. Returns `Ok(false)` when there was nothing to do: a
    /// chain is syncing, the origin chain is too short, or the cursor is
    /// already past both confirmation bounds.
    pub async fn run(&self) -> FederatorResult<bool> {
        let height = self.origin.block_number().await?;
        for chain in [&self.origin, &self.destination] {
            if chain.is_syncing().await? {
                warn!(
                    "[{}] {} is syncing, votes are paused until it is synced",
                    self.pair,
                    chain.name()
                );
                return Ok(false);
            }
        }

        let confirmations = self.contracts.origin_allow_tokens.confirmations().await?;
        // None when the bound is at or below genesis.
        let to_block_large = height
            .checked_sub(confirmations.large)
            .filter(|block| *block > 0);
        let to_block_small = height
            .checked_sub(confirmations.small)
            .filter(|block| *block > 0);
        info!(
            "[{}] Height {}, confirmations {:?}, large bound {:?}, small bound {:?}",
            self.pair, height, confirmations, to_block_large, to_block_small
        );
        if to_block_large.is_none() && to_block_small.is_none() {
            return Ok(false);
        }

        let cursor = self.progress.last_block().await?;
        let behind = |bound: Option<u64>| bound.is_some_and(|b| cursor < b);
        if !behind(to_block_large) && !behind(to_block_small) {
            warn!(
                "[{}] Last processed block {} is not behind the confirmation bounds",
                self.pair, cursor
            );
            return Ok(false);
        }

        let federator = self.sender.address();
        if !self
            .contracts
            .destination_federation
            .is_member(federator)
            .await?
        {
            return Err(FederatorError::NotFederationMember(federator));
        }

        let pair_label = self.pair.to_string();
        self.metrics
            .cycles_run
            .with_label_values(&[&pair_label])
            .inc();
        let context = CycleContext {
            height,
            confirmations,
            federator,
        };

        if let Some(to_block) = to_block_large {
            for page in pages(cursor + 1, to_block) {
                self.scan_page(page, ScanPass::Confirmed, &context).await?;
                self.progress.save_last_block(page.to).await?;
                self.metrics
                    .last_scanned_block
                    .with_label_values(&[&pair_label])
                    .set(page.to as i64);
            }
        }

        if let Some(to_block) = to_block_small {
            let from_block = to_block_large.unwrap_or(0);
            debug!(
                "[{}] Scanning medium and small transfers up to block {}",
                self.pair, to_block
            );
            for page in pages(from_block, to_block) {
                self.scan_page(page, ScanPass::Tail, &context).await?;
            }
        }
        Ok(true)
    }

    async fn scan_page(
        &self,
        page: BlockRange,
        pass: ScanPass,
        context: &CycleContext,
    ) -> FederatorResult<()> {
        let events = self
            .contracts
            .origin_bridge
            .past_cross_events(page.from, page.to, self.pair.destination)
            .await?;
        info!(
            "[{}] Found {} events in {} ({:?})",
            self.pair,
            events.len(),
            page,
            pass
        );
        self.metrics
            .events_scanned
            .with_label_values(&[&self.pair.to_string()])
            .inc_by(events.len() as u64);
        for event in &events {
            self.process_event(event, pass, context).await?;
        }
        Ok(())
    }

    async fn token_limits(&self, event: &CrossTransferEvent) -> FederatorResult<TokenLimits> {
        let bridge = &self.contracts.origin_bridge;
        let allow_tokens = &self.contracts.origin_allow_tokens;
        let side_token = bridge
            .mapped_token(event.token_address, self.pair.destination)
            .await?;
        if side_token.is_zero() {
            let limits = allow_tokens.limits(event.token_address).await?;
            if !limits.allowed {
                return Err(FederatorError::TokenNotAllowed {
                    token: event.token_address,
                    transaction_hash: event.transaction_hash,
                });
            }
            return Ok(limits);
        }
        let limits = allow_tokens.limits(side_token).await?;
        if !limits.allowed {
            error!(
                "[{}] Side token {:?} of {:?} needs to be allowed, tx {:?}",
                self.pair, side_token, event.token_address, event.transaction_hash
            );
        }
        Ok(limits)
    }

    async fn process_event(
        &self,
        event: &CrossTransferEvent,
        pass: ScanPass,
        context: &CycleContext,
    ) -> FederatorResult<()> {
        debug!("[{}] Processing event {:?}", self.pair, event);
        let limits = self.token_limits(event).await?;

        if pass == ScanPass::Tail {
            let observed = context.height.saturating_sub(event.block_number);
            if !is_eligible_in_tail_pass(event.amount, &limits, &context.confirmations, observed) {
                let tier = Tier::for_amount(event.amount, &limits);
                debug!(
                    "[{}] {} transfer {:?} of {} waits for {} confirmations, has {}",
                    self.pair,
                    tier,
                    event.transaction_hash,
                    event.amount,
                    tier.required_confirmations(&context.confirmations),
                    observed
                );
                self.skip("not_confirmed");
                return Ok(());
            }
        }

        let fields = event.vote_fields(self.pair.destination);
        let id = self
            .contracts
            .destination_federation
            .transaction_id(&fields)
            .await?;
        info!(
            "[{}] Transaction id {} for tx {:?} log {}",
            self.pair, id, event.transaction_hash, event.log_index
        );
        self.process_transaction(&fields, id, context.federator)
            .await?;
        Ok(())
    }

    /// Votes `fields` unless the vote already reverted once, the transfer
    /// was executed, or this federator already voted it. Returns whether a
    /// vote was sent.
    pub async fn process_transaction(
        &self,
        fields: &VoteFields,
        id: TransactionIdentity,
        federator: Address,
    ) -> FederatorResult<bool> {
        let federation = &self.contracts.destination_federation;
        if self.progress.is_reverted(&id).await? {
            warn!(
                "[{}] Skipping {} of {:?}, transaction id {} is marked as reverted",
                self.pair, fields.amount, fields.original_token_address, id
            );
            self.skip("reverted");
            return Ok(false);
        }
        if federation.transaction_was_processed(id).await? {
            info!(
                "[{}] Already processed block {:?} tx {:?}",
                self.pair, fields.block_hash, fields.transaction_hash
            );
            self.skip("processed");
            return Ok(false);
        }
        if federation.has_voted(id, federator).await? {
            debug!(
                "[{}] Tx {:?} has already been voted by us",
                self.pair, fields.transaction_hash
            );
            self.skip("voted");
            return Ok(false);
        }

        info!(
            "[{}] Voting {} of {:?} to {:?}, transaction id {}",
            self.pair, fields.amount, fields.original_token_address, fields.receiver, id
        );
        let pair_label = self.pair.to_string();
        self.metrics
            .votes_submitted
            .with_label_values(&[&pair_label])
            .inc();
        let data = federation.vote_calldata(fields);
        match self
            .sender
            .send(federation.address(), data, U256::zero())
            .await?
        {
            SendOutcome::Mined { .. } => {
                self.metrics
                    .votes_mined
                    .with_label_values(&[&pair_label])
                    .inc();
            }
            SendOutcome::Reverted { error, .. } => {
                error!(
                    "[{}] Vote for transaction id {} failed: {}",
                    self.pair, id, error
                );
                self.metrics
                    .votes_reverted
                    .with_label_values(&[&pair_label])
                    .inc();
                self.progress
                    .record_reverted(id, RevertedTransactionRecord::new(fields, Some(error)))
                    .await?;
            }
            SendOutcome::Unknown { transaction_hash } => {
                warn!(
                    "[{}] Vote for transaction id {} has no receipt yet ({:?})",
                    self.pair, id, transaction_hash
                );
                self.metrics
                    .votes_unknown
                    .with_label_values(&[&pair_label])
                    .inc();
            }
        }
        Ok(true)
    }
}
