// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Adapters over the deployed generations of the bridge, federation and
//! allow-tokens contracts. The generation is chosen once, from `version()`,
//! when the adapter is created.

use crate::abi::versioned::Versioned;
use crate::confirmations::{Confirmations, TokenLimits};
use crate::error::{FederatorError, FederatorResult};
use crate::retry::RetryPolicy;
use crate::types::{
    ContractRole, CrossTransferEvent, HeartbeatPayload, TransactionIdentity, VoteFields,
};
use async_trait::async_trait;
use ethers::contract::ContractError;
use ethers::providers::{Middleware, MiddlewareError};
use ethers::types::{Address, Bytes};
use std::future::Future;
use std::sync::Arc;
use tap::TapFallible;

pub mod allow_tokens;
pub mod bridge;
pub mod federation;

pub use allow_tokens::{AllowTokensAdapter, AllowTokensVersion};
pub use bridge::{BridgeAdapter, BridgeVersion};
pub use federation::{FederationAdapter, FederationVersion};

/// Attempts made when `version()` cannot be reached.
const VERSION_PROBE_ATTEMPTS: u32 = 3;

#[async_trait]
pub trait BridgeContract: Send + Sync {
    fn address(&self) -> Address;

    async fn federation_address(&self) -> FederatorResult<Address>;

    async fn allow_tokens_address(&self) -> FederatorResult<Address>;

    /// `Cross` events in `[from_block, to_block]` heading to
    /// `destination_chain_id`. Generations without chain ids return every
    /// event.
    async fn past_cross_events(
        &self,
        from_block: u64,
        to_block: u64,
        destination_chain_id: u64,
    ) -> FederatorResult<Vec<CrossTransferEvent>>;

    /// Side token minted for `original_token`, zero when none is mapped.
    async fn mapped_token(
        &self,
        original_token: Address,
        destination_chain_id: u64,
    ) -> FederatorResult<Address>;
}

#[async_trait]
pub trait FederationContract: Send + Sync {
    fn address(&self) -> Address;

    async fn is_member(&self, member: Address) -> FederatorResult<bool>;

    async fn transaction_id(&self, fields: &VoteFields) -> FederatorResult<TransactionIdentity>;

    async fn transaction_was_processed(&self, id: TransactionIdentity) -> FederatorResult<bool>;

    async fn has_voted(&self, id: TransactionIdentity, member: Address) -> FederatorResult<bool>;

    fn vote_calldata(&self, fields: &VoteFields) -> Bytes;

    fn heartbeat_calldata(&self, payload: &HeartbeatPayload) -> Bytes;
}

#[async_trait]
pub trait AllowTokensContract: Send + Sync {
    async fn confirmations(&self) -> FederatorResult<Confirmations>;

    async fn limits(&self, token: Address) -> FederatorResult<TokenLimits>;
}

/// Reads `version()`. `None` means the contract predates versioning: the
/// call reverted, the node answered with an error, or the output did not
/// decode. Transport failures are retried and then returned.
pub(crate) async fn probe_version<M: Middleware + 'static>(
    client: Arc<M>,
    role: ContractRole,
    address: Address,
    retry: &RetryPolicy,
) -> FederatorResult<Option<String>> {
    let contract = Versioned::new(address, client);
    let policy = RetryPolicy::new(VERSION_PROBE_ATTEMPTS, retry.interval());
    let version = policy
        .retry("version", || async {
            match contract.version().call().await {
                Ok(version) => Ok(Some(version)),
                Err(e) if is_unversioned(&e) => {
                    tracing::warn!(
                        "{} contract {:?} has no readable version, assuming the oldest generation: {}",
                        role,
                        address,
                        e
                    );
                    Ok(None)
                }
                Err(e) => Err(FederatorError::contract(role, address, "version", e)),
            }
        })
        .await
        .map_err(FederatorError::from)
        .tap_err(|e| tracing::error!("Failed to read the version of {:?}: {:?}", address, e))?;
    Ok(version)
}

fn is_unversioned<M: Middleware>(err: &ContractError<M>) -> bool {
    match err {
        ContractError::Revert(_)
        | ContractError::DecodingError(_)
        | ContractError::AbiError(_)
        | ContractError::DetokenizationError(_) => true,
        _ => {
            err.as_middleware_error()
                .and_then(MiddlewareError::as_error_response)
                .is_some()
                || err
                    .as_provider_error()
                    .and_then(MiddlewareError::as_error_response)
                    .is_some()
        }
    }
}

/// Runs one contract read under the adapter's retry policy.
pub(crate) async fn call_with_retry<T, F, Fut>(
    retry: &RetryPolicy,
    operation: &'static str,
    op: F,
) -> FederatorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FederatorResult<T>>,
{
    retry
        .retry(operation, op)
        .await
        .map_err(FederatorError::from)
        .tap_err(|e| tracing::error!("Contract call {} failed: {:?}", operation, e))
}
