// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{call_with_retry, probe_version, AllowTokensContract};
use crate::abi::allow_tokens_v1::AllowTokens;
use crate::confirmations::{Confirmations, TokenLimits};
use crate::error::{FederatorError, FederatorResult};
use crate::retry::RetryPolicy;
use crate::types::ContractRole;
use async_trait::async_trait;
use ethers::contract::ContractCall;
use ethers::providers::Middleware;
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;
use strum_macros::Display;
use tokio::sync::RwLock;

const ROLE: ContractRole = ContractRole::AllowTokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AllowTokensVersion {
    /// No `version()`: fixed depths per chain, every token allowed.
    V0,
    V1,
}

impl AllowTokensVersion {
    pub fn from_probe(version: Option<&str>) -> Option<Self> {
        match version {
            None => Some(AllowTokensVersion::V0),
            Some("v1") => Some(AllowTokensVersion::V1),
            Some(_) => None,
        }
    }
}

pub enum AllowTokensAdapter<M> {
    V0 {
        chain_id: u64,
    },
    V1 {
        contract: AllowTokens<M>,
        // Only allowed tokens are cached, a disallowed token may be allowed later.
        limits: RwLock<HashMap<Address, TokenLimits>>,
        retry: RetryPolicy,
    },
}

impl<M: Middleware + 'static> AllowTokensAdapter<M> {
    pub async fn create(
        client: Arc<M>,
        chain_id: u64,
        address: Address,
        retry: RetryPolicy,
    ) -> FederatorResult<Self> {
        let version = probe_version(client.clone(), ROLE, address, &retry).await?;
        let generation = AllowTokensVersion::from_probe(version.as_deref()).ok_or_else(|| {
            FederatorError::UnknownContractVersion {
                role: ROLE,
                address,
                version: version.clone().unwrap_or_default(),
            }
        })?;
        tracing::info!(
            "[{}] AllowTokens {:?} uses the {} adapter",
            chain_id,
            address,
            generation
        );
        Ok(match generation {
            AllowTokensVersion::V0 => AllowTokensAdapter::V0 { chain_id },
            AllowTokensVersion::V1 => AllowTokensAdapter::V1 {
                contract: AllowTokens::new(address, client),
                limits: RwLock::new(HashMap::new()),
                retry,
            },
        })
    }

    pub fn version(&self) -> AllowTokensVersion {
        match self {
            AllowTokensAdapter::V0 { .. } => AllowTokensVersion::V0,
            AllowTokensAdapter::V1 { .. } => AllowTokensVersion::V1,
        }
    }
}

async fn read_depth<M: Middleware + 'static>(
    retry: &RetryPolicy,
    address: Address,
    operation: &'static str,
    call: ContractCall<M, U256>,
) -> FederatorResult<u64> {
    let depth = call_with_retry(retry, operation, || async {
        call.call()
            .await
            .map_err(|e| FederatorError::contract(ROLE, address, operation, e))
    })
    .await?;
    u64::try_from(depth).map_err(|_| {
        FederatorError::contract(
            ROLE,
            address,
            operation,
            format!("confirmations {} do not fit in u64", depth),
        )
    })
}

#[async_trait]
impl<M: Middleware + 'static> AllowTokensContract for AllowTokensAdapter<M> {
    async fn confirmations(&self) -> FederatorResult<Confirmations> {
        match self {
            AllowTokensAdapter::V0 { chain_id } => Ok(Confirmations::for_legacy_chain(*chain_id)),
            AllowTokensAdapter::V1 {
                contract, retry, ..
            } => {
                let address = contract.address();
                Ok(Confirmations {
                    small: read_depth(
                        retry,
                        address,
                        "smallAmountConfirmations",
                        contract.small_amount_confirmations(),
                    )
                    .await?,
                    medium: read_depth(
                        retry,
                        address,
                        "mediumAmountConfirmations",
                        contract.medium_amount_confirmations(),
                    )
                    .await?,
                    large: read_depth(
                        retry,
                        address,
                        "largeAmountConfirmations",
                        contract.large_amount_confirmations(),
                    )
                    .await?,
                })
            }
        }
    }

    async fn limits(&self, token: Address) -> FederatorResult<TokenLimits> {
        let (contract, cache, retry) = match self {
            AllowTokensAdapter::V0 { .. } => return Ok(TokenLimits::unbounded()),
            AllowTokensAdapter::V1 {
                contract,
                limits,
                retry,
            } => (contract, limits, retry),
        };
        if let Some(limits) = cache.read().await.get(&token) {
            return Ok(*limits);
        }
        let (allowed, _type_id, _spent_today, _last_day, _min, _max, _daily, medium, large) =
            call_with_retry(retry, "getInfoAndLimits", || async {
                contract
                    .get_info_and_limits(token)
                    .call()
                    .await
                    .map_err(|e| {
                        FederatorError::contract(ROLE, contract.address(), "getInfoAndLimits", e)
                    })
            })
            .await?;
        let limits = TokenLimits {
            allowed,
            medium_amount: medium,
            large_amount: large,
        };
        if allowed {
            cache.write().await.insert(token, limits);
        }
        Ok(limits)
    }
}
