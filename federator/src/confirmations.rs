// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Confirmation tiers. Larger transfers wait for more confirmations before
//! the federator votes on them.

use ethers::types::U256;
use strum_macros::Display;

/// Required confirmation depth per tier, as configured in AllowTokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Confirmations {
    pub small: u64,
    pub medium: u64,
    pub large: u64,
}

impl Confirmations {
    pub fn uniform(depth: u64) -> Self {
        Self {
            small: depth,
            medium: depth,
            large: depth,
        }
    }

    /// Depths used with AllowTokens contracts that predate configurable
    /// confirmations.
    pub fn for_legacy_chain(chain_id: u64) -> Self {
        let depth = match chain_id {
            // RSK testnet and Kovan
            31 | 42 => 10,
            // Ethereum mainnet, about a day
            1 => 240,
            // RSK mainnet, about a day
            30 => 120,
            // regtest and ganache
            _ => 0,
        };
        Self::uniform(depth)
    }
}

/// Amount thresholds of one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLimits {
    pub allowed: bool,
    pub medium_amount: U256,
    pub large_amount: U256,
}

impl TokenLimits {
    /// Every token allowed and every amount in the large tier.
    pub fn unbounded() -> Self {
        Self {
            allowed: true,
            medium_amount: U256::zero(),
            large_amount: U256::zero(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Tier {
    Small,
    Medium,
    Large,
}

impl Tier {
    pub fn for_amount(amount: U256, limits: &TokenLimits) -> Self {
        if amount >= limits.large_amount {
            Tier::Large
        } else if amount >= limits.medium_amount {
            Tier::Medium
        } else {
            Tier::Small
        }
    }

    pub fn required_confirmations(self, confirmations: &Confirmations) -> u64 {
        match self {
            Tier::Small => confirmations.small,
            Tier::Medium => confirmations.medium,
            Tier::Large => confirmations.large,
        }
    }
}

/// Whether a transfer found between the large and small confirmation
/// bounds may be voted now. Large transfers always wait for the full scan,
/// small ones already have enough confirmations by being in the window.
pub fn is_eligible_in_tail_pass(
    amount: U256,
    limits: &TokenLimits,
    confirmations: &Confirmations,
    observed_confirmations: u64,
) -> bool {
    match Tier::for_amount(amount, limits) {
        Tier::Large => false,
        Tier::Medium => observed_confirmations >= confirmations.medium,
        Tier::Small => true,
    }
}
