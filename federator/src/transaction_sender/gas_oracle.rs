// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Gas price selection. RSK nodes publish a minimum gas price per block;
//! Ethereum mainnet combines the node's price with Etherscan's gas oracle
//! because a freshly restarted node reports prices far below the network.

use crate::error::{FederatorError, FederatorResult};
use ethers::types::U256;
use ethers::utils::parse_units;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub const ETHERSCAN_API_URL: &str = "https://api.etherscan.io/api";

const ORACLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Below this the node's price is considered stale and the oracle wins.
const STALE_NODE_PRICE_WEI: u64 = 25_000_000_000;
const PROPOSE_BUMP_WEI: u64 = 5_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasOracleReading {
    pub propose: U256,
    pub fast: U256,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GasOracleResult {
    propose_gas_price: String,
    fast_gas_price: String,
}

pub struct EtherscanGasOracle {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl EtherscanGasOracle {
    pub fn new(api_key: &str) -> FederatorResult<Self> {
        Self::with_url(ETHERSCAN_API_URL, api_key)
    }

    pub fn with_url(url: &str, api_key: &str) -> FederatorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(ORACLE_TIMEOUT)
            .build()
            .map_err(|e| FederatorError::InternalError(format!("Failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub async fn reading(&self) -> FederatorResult<GasOracleReading> {
        let params = [
            ("apikey", self.api_key.as_str()),
            ("module", "gastracker"),
            ("action", "gasoracle"),
        ];
        let response: Value = self
            .client
            .post(&self.url)
            .form(&params)
            .send()
            .await
            .map_err(|e| FederatorError::TransientProviderError(format!("Etherscan request: {}", e)))?
            .json()
            .await
            .map_err(|e| FederatorError::ProviderError(format!("Etherscan response: {}", e)))?;
        parse_gas_oracle_response(&response)
    }
}

pub fn parse_gas_oracle_response(response: &Value) -> FederatorResult<GasOracleReading> {
    let status_ok = match response.get("status") {
        Some(Value::String(s)) => s != "0",
        Some(Value::Number(n)) => n.as_u64() != Some(0),
        _ => false,
    };
    if !status_ok {
        return Err(FederatorError::ProviderError(format!(
            "Etherscan gas oracle failed: message {} result {}",
            response.get("message").unwrap_or(&Value::Null),
            response.get("result").unwrap_or(&Value::Null)
        )));
    }
    let result: GasOracleResult = response
        .get("result")
        .cloned()
        .ok_or_else(|| FederatorError::ProviderError("Etherscan response has no result".into()))
        .and_then(|r| {
            serde_json::from_value(r)
                .map_err(|e| FederatorError::ProviderError(format!("Etherscan result: {}", e)))
        })?;
    Ok(GasOracleReading {
        propose: gwei(&result.propose_gas_price)?,
        fast: gwei(&result.fast_gas_price)?,
    })
}

fn gwei(value: &str) -> FederatorResult<U256> {
    parse_units(value.trim(), "gwei")
        .map(U256::from)
        .map_err(|e| FederatorError::ProviderError(format!("Invalid gwei amount {:?}: {}", value, e)))
}

/// `max(1, round(minimum_gas_price * 1.03))`
pub fn rsk_gas_price(minimum_gas_price: U256) -> U256 {
    if minimum_gas_price <= U256::one() {
        return U256::one();
    }
    (minimum_gas_price * 103 + 50) / 100
}

/// `max(1, round(node_gas_price * 1.5))`
pub fn padded_gas_price(node_gas_price: U256) -> U256 {
    if node_gas_price <= U256::one() {
        return U256::one();
    }
    (node_gas_price * 3 + 1) / 2
}

/// Gas price for Ethereum chains. Without an oracle reading the padded node
/// price is used.
pub fn eth_gas_price(node_gas_price: U256, oracle: Option<GasOracleReading>) -> U256 {
    let padded = padded_gas_price(node_gas_price);
    let Some(GasOracleReading { propose, fast }) = oracle else {
        return padded;
    };
    // 1.3% margin over the oracle's fast price against gas spikes
    let fast_plus = (fast * 1013 + 999) / 1000;
    if fast >= node_gas_price && padded >= fast {
        return fast_plus;
    }
    if padded <= U256::from(STALE_NODE_PRICE_WEI) {
        return fast_plus;
    }
    let ceiling = padded * 5;
    if propose >= node_gas_price && propose >= padded && propose < ceiling {
        return if fast < ceiling {
            fast_plus
        } else {
            propose + U256::from(PROPOSE_BUMP_WEI)
        };
    }
    padded
}
