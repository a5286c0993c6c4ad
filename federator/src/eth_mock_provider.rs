// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A `JsonRpcClient` answering from canned responses.

use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, JsonRpcError, ProviderError, RpcError};
use ethers::types::{Address, Bytes};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MockError {
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error("No response registered for {0}")]
    NoResponse(String),
    #[error("JSON-RPC error: {0}")]
    JsonRpc(JsonRpcError),
}

impl RpcError for MockError {
    fn as_error_response(&self) -> Option<&JsonRpcError> {
        match self {
            MockError::JsonRpc(e) => Some(e),
            _ => None,
        }
    }

    fn as_serde_error(&self) -> Option<&serde_json::Error> {
        match self {
            MockError::SerdeJson(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MockError> for ProviderError {
    fn from(e: MockError) -> Self {
        ProviderError::JsonRpcClientError(Box::new(e))
    }
}

type MockResponse = Result<Value, JsonRpcError>;

#[derive(Debug, Default)]
struct Responses {
    exact: HashMap<(String, String), MockResponse>,
    calls: HashMap<(Address, Bytes), MockResponse>,
    methods: HashMap<String, MockResponse>,
}

/// Responses are looked up by exact `(method, params)`, then for `eth_call`
/// by `(to, data)`, then by method alone.
#[derive(Debug, Clone, Default)]
pub struct EthMockProvider {
    responses: Arc<Mutex<Responses>>,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl EthMockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_response<P: Serialize, R: Serialize, T: Into<R>>(
        &self,
        method: &str,
        params: P,
        response: T,
    ) -> Result<(), MockError> {
        let params = serde_json::to_string(&params)?;
        let response = serde_json::to_value(response.into())?;
        self.responses
            .lock()
            .unwrap()
            .exact
            .insert((method.to_string(), params), Ok(response));
        Ok(())
    }

    pub fn add_method_response<R: Serialize>(
        &self,
        method: &str,
        response: R,
    ) -> Result<(), MockError> {
        let response = serde_json::to_value(response)?;
        self.responses
            .lock()
            .unwrap()
            .methods
            .insert(method.to_string(), Ok(response));
        Ok(())
    }

    pub fn add_method_error(&self, method: &str, code: i64, message: &str) {
        self.responses.lock().unwrap().methods.insert(
            method.to_string(),
            Err(JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
        );
    }

    /// Answers `eth_call` to `to` with calldata `data` by the ABI encoded
    /// `output`, whatever block or sender the call names.
    pub fn add_call_response(&self, to: Address, data: impl Into<Bytes>, output: impl Into<Bytes>) {
        let output = Value::String(format!("0x{}", hex::encode(output.into())));
        self.responses
            .lock()
            .unwrap()
            .calls
            .insert((to, data.into()), Ok(output));
    }

    pub fn add_call_error(&self, to: Address, data: impl Into<Bytes>, message: &str) {
        self.responses.lock().unwrap().calls.insert(
            (to, data.into()),
            Err(JsonRpcError {
                code: 3,
                message: message.to_string(),
                data: None,
            }),
        );
    }

    /// Methods requested so far, in order.
    pub fn requested_methods(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn request_count(&self, method: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    fn lookup(&self, method: &str, params: &Value) -> Option<MockResponse> {
        let responses = self.responses.lock().unwrap();
        let key = (method.to_string(), params.to_string());
        if let Some(response) = responses.exact.get(&key) {
            return Some(response.clone());
        }
        if method == "eth_call" {
            if let Some(call_key) = call_key(params) {
                if let Some(response) = responses.calls.get(&call_key) {
                    return Some(response.clone());
                }
            }
        }
        responses.methods.get(method).cloned()
    }
}

fn call_key(params: &Value) -> Option<(Address, Bytes)> {
    let tx = params.get(0)?;
    let to: Address = serde_json::from_value(tx.get("to")?.clone()).ok()?;
    let data = tx.get("data").or_else(|| tx.get("input"))?;
    let data: Bytes = serde_json::from_value(data.clone()).ok()?;
    Some((to, data))
}

#[async_trait]
impl JsonRpcClient for EthMockProvider {
    type Error = MockError;

    async fn request<T: Serialize + Send + Sync + Debug, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, MockError> {
        let params = serde_json::to_value(&params)?;
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        match self.lookup(method, &params) {
            Some(Ok(value)) => Ok(serde_json::from_value(value)?),
            Some(Err(e)) => Err(MockError::JsonRpc(e)),
            None => Err(MockError::NoResponse(format!("{} {}", method, params))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{Middleware, Provider};
    use ethers::types::U64;

    #[tokio::test]
    async fn test_method_fallback_and_missing_response() {
        let mock = EthMockProvider::new();
        mock.add_method_response("eth_blockNumber", U64::from(1234))
            .unwrap();
        let provider = Provider::new(mock.clone());

        assert_eq!(provider.get_block_number().await.unwrap(), U64::from(1234));
        assert!(provider.get_chainid().await.is_err());
        assert_eq!(mock.request_count("eth_blockNumber"), 1);
        assert_eq!(
            mock.requested_methods(),
            vec!["eth_blockNumber".to_string(), "eth_chainId".to_string()]
        );
    }

    #[tokio::test]
    async fn test_error_response_is_exposed() {
        let mock = EthMockProvider::new();
        mock.add_method_error("eth_chainId", -32000, "boom");
        let err = Provider::new(mock).get_chainid().await.unwrap_err();
        assert_eq!(err.as_error_response().unwrap().message, "boom");
    }
}
