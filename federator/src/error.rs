// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::types::ContractRole;
use ethers::providers::{ProviderError, RpcError};
use ethers::types::Address;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FederatorError {
    // Connection reset, timeout and other transport failures
    #[error("Transient provider error: {0}")]
    TransientProviderError(String),
    // The node answered with an error response
    #[error("Provider error: {0}")]
    ProviderError(String),
    // A contract call failed, wrapped with the contract it was sent to
    #[error("{role} contract {address:?} failed on {operation}: {message}")]
    ContractError {
        role: ContractRole,
        address: Address,
        operation: &'static str,
        message: String,
    },
    // version() returned a string no adapter understands
    #[error("Unknown {role} contract version {version:?} at {address:?}")]
    UnknownContractVersion {
        role: ContractRole,
        address: Address,
        version: String,
    },
    // The local signer is not part of the destination federation
    #[error("Federator {0:?} is not a member of the federation")]
    NotFederationMember(Address),
    // RPC host is neither https nor a local address
    #[error("Invalid host configuration {0}, https or localhost required")]
    InsecureEndpoint(String),
    // Neither the original token nor its side token is allowed
    #[error("Token {token:?} is not allowed, tx {transaction_hash:?}")]
    TokenNotAllowed {
        token: Address,
        transaction_hash: ethers::types::H256,
    },
    // Progress file or reverted ledger could not be read or written
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Signer error: {0}")]
    SignerError(String),
    // The per pair cycle budget ran out
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl FederatorError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            FederatorError::TransientProviderError(_) => "transient_provider_error",
            FederatorError::ProviderError(_) => "provider_error",
            FederatorError::ContractError { .. } => "contract_error",
            FederatorError::UnknownContractVersion { .. } => "unknown_contract_version",
            FederatorError::NotFederationMember(_) => "not_federation_member",
            FederatorError::InsecureEndpoint(_) => "insecure_endpoint",
            FederatorError::TokenNotAllowed { .. } => "token_not_allowed",
            FederatorError::StorageError(_) => "storage_error",
            FederatorError::ConfigError(_) => "config_error",
            FederatorError::SignerError(_) => "signer_error",
            FederatorError::RetriesExhausted { .. } => "retries_exhausted",
            FederatorError::InternalError(_) => "internal_error",
        }
    }

    /// Fatal errors stop the process. Restarting does not help until an
    /// operator changes the configuration or the federation membership.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FederatorError::UnknownContractVersion { .. }
                | FederatorError::NotFederationMember(_)
                | FederatorError::InsecureEndpoint(_)
                | FederatorError::ConfigError(_)
                | FederatorError::SignerError(_)
                | FederatorError::RetriesExhausted { .. }
        )
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FederatorError::TransientProviderError(_)
                | FederatorError::ProviderError(_)
                | FederatorError::ContractError { .. }
        )
    }

    pub fn contract(
        role: ContractRole,
        address: Address,
        operation: &'static str,
        err: impl std::fmt::Display,
    ) -> Self {
        FederatorError::ContractError {
            role,
            address,
            operation,
            message: err.to_string(),
        }
    }
}

impl From<ProviderError> for FederatorError {
    fn from(err: ProviderError) -> Self {
        match err.as_error_response() {
            Some(rpc_error) => FederatorError::ProviderError(rpc_error.to_string()),
            None => FederatorError::TransientProviderError(err.to_string()),
        }
    }
}

impl From<std::io::Error> for FederatorError {
    fn from(err: std::io::Error) -> Self {
        FederatorError::StorageError(err.to_string())
    }
}

pub type FederatorResult<T> = Result<T, FederatorError>;
