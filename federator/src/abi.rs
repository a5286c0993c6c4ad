// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Contract bindings, one module per contract generation. Each generation
//! lives in its own module because the generated call and event structs
//! share names across generations.

#![allow(clippy::too_many_arguments)]

/// `version()` is exposed by every contract generation that has one.
pub mod versioned {
    use ethers::prelude::abigen;

    abigen!(
        Versioned,
        r#"[
            function version() external pure returns (string)
        ]"#
    );
}

/// Bridge v1 and v2. `Cross` carries token metadata and no chain ids.
pub mod legacy_bridge {
    use ethers::prelude::abigen;

    abigen!(
        Bridge,
        r#"[
            event Cross(address indexed tokenAddress, address indexed to, uint256 amount, string symbol, bytes userData, uint8 decimals, uint256 granularity)
            function getFederation() external view returns (address)
            function allowTokens() external view returns (address)
            function mappedTokens(address originalToken) external view returns (address)
        ]"#
    );
}

pub mod bridge_v3 {
    use ethers::prelude::abigen;

    abigen!(
        Bridge,
        r#"[
            event Cross(address indexed tokenAddress, address indexed from, address indexed to, uint256 amount, bytes userData)
            function getFederation() external view returns (address)
            function allowTokens() external view returns (address)
            function mappedTokens(address originalToken) external view returns (address)
        ]"#
    );
}

/// Multichain bridge. `Cross` is indexed by destination chain id.
pub mod bridge_v4 {
    use ethers::prelude::abigen;

    abigen!(
        Bridge,
        r#"[
            event Cross(address indexed tokenAddress, address indexed to, uint256 indexed destinationChainId, address from, uint256 originChainId, uint256 amount, bytes userData)
            function getFederation() external view returns (address)
            function allowTokens() external view returns (address)
            function sideTokenAddressByOriginalTokenAddress(uint256 chainId, address originalToken) external view returns (address)
        ]"#
    );
}

pub mod federation_v2 {
    use ethers::prelude::abigen;

    abigen!(
        Federation,
        r#"[
            function isMember(address member) external view returns (bool)
            function getTransactionId(address originalTokenAddress, address sender, address receiver, uint256 amount, bytes32 blockHash, bytes32 transactionHash, uint32 logIndex) external pure returns (bytes32)
            function transactionWasProcessed(bytes32 transactionId) external view returns (bool)
            function hasVoted(bytes32 transactionId) external view returns (bool)
            function voteTransaction(address originalTokenAddress, address sender, address receiver, uint256 amount, bytes32 blockHash, bytes32 transactionHash, uint32 logIndex) external returns (bool)
            function emitHeartbeat(uint256 fedRskBlock, uint256 fedEthBlock, string fedVersion, string nodeRskInfo, string nodeEthInfo) external
        ]"#
    );
}

/// Adds the token type to the vote.
pub mod federation_v3 {
    use ethers::prelude::abigen;

    abigen!(
        Federation,
        r#"[
            function isMember(address member) external view returns (bool)
            function getTransactionId(address originalTokenAddress, address sender, address receiver, uint256 amount, bytes32 blockHash, bytes32 transactionHash, uint32 logIndex) external pure returns (bytes32)
            function transactionWasProcessed(bytes32 transactionId) external view returns (bool)
            function hasVoted(bytes32 transactionId) external view returns (bool)
            function voteTransaction(address originalTokenAddress, address sender, address receiver, uint256 amount, bytes32 blockHash, bytes32 transactionHash, uint32 logIndex, uint8 tokenType) external returns (bool)
            function emitHeartbeat(uint256 fedRskBlock, uint256 fedEthBlock, string fedVersion, string nodeRskInfo, string nodeEthInfo) external
        ]"#
    );
}

/// Multichain federation. Origin and destination chain ids are part of the
/// transaction id and of the vote.
pub mod federation_v4 {
    use ethers::prelude::abigen;

    abigen!(
        Federation,
        r#"[
            function isMember(address member) external view returns (bool)
            function getTransactionId(address originalTokenAddress, address sender, address receiver, uint256 amount, bytes32 blockHash, bytes32 transactionHash, uint32 logIndex, uint256 originChainId, uint256 destinationChainId) external pure returns (bytes32)
            function transactionWasProcessed(bytes32 transactionId) external view returns (bool)
            function hasVoted(bytes32 transactionId) external view returns (bool)
            function voteTransaction(address originalTokenAddress, address sender, address receiver, uint256 amount, bytes32 blockHash, bytes32 transactionHash, uint32 logIndex, uint256 originChainId, uint256 destinationChainId) external returns (bool)
            function emitHeartbeat(uint256 fedRskBlock, uint256 fedEthBlock, string fedVersion, string nodeRskInfo, string nodeEthInfo) external
        ]"#
    );
}

/// `getInfoAndLimits` returns `(TokenInfo, Limits)`. Both structs are
/// static, so the flattened outputs below decode the same words.
pub mod allow_tokens_v1 {
    use ethers::prelude::abigen;

    abigen!(
        AllowTokens,
        r#"[
            function smallAmountConfirmations() external view returns (uint256)
            function mediumAmountConfirmations() external view returns (uint256)
            function largeAmountConfirmations() external view returns (uint256)
            function getInfoAndLimits(address token) external view returns (bool allowed, uint256 typeId, uint256 spentToday, uint256 lastDay, uint256 min, uint256 max, uint256 daily, uint256 mediumAmount, uint256 largeAmount)
        ]"#
    );
}
