use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use epochsweep_api::prelude::*;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Invalid response: {0}")]
    Decode(String),
    #[error("Extrinsic rejected: {0}")]
    Rejected(String),
    #[error("Timed out waiting for {0}")]
    Timeout(Durability),
}

impl ChainError {
    /// JSON-RPC "method not found"
    pub const METHOD_NOT_FOUND: i64 = -32601;

    pub fn is_unsupported(&self) -> bool {
        matches!(self, ChainError::Rpc { code, .. } if *code == Self::METHOD_NOT_FOUND)
    }
}

/// Stake held by `coldkey` on `hotkey` within one subnet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StakeAccount {
    pub coldkey: String,
    pub hotkey: String,
    pub netuid: u16,
}

impl StakeAccount {
    pub fn new(coldkey: impl Into<String>, hotkey: impl Into<String>, netuid: u16) -> Self {
        Self {
            coldkey: coldkey.into(),
            hotkey: hotkey.into(),
            netuid,
        }
    }
}

/// Normalized weights keyed by uid.
pub type WeightMap = BTreeMap<u16, f32>;

/// Proof that a submitted extrinsic reached the requested durability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub block: u64,
    pub durability: Durability,
    pub tx_hash: String,
}

/// Capability set the loops consume from the remote chain client. Signing and
/// key custody live behind this interface.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;

    async fn get_current_block(&self) -> Result<u64, ChainError>;

    /// `Ok(None)` when the chain client does not expose the query.
    async fn get_next_epoch_start(&self, netuid: u16) -> Result<Option<u64>, ChainError>;

    async fn get_tempo(&self, netuid: u16) -> Result<u64, ChainError>;

    async fn is_registered(&self, hotkey: &str, netuid: u16) -> Result<bool, ChainError>;

    async fn has_permit(&self, hotkey: &str, netuid: u16) -> Result<bool, ChainError>;

    async fn get_balance(&self, account: &StakeAccount) -> Result<Balance, ChainError>;

    async fn get_subnet_owner_hotkey(&self, netuid: u16) -> Result<String, ChainError>;

    async fn get_uid_for_hotkey(&self, hotkey: &str, netuid: u16) -> Result<Option<u16>, ChainError>;

    async fn get_weights_version_key(&self, netuid: u16) -> Result<u64, ChainError>;

    async fn set_weights(
        &self,
        hotkey: &str,
        netuid: u16,
        weights: &WeightMap,
        version_key: u64,
        durability: Durability,
    ) -> Result<Confirmation, ChainError>;

    async fn move_stake(
        &self,
        account: &StakeAccount,
        to_hotkey: &str,
        amount: Balance,
        durability: Durability,
    ) -> Result<Confirmation, ChainError>;

    async fn transfer_stake(
        &self,
        account: &StakeAccount,
        to_coldkey: &str,
        amount: Balance,
        durability: Durability,
    ) -> Result<Confirmation, ChainError>;
}

/// Shortened address for notifications, e.g. `...Xy12AbCd`.
pub fn short_address(address: &str) -> String {
    let tail: String = address
        .chars()
        .rev()
        .take(SHORT_ADDRESS_LEN)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_not_found_is_unsupported() {
        let err = ChainError::Rpc { code: -32601, message: "Method not found".into() };
        assert!(err.is_unsupported());
        assert!(!ChainError::Transport("refused".into()).is_unsupported());
    }

    #[test]
    fn short_address_keeps_tail() {
        assert_eq!(
            short_address("5CATQqY6rA26Kkvm2abMTRtxnwyxigHZKxNJq86bUcpYsn35"),
            "...UcpYsn35"
        );
        assert_eq!(short_address("abc"), "...abc");
    }
}
