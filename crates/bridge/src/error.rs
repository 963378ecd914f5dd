//! Error types shared across the bridge components.

use alloy::primitives::B256;
use solana_sdk::pubkey::Pubkey;

use crate::Domain;
use crate::registry::Chain;

/// Coarse classification of a failure, for callers deciding whether to
/// retry, resume, or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unsupported chain or inconsistent setup. Fix the configuration.
    Configuration,
    /// The request itself is invalid. Nothing was submitted.
    Validation,
    /// RPC or HTTP failure. Retrying the failed step may succeed.
    TransientNetwork,
    /// A transaction or simulated call was rejected on chain.
    OnChainRevert,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),
    #[error("{chain} is not a Solana chain")]
    NotSolana { chain: Chain },
    #[error("{chain} is not an EVM chain with a CCTP message transmitter")]
    NotEvm { chain: Chain },
    #[error("{chain} has CCTP domain {registered}, but {configured} was configured")]
    DomainMismatch {
        chain: Chain,
        registered: Domain,
        configured: Domain,
    },
    #[error("burn targets domain {receipt}, but destination {chain} is domain {registered}")]
    DestinationMismatch {
        chain: Chain,
        receipt: Domain,
        registered: Domain,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("token {actual} is not USDC on {chain} (expected {expected})")]
    TokenMismatch {
        chain: Chain,
        expected: Pubkey,
        actual: Pubkey,
    },
    #[error("transfer amount must be greater than zero")]
    ZeroAmount,
    #[error("invalid EVM address {input:?}: {reason}")]
    InvalidAddress { input: String, reason: &'static str },
    #[error("{0} is not a left-padded 20-byte address")]
    NonCanonicalRecipient(B256),
}
