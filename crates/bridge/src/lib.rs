//! Solana to EVM USDC bridging over Circle CCTP.
//!
//! A transfer runs through three steps: burn USDC on Solana, wait for
//! Circle's attestation of the burn message, then present message and
//! attestation to the destination chain's message transmitter, which mints
//! USDC to the recipient. Optionally, the minted funds are then split
//! across recipients by an extension on the destination account.
//!
//! Each step is a separate capability ([`SourceChainBurner`],
//! [`AttestationPoller`](cctp::attestation::AttestationPoller),
//! [`CctpReceiver`](cctp::receiver::CctpReceiver)) and the
//! [`BridgeOrchestrator`](orchestrator::BridgeOrchestrator) sequences them.
//! Every intermediate artefact ([`BurnReceipt`], [`Attestation`]) is plain
//! data, so callers can persist it and resume an interrupted transfer.

use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, B256, Bytes, TxHash};
use async_trait::async_trait;
use locker_evm::Account;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::Signer;
use tokio_util::sync::CancellationToken;

pub mod address;
pub mod cctp;
pub mod error;
pub mod orchestrator;
pub mod poll;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cctp::solana::BurnError;
pub use error::{ConfigurationError, ErrorKind, ValidationError};
pub use registry::{Chain, ChainRegistry, Network};

/// CCTP domain identifier of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(pub u32);

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where bridged funds should arrive and which account submits the mint.
#[derive(Clone, Copy)]
pub struct Destination<'a> {
    pub chain: Chain,
    /// Address credited by the mint.
    pub recipient: Address,
    /// Account that submits `receiveMessage` and, if requested, runs the
    /// split afterwards.
    pub account: &'a dyn Account,
}

impl fmt::Debug for Destination<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("chain", &self.chain)
            .field("recipient", &self.recipient)
            .field("account", &self.account.address())
            .finish()
    }
}

/// A request to move `amount` base units of USDC off Solana.
#[derive(Clone, Copy)]
pub struct TransferRequest<'a> {
    pub source_signer: &'a (dyn Signer + Send + Sync),
    /// Mint of the token being burned. Must be the source chain's USDC.
    pub source_token: Pubkey,
    /// Amount in base units (USDC has 6 decimals).
    pub amount: u64,
    pub source_chain: Chain,
    pub destination: Destination<'a>,
}

impl fmt::Debug for TransferRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("source_signer", &self.source_signer.try_pubkey().ok())
            .field("source_token", &self.source_token)
            .field("amount", &self.amount)
            .field("source_chain", &self.source_chain)
            .field("destination", &self.destination)
            .finish()
    }
}

/// Proof that USDC was burned on the source chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnReceipt {
    pub source_tx: Signature,
    pub source_domain: Domain,
    pub destination_domain: Domain,
    /// Recipient in the 32-byte canonical form carried by the burn message.
    pub mint_recipient: B256,
    /// Account holding the `MessageSent` event; its rent can be reclaimed
    /// once the attestation is available. Unknown when the receipt was
    /// reconstructed from a transaction signature alone.
    pub event_account: Option<Pubkey>,
}

/// Circle's signed attestation of a burn message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub message: Bytes,
    pub attestation: Bytes,
    pub event_nonce: u64,
}

/// Outcome of presenting an attestation to the destination chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Minted { tx: TxHash },
    /// The message had already been received, by this or another caller.
    AlreadyProcessed,
}

impl ReceiveOutcome {
    pub fn mint_tx(&self) -> Option<TxHash> {
        match self {
            Self::Minted { tx } => Some(*tx),
            Self::AlreadyProcessed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub burn_tx: Signature,
    pub mint: ReceiveOutcome,
    pub attestation: Attestation,
    pub recipient_chain: Chain,
}

/// Burns USDC on the source chain in exchange for a CCTP message.
#[async_trait]
pub trait SourceChainBurner: Send + Sync {
    /// Validates the request, submits the burn, and waits for it to be
    /// confirmed. Validation failures return before any network call.
    async fn burn(
        &self,
        request: &TransferRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<BurnReceipt, BurnError>;
}

#[async_trait]
impl<T: SourceChainBurner + ?Sized> SourceChainBurner for Arc<T> {
    async fn burn(
        &self,
        request: &TransferRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<BurnReceipt, BurnError> {
        (**self).burn(request, cancel).await
    }
}
