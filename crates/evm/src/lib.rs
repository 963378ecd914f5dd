//! Destination-chain account abstraction.
//!
//! Bridged USDC is minted to, and redistributed from, an account on an
//! EVM chain. Every on-chain action goes through one capability,
//! [`Account`], which has two implementations:
//!
//! - [`Eoa`](eoa::Eoa) signs and submits calls directly from a local
//!   private key.
//! - [`SmartAccount`](smart_account::SmartAccount) routes calls through a
//!   modular smart-contract account's `execute(target, value, data)`,
//!   signed by one of the account's owners.
//!
//! Both variants surface Solidity revert reasons through
//! [`AccountError::Rejected`], so callers can recognise idempotent
//! replays without knowing which variant they hold.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use tracing::info;

pub mod eoa;
pub mod error_decoding;
pub mod smart_account;
pub mod split;

/// Errors that can occur while executing a call from an [`Account`].
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("transaction error: {0}")]
    Transaction(#[from] alloy::providers::PendingTransactionError),
    #[error("transport error: {0}")]
    Transport(alloy::transports::RpcError<alloy::transports::TransportErrorKind>),
    #[error("contract error: {0}")]
    Contract(alloy::contract::Error),
    /// The node refused the call during simulation, usually because the
    /// target contract reverted.
    #[error("call rejected: {reason}")]
    Rejected { reason: String, data: Option<Bytes> },
    #[error("transaction reverted: {tx_hash}")]
    Reverted { tx_hash: TxHash },
}

impl From<alloy::transports::RpcError<alloy::transports::TransportErrorKind>> for AccountError {
    fn from(err: alloy::transports::RpcError<alloy::transports::TransportErrorKind>) -> Self {
        error_decoding::classify_rpc_error(err)
    }
}

impl From<alloy::contract::Error> for AccountError {
    fn from(err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(rpc_err) => {
                error_decoding::classify_rpc_error(rpc_err)
            }
            other => Self::Contract(other),
        }
    }
}

/// Receipt of a successfully mined account execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReceipt {
    pub tx_hash: TxHash,
}

/// An identity on an EVM chain able to execute contract calls.
#[async_trait]
pub trait Account: Send + Sync {
    /// Address that holds funds and appears as `msg.sender` to targets.
    fn address(&self) -> Address;

    /// Executes `data` against `target`, forwarding `value` wei, and waits
    /// for the transaction to be mined.
    async fn execute(
        &self,
        target: Address,
        data: Bytes,
        value: U256,
    ) -> Result<ExecutionReceipt, AccountError>;

    /// Extensions (plugins) installed on the account. Plain key-pair
    /// accounts have none.
    async fn installed_extensions(&self) -> Result<HashSet<Address>, AccountError>;
}

#[async_trait]
impl<T: Account + ?Sized> Account for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn execute(
        &self,
        target: Address,
        data: Bytes,
        value: U256,
    ) -> Result<ExecutionReceipt, AccountError> {
        (**self).execute(target, data, value).await
    }

    async fn installed_extensions(&self) -> Result<HashSet<Address>, AccountError> {
        (**self).installed_extensions().await
    }
}

#[async_trait]
impl<T: Account + ?Sized> Account for Box<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn execute(
        &self,
        target: Address,
        data: Bytes,
        value: U256,
    ) -> Result<ExecutionReceipt, AccountError> {
        (**self).execute(target, data, value).await
    }

    async fn installed_extensions(&self) -> Result<HashSet<Address>, AccountError> {
        (**self).installed_extensions().await
    }
}

/// Sends `tx` through a wallet-filled provider and waits for the receipt.
pub(crate) async fn submit<P: Provider>(
    provider: &P,
    tx: TransactionRequest,
    required_confirmations: u64,
) -> Result<ExecutionReceipt, AccountError> {
    let pending = provider.send_transaction(tx).await?;

    info!(tx_hash = %pending.tx_hash(), "Transaction submitted");

    let receipt = pending
        .with_required_confirmations(required_confirmations)
        .get_receipt()
        .await?;

    if !receipt.status() {
        return Err(AccountError::Reverted {
            tx_hash: receipt.transaction_hash,
        });
    }

    info!(tx_hash = %receipt.transaction_hash, "Transaction confirmed");

    Ok(ExecutionReceipt {
        tx_hash: receipt.transaction_hash,
    })
}
