//! Externally owned account backed by a local private key.

use std::collections::HashSet;

use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, WalletProvider};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use tracing::info;

use crate::{Account, AccountError, ExecutionReceipt, submit};

/// Plain key-pair account that submits calls directly.
///
/// Wraps a provider that includes a wallet filler (e.g., built with
/// `ProviderBuilder::new().wallet(wallet).connect_http(...)`). The account
/// address is the provider's default signer.
pub struct Eoa<P> {
    provider: P,
    required_confirmations: u64,
}

impl<P> Eoa<P> {
    pub fn new(provider: P, required_confirmations: u64) -> Self {
        Self {
            provider,
            required_confirmations,
        }
    }
}

#[async_trait]
impl<P> Account for Eoa<P>
where
    P: Provider + WalletProvider + Send + Sync,
{
    fn address(&self) -> Address {
        self.provider.default_signer_address()
    }

    async fn execute(
        &self,
        target: Address,
        data: Bytes,
        value: U256,
    ) -> Result<ExecutionReceipt, AccountError> {
        info!(from = %self.address(), %target, %value, "Submitting EOA call");

        let tx = TransactionRequest::default()
            .to(target)
            .input(data.into())
            .value(value);

        submit(&self.provider, tx, self.required_confirmations).await
    }

    async fn installed_extensions(&self) -> Result<HashSet<Address>, AccountError> {
        Ok(HashSet::new())
    }
}
