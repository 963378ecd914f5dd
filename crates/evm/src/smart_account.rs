//! Modular smart-contract account driven by an owner key.
//!
//! The owner wallet signs an outer transaction to the account. Calls to
//! external contracts are wrapped in the account's standard
//! `execute(target, value, data)`; calls addressed to the account itself
//! are sent as-is, since installed extensions expose their execution
//! functions directly on the account.

use std::collections::HashSet;

use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, WalletProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tracing::info;

use crate::{Account, AccountError, ExecutionReceipt, submit};

sol! {
    #[sol(rpc)]
    interface IModularAccount {
        function execute(address target, uint256 value, bytes calldata data)
            external
            payable
            returns (bytes memory result);

        function getInstalledPlugins() external view returns (address[] memory pluginAddresses);
    }
}

pub struct SmartAccount<P> {
    address: Address,
    provider: P,
    required_confirmations: u64,
}

impl<P> SmartAccount<P> {
    /// `provider` must carry a wallet for one of the account's owners.
    pub fn new(address: Address, provider: P, required_confirmations: u64) -> Self {
        Self {
            address,
            provider,
            required_confirmations,
        }
    }
}

/// Calldata and attached value for the outer transaction sent to the
/// account at `account`.
pub(crate) fn outer_call(
    account: Address,
    target: Address,
    data: Bytes,
    value: U256,
) -> (Bytes, U256) {
    if target == account {
        return (data, value);
    }

    let wrapped = IModularAccount::executeCall {
        target,
        value,
        data,
    }
    .abi_encode();

    (Bytes::from(wrapped), U256::ZERO)
}

#[async_trait]
impl<P> Account for SmartAccount<P>
where
    P: Provider + WalletProvider + Send + Sync,
{
    fn address(&self) -> Address {
        self.address
    }

    async fn execute(
        &self,
        target: Address,
        data: Bytes,
        value: U256,
    ) -> Result<ExecutionReceipt, AccountError> {
        info!(
            account = %self.address,
            owner = %self.provider.default_signer_address(),
            %target,
            %value,
            "Submitting smart account call"
        );

        let (calldata, attached) = outer_call(self.address, target, data, value);

        let tx = TransactionRequest::default()
            .to(self.address)
            .input(calldata.into())
            .value(attached);

        submit(&self.provider, tx, self.required_confirmations).await
    }

    async fn installed_extensions(&self) -> Result<HashSet<Address>, AccountError> {
        let account = IModularAccount::new(self.address, &self.provider);
        let plugins = account.getInstalledPlugins().call().await?;

        Ok(plugins.into_iter().collect())
    }
}
