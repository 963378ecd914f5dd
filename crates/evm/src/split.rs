//! Client for the split extension installed on a destination account.
//!
//! The extension holds a list of split configurations, each naming a token
//! and a set of recipients with fixed percentages. Percentages are integers
//! where [`PERCENTAGE_DENOMINATOR`] (1e8) is 100%, so the finest
//! representable share is 0.000001%.
//!
//! Every call is routed through the owning [`Account`] to the account's own
//! address: the extension's execution functions live on the account once
//! it is installed.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::info;

use crate::{Account, AccountError, ExecutionReceipt};

sol! {
    interface ISplitPlugin {
        function createSplit(
            address _tokenAddress,
            address[] calldata _splitAddresses,
            uint32[] calldata _percentages
        ) external;

        function split(uint256 _configIndex) external;

        function toggleIsSplitEnabled(uint256 _configIndex) external;

        function deleteSplitConfig(uint256 _configIndex) external;
    }
}

/// Integer value representing 100%.
pub const PERCENTAGE_DENOMINATOR: u32 = 100_000_000;

const SCALE_PER_PERCENT: u32 = PERCENTAGE_DENOMINATOR / 100;

#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("split extension {extension} is not installed on account {account}")]
    NotInstalled { extension: Address, account: Address },
    #[error("split percentage {percent}% must be above 0%, below 100%, and a multiple of 0.000001%")]
    InvalidPercentage { percent: Decimal },
    #[error("split percentages add up to {total}%, which exceeds 100%")]
    TotalExceeded { total: Decimal },
    #[error("a split needs at least one recipient")]
    NoRecipients,
    #[error(transparent)]
    Account(#[from] AccountError),
}

/// A single recipient's share, validated to lie strictly between 0% and
/// 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitPercentage(u32);

impl SplitPercentage {
    /// Converts a human percentage (e.g. `12.5` for 12.5%) to its on-chain
    /// integer form. Values that would lose precision are rejected rather
    /// than rounded.
    pub fn from_percent(percent: Decimal) -> Result<Self, SplitError> {
        let scaled = percent
            .checked_mul(Decimal::from(SCALE_PER_PERCENT))
            .ok_or(SplitError::InvalidPercentage { percent })?;

        if !scaled.fract().is_zero() {
            return Err(SplitError::InvalidPercentage { percent });
        }

        match scaled.to_u32() {
            Some(raw) if raw > 0 && raw < PERCENTAGE_DENOMINATOR => Ok(Self(raw)),
            _ => Err(SplitError::InvalidPercentage { percent }),
        }
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn as_percent(self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(SCALE_PER_PERCENT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitRecipient {
    pub address: Address,
    pub percentage: SplitPercentage,
}

/// Checks that the recipients form a valid split and encodes the
/// `createSplit` call.
fn encode_create_split(token: Address, recipients: &[SplitRecipient]) -> Result<Bytes, SplitError> {
    if recipients.is_empty() {
        return Err(SplitError::NoRecipients);
    }

    let total: u64 = recipients
        .iter()
        .map(|recipient| u64::from(recipient.percentage.raw()))
        .sum();

    if total > u64::from(PERCENTAGE_DENOMINATOR) {
        return Err(SplitError::TotalExceeded {
            total: Decimal::from(total) / Decimal::from(SCALE_PER_PERCENT),
        });
    }

    let call = ISplitPlugin::createSplitCall {
        _tokenAddress: token,
        _splitAddresses: recipients.iter().map(|recipient| recipient.address).collect(),
        _percentages: recipients
            .iter()
            .map(|recipient| recipient.percentage.raw())
            .collect(),
    };

    Ok(Bytes::from(call.abi_encode()))
}

/// Split extension operations on one account.
pub struct SplitExtension<'a> {
    account: &'a dyn Account,
    extension: Address,
}

impl<'a> SplitExtension<'a> {
    pub fn new(account: &'a dyn Account, extension: Address) -> Self {
        Self { account, extension }
    }

    pub fn extension(&self) -> Address {
        self.extension
    }

    pub async fn is_installed(&self) -> Result<bool, SplitError> {
        let installed = self.account.installed_extensions().await?;
        Ok(installed.contains(&self.extension))
    }

    async fn ensure_installed(&self) -> Result<(), SplitError> {
        if self.is_installed().await? {
            return Ok(());
        }

        Err(SplitError::NotInstalled {
            extension: self.extension,
            account: self.account.address(),
        })
    }

    async fn execute_on_account(&self, data: Bytes) -> Result<ExecutionReceipt, SplitError> {
        let receipt = self
            .account
            .execute(self.account.address(), data, U256::ZERO)
            .await?;
        Ok(receipt)
    }

    /// Registers a new split configuration for `token`.
    ///
    /// Recipients are validated before anything is sent.
    pub async fn create_split(
        &self,
        token: Address,
        recipients: &[SplitRecipient],
    ) -> Result<ExecutionReceipt, SplitError> {
        let data = encode_create_split(token, recipients)?;
        self.ensure_installed().await?;

        info!(
            account = %self.account.address(),
            %token,
            recipients = recipients.len(),
            "Creating split configuration"
        );

        self.execute_on_account(data).await
    }

    /// Distributes the account's current balance of the configured token.
    pub async fn split(&self, config_index: u64) -> Result<ExecutionReceipt, SplitError> {
        self.ensure_installed().await?;
        info!(account = %self.account.address(), config_index, "Running split");

        let data = ISplitPlugin::splitCall {
            _configIndex: U256::from(config_index),
        }
        .abi_encode();

        self.execute_on_account(data.into()).await
    }

    pub async fn toggle_enabled(&self, config_index: u64) -> Result<ExecutionReceipt, SplitError> {
        self.ensure_installed().await?;
        info!(account = %self.account.address(), config_index, "Toggling split");

        let data = ISplitPlugin::toggleIsSplitEnabledCall {
            _configIndex: U256::from(config_index),
        }
        .abi_encode();

        self.execute_on_account(data.into()).await
    }

    pub async fn delete(&self, config_index: u64) -> Result<ExecutionReceipt, SplitError> {
        self.ensure_installed().await?;
        info!(account = %self.account.address(), config_index, "Deleting split");

        let data = ISplitPlugin::deleteSplitConfigCall {
            _configIndex: U256::from(config_index),
        }
        .abi_encode();

        self.execute_on_account(data.into()).await
    }
}
