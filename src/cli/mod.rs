//! CLI commands for bridging USDC and managing destination splits.

mod bridge;
mod split;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, Bytes};
use alloy::providers::ProviderBuilder;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::io::Write;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use locker_bridge::Chain;
use locker_bridge::address::parse_evm_address;
use locker_evm::Account;
use locker_evm::eoa::Eoa;
use locker_evm::smart_account::SmartAccount;
use locker_evm::split::{SplitPercentage, SplitRecipient};

use crate::config::{Ctx, Env};

/// USDC base units per whole token.
const USDC_BASE_UNITS: u64 = 1_000_000;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid USDC amount {input:?}: expected a non-negative number with at most 6 decimals")]
    InvalidAmount { input: String },
    #[error("invalid split recipient {input:?}: {reason}")]
    InvalidSplitRecipient { input: String, reason: String },
    #[error("no split extension is deployed on {chain}")]
    NoSplitExtension { chain: Chain },
}

/// Parses a whole-token USDC amount such as `12.5` into base units.
fn parse_usdc_amount(input: &str) -> Result<u64, CliError> {
    let invalid = || CliError::InvalidAmount {
        input: input.to_string(),
    };

    let amount: Decimal = input.trim().parse().map_err(|_| invalid())?;
    if amount.is_sign_negative() {
        return Err(invalid());
    }

    let base_units = amount
        .checked_mul(Decimal::from(USDC_BASE_UNITS))
        .ok_or_else(invalid)?;
    if !base_units.fract().is_zero() {
        return Err(invalid());
    }

    base_units.to_u64().ok_or_else(invalid)
}

/// Parses `<address>=<percent>`, e.g. `0xabc...=12.5`.
fn parse_split_recipient(input: &str) -> Result<SplitRecipient, CliError> {
    let invalid = |reason: String| CliError::InvalidSplitRecipient {
        input: input.to_string(),
        reason,
    };

    let (address, percent) = input
        .split_once('=')
        .ok_or_else(|| invalid("expected <address>=<percent>".to_string()))?;

    let address = parse_evm_address(address.trim()).map_err(|err| invalid(err.to_string()))?;
    let percent: Decimal = percent
        .trim()
        .trim_end_matches('%')
        .parse()
        .map_err(|err| invalid(format!("{err}")))?;
    let percentage = SplitPercentage::from_percent(percent).map_err(|err| invalid(err.to_string()))?;

    Ok(SplitRecipient {
        address,
        percentage,
    })
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Burn USDC on Solana and mint it on an EVM chain
    Bridge {
        /// Amount of USDC to bridge (e.g. 12.5)
        #[arg(short = 'a', long = "amount", value_parser = parse_usdc_amount)]
        amount: u64,
        /// Destination chain (e.g. base, base-sepolia)
        #[arg(long = "to")]
        to: Chain,
        /// Address credited on the destination chain. Defaults to the
        /// destination account.
        #[arg(long = "recipient", value_parser = parse_evm_address)]
        recipient: Option<Address>,
        /// Smart account that receives the mint, overriding the config
        #[arg(long = "smart-account", value_parser = parse_evm_address)]
        smart_account: Option<Address>,
        /// Run this split configuration once the USDC is minted
        #[arg(long = "split-config")]
        split_config: Option<u64>,
    },

    /// Finish a transfer whose burn already landed on Solana
    ///
    /// Waits for the attestation of the burn and submits it on the
    /// destination chain. Never burns again.
    Resume {
        /// Signature of the Solana burn transaction
        #[arg(long = "burn-tx")]
        burn_tx: Signature,
        /// Destination chain the burn targeted
        #[arg(long = "to")]
        to: Chain,
        /// Recipient the burn credited. Defaults to the destination account.
        #[arg(long = "recipient", value_parser = parse_evm_address)]
        recipient: Option<Address>,
        /// Smart account that submits the mint, overriding the config
        #[arg(long = "smart-account", value_parser = parse_evm_address)]
        smart_account: Option<Address>,
        /// Attested message bytes, skipping the attestation wait
        #[arg(long = "message", requires = "attestation")]
        message: Option<Bytes>,
        /// Attestation signatures for `--message`
        #[arg(long = "attestation", requires = "message")]
        attestation: Option<Bytes>,
    },

    /// Reclaim the rent held by an attested burn's event account
    Reclaim {
        /// Signature of the Solana burn transaction
        #[arg(long = "burn-tx")]
        burn_tx: Signature,
        /// Event account created by the burn
        #[arg(long = "event-account")]
        event_account: Pubkey,
    },

    /// Manage the split extension of a destination account
    Split {
        /// Chain the account lives on
        #[arg(long = "on")]
        chain: Chain,
        /// Smart account to manage, overriding the config
        #[arg(long = "smart-account", value_parser = parse_evm_address)]
        smart_account: Option<Address>,
        #[command(subcommand)]
        action: SplitCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum SplitCommand {
    /// Show whether the split extension is installed on the account
    Status,
    /// Register a new split configuration
    Create {
        /// Token to split. Defaults to the chain's USDC.
        #[arg(long = "token", value_parser = parse_evm_address)]
        token: Option<Address>,
        /// Recipient and share as <address>=<percent>; repeat per recipient
        #[arg(long = "recipient", value_parser = parse_split_recipient, required = true)]
        recipients: Vec<SplitRecipient>,
    },
    /// Distribute the account's balance according to a split configuration
    Run {
        #[arg(long = "config-index")]
        config_index: u64,
    },
    /// Enable or disable a split configuration
    Toggle {
        #[arg(long = "config-index")]
        config_index: u64,
    },
    /// Delete a split configuration
    Delete {
        #[arg(long = "config-index")]
        config_index: u64,
    },
}

#[derive(Debug, Parser)]
#[command(name = "locker")]
#[command(about = "Bridge USDC from Solana to EVM chains over CCTP")]
#[command(version)]
pub struct CliEnv {
    #[clap(flatten)]
    env: Env,
    #[command(subcommand)]
    pub command: Commands,
}

impl CliEnv {
    /// Parse CLI arguments, load config from file, and return with subcommand.
    pub fn parse_and_convert() -> anyhow::Result<(Ctx, Commands)> {
        Self::parse().load()
    }

    /// Load config and secrets from the file paths parsed from CLI arguments.
    pub(crate) fn load(self) -> anyhow::Result<(Ctx, Commands)> {
        let ctx = Ctx::load_files(&self.env.config, &self.env.secrets)?;
        Ok((ctx, self.command))
    }
}

pub async fn run_command(ctx: Ctx, command: Commands) -> anyhow::Result<()> {
    let cancel = cancel_on_ctrl_c();
    run_command_with_writers(&ctx, command, &cancel, &mut std::io::stdout()).await
}

async fn run_command_with_writers<W: Write>(
    ctx: &Ctx,
    command: Commands,
    cancel: &CancellationToken,
    stdout: &mut W,
) -> anyhow::Result<()> {
    match command {
        Commands::Bridge {
            amount,
            to,
            recipient,
            smart_account,
            split_config,
        } => {
            bridge::bridge_command(
                stdout,
                ctx,
                bridge::BridgeArgs {
                    amount,
                    to,
                    recipient,
                    smart_account,
                    split_config,
                },
                cancel,
            )
            .await?;
        }
        Commands::Resume {
            burn_tx,
            to,
            recipient,
            smart_account,
            message,
            attestation,
        } => {
            let args = bridge::ResumeArgs {
                burn_tx,
                to,
                recipient,
                smart_account,
                attested: message.zip(attestation),
            };
            bridge::resume_command(stdout, ctx, args, cancel).await?;
        }
        Commands::Reclaim {
            burn_tx,
            event_account,
        } => {
            bridge::reclaim_command(stdout, ctx, burn_tx, event_account, cancel).await?;
        }
        Commands::Split {
            chain,
            smart_account,
            action,
        } => {
            split::split_command(stdout, ctx, chain, smart_account, action).await?;
        }
    }

    info!("CLI operation completed successfully");
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            token.cancel();
        }
    });

    cancel
}

/// Account on `chain` that submits calls with the configured EVM key.
fn destination_account(
    ctx: &Ctx,
    chain: Chain,
    smart_account: Option<Address>,
) -> anyhow::Result<Box<dyn Account>> {
    ctx.registry.receiver_contract(chain)?;

    let rpc_url: Url = ctx.registry.rpc_url(chain)?.parse()?;
    let wallet = EthereumWallet::from(ctx.evm_signer()?);
    let provider = ProviderBuilder::new().wallet(wallet).connect_http(rpc_url);

    let account: Box<dyn Account> = match ctx.smart_account(chain, smart_account) {
        Some(address) => Box::new(SmartAccount::new(
            address,
            provider,
            ctx.required_confirmations,
        )),
        None => Box::new(Eoa::new(provider, ctx.required_confirmations)),
    };

    Ok(account)
}

/// Formats base units as whole USDC.
fn format_usdc(base_units: u64) -> Decimal {
    Decimal::from(base_units) / Decimal::from(USDC_BASE_UNITS)
}
