//! Split extension management commands.

use alloy::primitives::Address;
use std::io::Write;

use locker_bridge::Chain;
use locker_evm::split::SplitExtension;

use super::{CliError, SplitCommand, destination_account};
use crate::config::Ctx;

pub(super) async fn split_command<W: Write>(
    stdout: &mut W,
    ctx: &Ctx,
    chain: Chain,
    smart_account: Option<Address>,
    action: SplitCommand,
) -> anyhow::Result<()> {
    let extension_address = ctx
        .registry
        .split_extension(chain)?
        .ok_or(CliError::NoSplitExtension { chain })?;
    let account = destination_account(ctx, chain, smart_account)?;
    let extension = SplitExtension::new(account.as_ref(), extension_address);

    match action {
        SplitCommand::Status => {
            let installed = extension.is_installed().await?;
            writeln!(stdout, "Split extension on {chain}: {}", extension.extension())?;
            writeln!(stdout, "   Account: {}", account.address())?;
            writeln!(stdout, "   Installed: {installed}")?;
        }
        SplitCommand::Create { token, recipients } => {
            let token = match token {
                Some(token) => token,
                None => ctx.registry.usdc_token(chain)?,
            };

            writeln!(stdout, "Creating split of {token} on {chain}")?;
            for recipient in &recipients {
                writeln!(
                    stdout,
                    "   {} -> {}%",
                    recipient.address,
                    recipient.percentage.as_percent()
                )?;
            }

            let receipt = extension.create_split(token, &recipients).await?;
            writeln!(stdout, "Split created! Tx: {}", receipt.tx_hash)?;
        }
        SplitCommand::Run { config_index } => {
            writeln!(stdout, "Running split config {config_index} on {chain}")?;
            let receipt = extension.split(config_index).await?;
            writeln!(stdout, "Split executed! Tx: {}", receipt.tx_hash)?;
        }
        SplitCommand::Toggle { config_index } => {
            let receipt = extension.toggle_enabled(config_index).await?;
            writeln!(
                stdout,
                "Toggled split config {config_index} on {chain}. Tx: {}",
                receipt.tx_hash
            )?;
        }
        SplitCommand::Delete { config_index } => {
            let receipt = extension.delete(config_index).await?;
            writeln!(
                stdout,
                "Deleted split config {config_index} on {chain}. Tx: {}",
                receipt.tx_hash
            )?;
        }
    }

    Ok(())
}
