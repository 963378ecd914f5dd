//! Bridge, resume, and rent-reclaim commands.

use alloy::primitives::{Address, Bytes};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::Signer;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use locker_bridge::address::{from_canonical_recipient, to_canonical_recipient};
use locker_bridge::cctp::attestation::{AttestationPoller, IrisClient, extract_nonce_from_message};
use locker_bridge::cctp::solana::SolanaBurner;
use locker_bridge::orchestrator::{
    BridgeOrchestrator, Redistribution, StageError, TransferError,
};
use locker_bridge::{
    Attestation, BurnReceipt, Chain, Destination, ReceiveOutcome, TransferRequest, TransferResult,
};

use super::{CliError, destination_account, format_usdc};
use crate::config::Ctx;

type CliOrchestrator = BridgeOrchestrator<SolanaBurner<RpcClient>, IrisClient>;

pub(super) struct BridgeArgs {
    pub(super) amount: u64,
    pub(super) to: Chain,
    pub(super) recipient: Option<Address>,
    pub(super) smart_account: Option<Address>,
    pub(super) split_config: Option<u64>,
}

pub(super) struct ResumeArgs {
    pub(super) burn_tx: Signature,
    pub(super) to: Chain,
    pub(super) recipient: Option<Address>,
    pub(super) smart_account: Option<Address>,
    /// Message and attestation already fetched for this burn.
    pub(super) attested: Option<(Bytes, Bytes)>,
}

fn burner(ctx: &Ctx) -> anyhow::Result<SolanaBurner<RpcClient>> {
    let rpc = RpcClient::new(ctx.registry.rpc_url(ctx.source_chain)?.to_string());

    Ok(SolanaBurner::new(rpc, Arc::clone(&ctx.registry))
        .with_confirmation_wait(ctx.confirmation_max_wait))
}

fn poller(ctx: &Ctx) -> anyhow::Result<AttestationPoller<IrisClient>> {
    let client = IrisClient::new(ctx.registry.attestation_api())?;
    Ok(AttestationPoller::new(client).with_policy(ctx.attestation_policy))
}

fn orchestrator(ctx: &Ctx) -> anyhow::Result<CliOrchestrator> {
    Ok(BridgeOrchestrator::new(
        Arc::clone(&ctx.registry),
        burner(ctx)?,
        poller(ctx)?,
    ))
}

pub(super) async fn bridge_command<W: Write>(
    stdout: &mut W,
    ctx: &Ctx,
    args: BridgeArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let redistribution = match args.split_config {
        Some(config_index) => Some(
            Redistribution::registered(&ctx.registry, args.to, config_index)?
                .ok_or(CliError::NoSplitExtension { chain: args.to })?,
        ),
        None => None,
    };

    let account = destination_account(ctx, args.to, args.smart_account)?;
    let recipient = args.recipient.unwrap_or_else(|| account.address());
    let source_token = ctx.registry.usdc_mint(ctx.source_chain)?;
    let keypair = ctx.solana_keypair()?;
    let orchestrator = orchestrator(ctx)?;

    writeln!(
        stdout,
        "CCTP Bridge: {} -> {}, Amount: {} USDC",
        ctx.source_chain,
        args.to,
        format_usdc(args.amount)
    )?;
    writeln!(stdout, "   Source wallet: {}", keypair.pubkey())?;
    writeln!(stdout, "   Destination account: {}", account.address())?;
    writeln!(stdout, "   Recipient: {recipient}")?;

    let request = TransferRequest {
        source_signer: &keypair,
        source_token,
        amount: args.amount,
        source_chain: ctx.source_chain,
        destination: Destination {
            chain: args.to,
            recipient,
            account: account.as_ref(),
        },
    };

    let outcome = match orchestrator
        .bridge_and_receive(&request, redistribution, cancel)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            write_failure(stdout, &err, args.to, args.smart_account)?;
            return Err(err.into());
        }
    };

    write_result(stdout, &outcome.transfer)?;

    match outcome.redistribution {
        Some(Ok(receipt)) => writeln!(stdout, "   Split tx: {}", receipt.tx_hash)?,
        Some(Err(err)) => writeln!(
            stdout,
            "   Split failed: {err}\n   Funds remain on {}",
            account.address()
        )?,
        None => {}
    }

    Ok(())
}

pub(super) async fn resume_command<W: Write>(
    stdout: &mut W,
    ctx: &Ctx,
    args: ResumeArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let account = destination_account(ctx, args.to, args.smart_account)?;
    let recipient = args.recipient.unwrap_or_else(|| account.address());

    let burn = BurnReceipt {
        source_tx: args.burn_tx,
        source_domain: ctx.registry.domain(ctx.source_chain)?,
        destination_domain: ctx.registry.domain(args.to)?,
        mint_recipient: to_canonical_recipient(recipient),
        event_account: None,
    };
    let destination = Destination {
        chain: args.to,
        recipient,
        account: account.as_ref(),
    };
    let attestation = args
        .attested
        .map(|(message, attestation)| known_attestation(message, attestation))
        .transpose()?;

    writeln!(stdout, "Resuming CCTP transfer")?;
    writeln!(stdout, "   Burn tx: {}", args.burn_tx)?;
    writeln!(stdout, "   Route: {} -> {}", ctx.source_chain, args.to)?;

    let orchestrator = orchestrator(ctx)?;
    let outcome = match attestation {
        Some(attestation) => {
            writeln!(
                stdout,
                "   Using supplied attestation (nonce {})",
                attestation.event_nonce
            )?;
            orchestrator
                .resume_from_attestation(burn, attestation, &destination)
                .await
        }
        None => orchestrator.resume_from_burn(burn, &destination, cancel).await,
    };

    match outcome {
        Ok(result) => write_result(stdout, &result).map_err(Into::into),
        Err(err) => {
            write_failure(stdout, &err, args.to, args.smart_account)?;
            Err(err.into())
        }
    }
}

fn known_attestation(message: Bytes, attestation: Bytes) -> anyhow::Result<Attestation> {
    let event_nonce = extract_nonce_from_message(&message)?;

    Ok(Attestation {
        message,
        attestation,
        event_nonce,
    })
}

pub(super) async fn reclaim_command<W: Write>(
    stdout: &mut W,
    ctx: &Ctx,
    burn_tx: Signature,
    event_account: Pubkey,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let source_domain = ctx.registry.domain(ctx.source_chain)?;
    let keypair = ctx.solana_keypair()?;

    writeln!(stdout, "Reclaiming event account rent")?;
    writeln!(stdout, "   Burn tx: {burn_tx}")?;
    writeln!(stdout, "   Event account: {event_account}")?;

    let attestation = poller(ctx)?
        .await_attestation(source_domain, &burn_tx, cancel)
        .await?;
    writeln!(
        stdout,
        "   Attestation received (nonce {})",
        attestation.event_nonce
    )?;

    let signature = burner(ctx)?
        .reclaim_event_account(&keypair, event_account, &attestation, cancel)
        .await?;
    writeln!(stdout, "Rent reclaimed! Tx: {signature}")?;

    Ok(())
}

fn write_result<W: Write>(stdout: &mut W, result: &TransferResult) -> std::io::Result<()> {
    writeln!(stdout, "   Burn tx: {}", result.burn_tx)?;
    writeln!(
        stdout,
        "   Attestation nonce: {}",
        result.attestation.event_nonce
    )?;

    match result.mint {
        ReceiveOutcome::Minted { tx } => {
            writeln!(stdout, "Bridge complete! Mint tx on {}: {tx}", result.recipient_chain)
        }
        ReceiveOutcome::AlreadyProcessed => writeln!(
            stdout,
            "Bridge complete! Message was already received on {}",
            result.recipient_chain
        ),
    }
}

fn write_failure<W: Write>(
    stdout: &mut W,
    err: &TransferError,
    to: Chain,
    smart_account: Option<Address>,
) -> anyhow::Result<()> {
    writeln!(
        stdout,
        "Transfer failed at {} stage ({:?})",
        err.stage,
        err.kind()
    )?;

    if let StageError::Burn(burn_err) = &err.source
        && let Some(signature) = burn_err.pending_signature()
    {
        writeln!(
            stdout,
            "   Transaction {signature} was submitted but not confirmed; check it before retrying"
        )?;
    }

    if let Some(burn) = &err.burn {
        writeln!(stdout, "   Burn receipt: {}", serde_json::to_string(burn)?)?;

        let mut resume = format!(
            "locker resume --burn-tx {} --to {to} --recipient {}",
            burn.source_tx,
            from_canonical_recipient(burn.mint_recipient)?
        );
        if let Some(smart_account) = smart_account {
            resume.push_str(&format!(" --smart-account {smart_account}"));
        }
        if let Some(attestation) = &err.attestation {
            resume.push_str(&format!(
                " --message {} --attestation {}",
                attestation.message, attestation.attestation
            ));
        }
        writeln!(stdout, "   Resume with: {resume}")?;

        if let Some(event_account) = burn.event_account {
            writeln!(
                stdout,
                "   Reclaim rent once attested: locker reclaim --burn-tx {} --event-account {event_account}",
                burn.source_tx
            )?;
        }
    }

    Ok(())
}
