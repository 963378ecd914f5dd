//! Instruction encoding for the CCTP programs.
//!
//! CCTP programs are Anchor programs: instruction data is an 8-byte
//! discriminator (`sha256("global:<name>")[..8]`) followed by the
//! borsh-encoded arguments.

use alloy::primitives::B256;
use borsh::BorshSerialize;
use solana_sdk::hash::hashv;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_program;

use super::pda::{DepositForBurnAccounts, message_transmitter_state};
use super::{CctpPrograms, TOKEN_PROGRAM};
use crate::Domain;

pub fn anchor_discriminator(name: &str) -> [u8; 8] {
    let digest = hashv(&[b"global:", name.as_bytes()]).to_bytes();
    let mut discriminator = [0u8; 8];
    discriminator.copy_from_slice(&digest[..8]);
    discriminator
}

#[derive(BorshSerialize)]
struct DepositForBurnArgs {
    amount: u64,
    destination_domain: u32,
    mint_recipient: [u8; 32],
}

#[derive(BorshSerialize)]
struct ReclaimEventAccountArgs<'a> {
    attestation: &'a [u8],
}

fn anchor_instruction_data<T: BorshSerialize>(
    name: &str,
    args: &T,
) -> Result<Vec<u8>, std::io::Error> {
    let mut data = anchor_discriminator(name).to_vec();
    args.serialize(&mut data)?;
    Ok(data)
}

/// Inputs to a `deposit_for_burn` that are not derived from the programs.
#[derive(Debug, Clone, Copy)]
pub struct DepositForBurn {
    pub owner: Pubkey,
    pub burn_token_account: Pubkey,
    pub usdc_mint: Pubkey,
    pub event_account: Pubkey,
    pub amount: u64,
    pub destination_domain: Domain,
    pub mint_recipient: B256,
}

pub fn deposit_for_burn(
    programs: &CctpPrograms,
    accounts: &DepositForBurnAccounts,
    params: &DepositForBurn,
) -> Result<Instruction, std::io::Error> {
    let data = anchor_instruction_data(
        "deposit_for_burn",
        &DepositForBurnArgs {
            amount: params.amount,
            destination_domain: params.destination_domain.0,
            mint_recipient: params.mint_recipient.0,
        },
    )?;

    let metas = vec![
        AccountMeta::new_readonly(params.owner, true),
        AccountMeta::new(params.owner, true),
        AccountMeta::new_readonly(accounts.sender_authority, false),
        AccountMeta::new(params.burn_token_account, false),
        AccountMeta::new(accounts.message_transmitter, false),
        AccountMeta::new_readonly(accounts.token_messenger, false),
        AccountMeta::new_readonly(accounts.remote_token_messenger, false),
        AccountMeta::new_readonly(accounts.token_minter, false),
        AccountMeta::new(accounts.local_token, false),
        AccountMeta::new(params.usdc_mint, false),
        AccountMeta::new(params.event_account, true),
        AccountMeta::new_readonly(programs.message_transmitter, false),
        AccountMeta::new_readonly(programs.token_messenger_minter, false),
        AccountMeta::new_readonly(TOKEN_PROGRAM, false),
        AccountMeta::new_readonly(system_program::id(), false),
        AccountMeta::new_readonly(accounts.event_authority, false),
        AccountMeta::new_readonly(programs.token_messenger_minter, false),
    ];

    Ok(Instruction::new_with_bytes(
        programs.token_messenger_minter,
        &data,
        metas,
    ))
}

/// Closes a `MessageSent` event account and refunds its rent to `payee`.
/// The message transmitter only accepts this once `attestation` exists.
pub fn reclaim_event_account(
    programs: &CctpPrograms,
    payee: Pubkey,
    event_account: Pubkey,
    attestation: &[u8],
) -> Result<Instruction, std::io::Error> {
    let data = anchor_instruction_data(
        "reclaim_event_account",
        &ReclaimEventAccountArgs { attestation },
    )?;

    let metas = vec![
        AccountMeta::new(payee, true),
        AccountMeta::new(message_transmitter_state(programs), false),
        AccountMeta::new(event_account, false),
    ];

    Ok(Instruction::new_with_bytes(
        programs.message_transmitter,
        &data,
        metas,
    ))
}
