//! Program-derived addresses used by `deposit_for_burn`.
//!
//! Derivation is pure: the same programs, mint, and destination domain
//! always produce the same accounts.

use solana_sdk::pubkey::Pubkey;

use super::CctpPrograms;
use crate::Domain;

pub fn find_program_address(label: &str, program: &Pubkey, extra_seeds: &[&[u8]]) -> Pubkey {
    let mut seeds: Vec<&[u8]> = Vec::with_capacity(extra_seeds.len() + 1);
    seeds.push(label.as_bytes());
    seeds.extend_from_slice(extra_seeds);

    Pubkey::find_program_address(&seeds, program).0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositForBurnAccounts {
    pub message_transmitter: Pubkey,
    pub token_messenger: Pubkey,
    pub token_minter: Pubkey,
    pub local_token: Pubkey,
    pub remote_token_messenger: Pubkey,
    pub sender_authority: Pubkey,
    pub event_authority: Pubkey,
}

impl DepositForBurnAccounts {
    pub fn derive(programs: &CctpPrograms, usdc_mint: &Pubkey, destination: Domain) -> Self {
        let tmm = &programs.token_messenger_minter;
        // The remote messenger seed is the domain rendered as decimal text.
        let domain_seed = destination.0.to_string();

        Self {
            message_transmitter: message_transmitter_state(programs),
            token_messenger: find_program_address("token_messenger", tmm, &[]),
            token_minter: find_program_address("token_minter", tmm, &[]),
            local_token: find_program_address("local_token", tmm, &[usdc_mint.as_ref()]),
            remote_token_messenger: find_program_address(
                "remote_token_messenger",
                tmm,
                &[domain_seed.as_bytes()],
            ),
            sender_authority: find_program_address("sender_authority", tmm, &[]),
            event_authority: find_program_address("__event_authority", tmm, &[]),
        }
    }
}

pub fn message_transmitter_state(programs: &CctpPrograms) -> Pubkey {
    find_program_address("message_transmitter", &programs.message_transmitter, &[])
}
