//! Circle CCTP (V1) for Solana-sourced transfers.
//!
//! - [`pda`] derives the program accounts a burn touches.
//! - [`instructions`] encodes the Anchor instructions.
//! - [`solana`] submits the burn and waits for confirmation.
//! - [`attestation`] polls Circle's attestation service.
//! - [`receiver`] presents the attested message on the EVM side.

use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;

pub mod attestation;
pub mod instructions;
pub mod pda;
pub mod receiver;
pub mod solana;

pub const MESSAGE_TRANSMITTER_PROGRAM: Pubkey =
    pubkey!("CCTPmbSD7gX1bxKPAmg77w8oFzNFpaQiQUWD43TKaecd");
pub const TOKEN_MESSENGER_MINTER_PROGRAM: Pubkey =
    pubkey!("CCTPiPYPc6AsJuwueEnWgSgucamXDZwBd53dQ11YiKX3");
pub const TOKEN_PROGRAM: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// The two CCTP programs on Solana. Both networks use the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CctpPrograms {
    pub message_transmitter: Pubkey,
    pub token_messenger_minter: Pubkey,
}

impl Default for CctpPrograms {
    fn default() -> Self {
        Self {
            message_transmitter: MESSAGE_TRANSMITTER_PROGRAM,
            token_messenger_minter: TOKEN_MESSENGER_MINTER_PROGRAM,
        }
    }
}
