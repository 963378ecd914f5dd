//! Operator CLI for bridging USDC from Solana to EVM chains.
//!
//! Configuration and command dispatch live here; the bridging itself is
//! in `locker-bridge` and the destination accounts in `locker-evm`.

pub mod cli;
pub mod config;

pub use config::setup_tracing;
