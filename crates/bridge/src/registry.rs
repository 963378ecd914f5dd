//! Static protocol table of supported chains.
//!
//! CCTP domain ids, USDC token addresses, and EVM message transmitter
//! contracts are fixed by Circle. The registry is keyed by network so a
//! mainnet setup can never resolve a testnet contract, and vice versa. RPC
//! endpoints have public defaults that configuration may override.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, address};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;

use crate::Domain;
use crate::error::ConfigurationError;

const MAINNET_ATTESTATION_API: &str = "https://iris-api.circle.com";
const SANDBOX_ATTESTATION_API: &str = "https://iris-api-sandbox.circle.com";

const TESTNET_MESSAGE_TRANSMITTER: Address = address!("0x7865fAfC2db2093669d92c0F33AeEF291086BEFD");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
    Solana,
    SolanaDevnet,
    Ethereum,
    Sepolia,
    Avalanche,
    Optimism,
    Arbitrum,
    Base,
    BaseSepolia,
    Polygon,
}

impl Chain {
    pub const ALL: [Self; 10] = [
        Self::Solana,
        Self::SolanaDevnet,
        Self::Ethereum,
        Self::Sepolia,
        Self::Avalanche,
        Self::Optimism,
        Self::Arbitrum,
        Self::Base,
        Self::BaseSepolia,
        Self::Polygon,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Solana => "solana",
            Self::SolanaDevnet => "solana-devnet",
            Self::Ethereum => "ethereum",
            Self::Sepolia => "sepolia",
            Self::Avalanche => "avalanche",
            Self::Optimism => "optimism",
            Self::Arbitrum => "arbitrum",
            Self::Base => "base",
            Self::BaseSepolia => "base-sepolia",
            Self::Polygon => "polygon",
        }
    }

    pub const fn network(self) -> Network {
        match self {
            Self::SolanaDevnet | Self::Sepolia | Self::BaseSepolia => Network::Testnet,
            Self::Solana
            | Self::Ethereum
            | Self::Avalanche
            | Self::Optimism
            | Self::Arbitrum
            | Self::Base
            | Self::Polygon => Network::Mainnet,
        }
    }

    pub const fn is_solana(self) -> bool {
        matches!(self, Self::Solana | Self::SolanaDevnet)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = ConfigurationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|chain| chain.as_str().eq_ignore_ascii_case(input))
            .ok_or_else(|| ConfigurationError::UnsupportedChain(input.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

#[derive(Debug, Clone, Copy)]
enum Usdc {
    Solana(Pubkey),
    Evm(Address),
}

#[derive(Debug, Clone, Copy)]
struct ChainEntry {
    domain: Domain,
    usdc: Usdc,
    message_transmitter: Option<Address>,
    split_extension: Option<Address>,
    default_rpc_url: &'static str,
}

const fn solana(domain: u32, mint: Pubkey, rpc: &'static str) -> ChainEntry {
    ChainEntry {
        domain: Domain(domain),
        usdc: Usdc::Solana(mint),
        message_transmitter: None,
        split_extension: None,
        default_rpc_url: rpc,
    }
}

const fn evm(
    domain: u32,
    usdc: Address,
    message_transmitter: Address,
    split_extension: Option<Address>,
    rpc: &'static str,
) -> ChainEntry {
    ChainEntry {
        domain: Domain(domain),
        usdc: Usdc::Evm(usdc),
        message_transmitter: Some(message_transmitter),
        split_extension,
        default_rpc_url: rpc,
    }
}

const fn protocol_entry(chain: Chain) -> ChainEntry {
    match chain {
        Chain::Solana => solana(
            5,
            pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            "https://api.mainnet-beta.solana.com",
        ),
        Chain::SolanaDevnet => solana(
            5,
            pubkey!("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"),
            "https://api.devnet.solana.com",
        ),
        Chain::Ethereum => evm(
            0,
            address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            address!("0x0a992d191DEeC32aFe36203Ad87D7d289a738F81"),
            None,
            "https://ethereum-rpc.publicnode.com",
        ),
        Chain::Sepolia => evm(
            0,
            address!("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
            TESTNET_MESSAGE_TRANSMITTER,
            Some(address!("0x1ef5f1E4d06AD60e9A3FD64D00782c21523F7317")),
            "https://ethereum-sepolia-rpc.publicnode.com",
        ),
        Chain::Avalanche => evm(
            1,
            address!("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
            address!("0x8186359aF5F57FbB40c6b14A588d2A59C0C29880"),
            None,
            "https://api.avax.network/ext/bc/C/rpc",
        ),
        Chain::Optimism => evm(
            2,
            address!("0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85"),
            address!("0x4D41f22c5a0e5c74090899E5a8Fb597a8842b3e8"),
            None,
            "https://mainnet.optimism.io",
        ),
        Chain::Arbitrum => evm(
            3,
            address!("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
            address!("0xC30362313FBBA5cf9163F0bb16a0e01f01A896ca"),
            None,
            "https://arb1.arbitrum.io/rpc",
        ),
        Chain::Base => evm(
            6,
            address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            address!("0xAD09780d193884d503182aD4588450C416D6F9D4"),
            Some(address!("0x981656a00aB861498E2DCE2a94b1dd416B684844")),
            "https://mainnet.base.org",
        ),
        Chain::BaseSepolia => evm(
            6,
            address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
            TESTNET_MESSAGE_TRANSMITTER,
            Some(address!("0x9fBc03780c1AAc814E6BAD2C35Af4f55fCb31D69")),
            "https://sepolia.base.org",
        ),
        Chain::Polygon => evm(
            7,
            address!("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
            address!("0xF3be9355363857F3e001be68856A2f96b4C39Ba9"),
            None,
            "https://polygon-rpc.com",
        ),
    }
}

/// Chains available on one network, with their protocol parameters.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    network: Network,
    entries: BTreeMap<Chain, ChainEntry>,
    rpc_urls: BTreeMap<Chain, String>,
    attestation_api: String,
}

impl ChainRegistry {
    pub fn for_network(network: Network) -> Self {
        let entries = Chain::ALL
            .into_iter()
            .filter(|chain| chain.network() == network)
            .map(|chain| (chain, protocol_entry(chain)))
            .collect();

        let attestation_api = match network {
            Network::Mainnet => MAINNET_ATTESTATION_API,
            Network::Testnet => SANDBOX_ATTESTATION_API,
        };

        Self {
            network,
            entries,
            rpc_urls: BTreeMap::new(),
            attestation_api: attestation_api.to_string(),
        }
    }

    #[must_use]
    pub fn with_attestation_api(mut self, base_url: impl Into<String>) -> Self {
        self.attestation_api = base_url.into();
        self
    }

    pub fn with_rpc_url(
        mut self,
        chain: Chain,
        url: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        self.entry(chain)?;
        self.rpc_urls.insert(chain, url.into());
        Ok(self)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn chains(&self) -> impl Iterator<Item = Chain> + '_ {
        self.entries.keys().copied()
    }

    pub fn attestation_api(&self) -> &str {
        &self.attestation_api
    }

    fn entry(&self, chain: Chain) -> Result<&ChainEntry, ConfigurationError> {
        self.entries
            .get(&chain)
            .ok_or_else(|| ConfigurationError::UnsupportedChain(chain.to_string()))
    }

    pub fn domain(&self, chain: Chain) -> Result<Domain, ConfigurationError> {
        Ok(self.entry(chain)?.domain)
    }

    /// Confirms that an externally supplied domain id agrees with the
    /// protocol table.
    pub fn check_domain(&self, chain: Chain, configured: Domain) -> Result<(), ConfigurationError> {
        let registered = self.domain(chain)?;

        if registered != configured {
            return Err(ConfigurationError::DomainMismatch {
                chain,
                registered,
                configured,
            });
        }

        Ok(())
    }

    /// CCTP message transmitter that accepts `receiveMessage` on `chain`.
    pub fn receiver_contract(&self, chain: Chain) -> Result<Address, ConfigurationError> {
        self.entry(chain)?
            .message_transmitter
            .ok_or(ConfigurationError::NotEvm { chain })
    }

    pub fn usdc_mint(&self, chain: Chain) -> Result<Pubkey, ConfigurationError> {
        match self.entry(chain)?.usdc {
            Usdc::Solana(mint) => Ok(mint),
            Usdc::Evm(_) => Err(ConfigurationError::NotSolana { chain }),
        }
    }

    pub fn usdc_token(&self, chain: Chain) -> Result<Address, ConfigurationError> {
        match self.entry(chain)?.usdc {
            Usdc::Evm(token) => Ok(token),
            Usdc::Solana(_) => Err(ConfigurationError::NotEvm { chain }),
        }
    }

    /// Split extension deployment on `chain`, if there is one.
    pub fn split_extension(&self, chain: Chain) -> Result<Option<Address>, ConfigurationError> {
        Ok(self.entry(chain)?.split_extension)
    }

    pub fn rpc_url(&self, chain: Chain) -> Result<&str, ConfigurationError> {
        let entry = self.entry(chain)?;

        Ok(self
            .rpc_urls
            .get(&chain)
            .map_or(entry.default_rpc_url, String::as_str))
    }
}
