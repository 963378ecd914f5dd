use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use serde::Deserialize;
use solana_sdk::signature::{Keypair, read_keypair_file};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

use locker_bridge::poll::PollPolicy;
use locker_bridge::{Chain, ChainRegistry, ConfigurationError, Domain, Network};

#[derive(Parser, Debug)]
pub struct Env {
    /// Path to plaintext TOML configuration file
    #[clap(long)]
    pub config: PathBuf,
    /// Path to TOML secrets file
    #[clap(long)]
    pub secrets: PathBuf,
}

/// Non-secret settings deserialized from the plaintext config TOML.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    network: Network,
    log_level: Option<LogLevel>,
    source_chain: Option<Chain>,
    solana_rpc_url: Option<String>,
    attestation_api: Option<String>,
    attestation_poll_interval_secs: Option<u64>,
    attestation_max_wait_secs: Option<u64>,
    confirmation_max_wait_secs: Option<u64>,
    required_confirmations: Option<u64>,
    #[serde(default)]
    destinations: BTreeMap<Chain, DestinationConfig>,
    #[serde(default)]
    domains: Vec<DomainConfig>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DestinationConfig {
    rpc_url: Option<String>,
    smart_account: Option<Address>,
}

/// A domain id stated by the operator, checked against the protocol table.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DomainConfig {
    chain: Chain,
    domain: Domain,
}

/// Secret credentials deserialized from the secrets TOML.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Secrets {
    solana_keypair_path: PathBuf,
    evm_private_key: B256,
}

/// Runtime context assembled from the config and secrets files.
#[derive(Clone)]
pub struct Ctx {
    pub log_level: LogLevel,
    pub(crate) registry: Arc<ChainRegistry>,
    pub(crate) source_chain: Chain,
    pub(crate) attestation_policy: PollPolicy,
    pub(crate) confirmation_max_wait: Duration,
    pub(crate) required_confirmations: u64,
    pub(crate) smart_accounts: BTreeMap<Chain, Address>,
    solana_keypair_path: PathBuf,
    evm_private_key: B256,
}

impl fmt::Debug for Ctx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ctx")
            .field("log_level", &self.log_level)
            .field("network", &self.registry.network())
            .field("source_chain", &self.source_chain)
            .field("attestation_policy", &self.attestation_policy)
            .field("confirmation_max_wait", &self.confirmation_max_wait)
            .field("required_confirmations", &self.required_confirmations)
            .field("smart_accounts", &self.smart_accounts)
            .field("solana_keypair_path", &self.solana_keypair_path)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

impl From<&LogLevel> for Level {
    fn from(log_level: &LogLevel) -> Self {
        (*log_level).into()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Registry(#[from] ConfigurationError),
    #[error("source chain {chain} belongs to a different network than {network:?}")]
    NetworkMismatch { chain: Chain, network: Network },
    #[error("failed to derive an EVM signer from evm_private_key")]
    PrivateKeyDerivation(#[source] alloy::signers::k256::ecdsa::Error),
    #[error("failed to read Solana keypair from {path}: {reason}")]
    Keypair { path: PathBuf, reason: String },
}

const DEFAULT_ATTESTATION_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_ATTESTATION_MAX_WAIT_SECS: u64 = 30 * 60;
const DEFAULT_CONFIRMATION_MAX_WAIT_SECS: u64 = 90;
const DEFAULT_REQUIRED_CONFIRMATIONS: u64 = 1;

impl Ctx {
    pub fn load_files(config: &Path, secrets: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(config)?;
        let secrets_str = std::fs::read_to_string(secrets)?;
        Self::from_toml(&config_str, &secrets_str)
    }

    pub fn from_toml(config_toml: &str, secrets_toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_toml)?;
        let secrets: Secrets = toml::from_str(secrets_toml)?;

        PrivateKeySigner::from_bytes(&secrets.evm_private_key)
            .map_err(ConfigError::PrivateKeyDerivation)?;

        let source_chain = config
            .source_chain
            .unwrap_or_else(|| default_source_chain(config.network));

        if source_chain.network() != config.network {
            return Err(ConfigError::NetworkMismatch {
                chain: source_chain,
                network: config.network,
            });
        }

        let mut registry = ChainRegistry::for_network(config.network);
        registry.usdc_mint(source_chain)?;

        if let Some(url) = config.attestation_api {
            registry = registry.with_attestation_api(url);
        }

        if let Some(url) = config.solana_rpc_url {
            registry = registry.with_rpc_url(source_chain, url)?;
        }

        let mut smart_accounts = BTreeMap::new();
        for (chain, destination) in config.destinations {
            registry.receiver_contract(chain)?;

            if let Some(url) = destination.rpc_url {
                registry = registry.with_rpc_url(chain, url)?;
            }

            if let Some(account) = destination.smart_account {
                smart_accounts.insert(chain, account);
            }
        }

        for stated in &config.domains {
            registry.check_domain(stated.chain, stated.domain)?;
        }

        let attestation_policy = PollPolicy::new(Duration::from_secs(
            config
                .attestation_poll_interval_secs
                .unwrap_or(DEFAULT_ATTESTATION_POLL_INTERVAL_SECS),
        ))
        .with_max_wait(Duration::from_secs(
            config
                .attestation_max_wait_secs
                .unwrap_or(DEFAULT_ATTESTATION_MAX_WAIT_SECS),
        ));

        Ok(Self {
            log_level: config.log_level.unwrap_or_default(),
            registry: Arc::new(registry),
            source_chain,
            attestation_policy,
            confirmation_max_wait: Duration::from_secs(
                config
                    .confirmation_max_wait_secs
                    .unwrap_or(DEFAULT_CONFIRMATION_MAX_WAIT_SECS),
            ),
            required_confirmations: config
                .required_confirmations
                .unwrap_or(DEFAULT_REQUIRED_CONFIRMATIONS),
            smart_accounts,
            solana_keypair_path: secrets.solana_keypair_path,
            evm_private_key: secrets.evm_private_key,
        })
    }

    pub(crate) fn evm_signer(&self) -> Result<PrivateKeySigner, ConfigError> {
        PrivateKeySigner::from_bytes(&self.evm_private_key)
            .map_err(ConfigError::PrivateKeyDerivation)
    }

    pub(crate) fn solana_keypair(&self) -> Result<Keypair, ConfigError> {
        read_keypair_file(&self.solana_keypair_path).map_err(|err| ConfigError::Keypair {
            path: self.solana_keypair_path.clone(),
            reason: err.to_string(),
        })
    }

    /// Smart account configured for `chain`, unless overridden.
    pub(crate) fn smart_account(&self, chain: Chain, overridden: Option<Address>) -> Option<Address> {
        overridden.or_else(|| self.smart_accounts.get(&chain).copied())
    }
}

const fn default_source_chain(network: Network) -> Chain {
    match network {
        Network::Mainnet => Chain::Solana,
        Network::Testnet => Chain::SolanaDevnet,
    }
}

pub fn setup_tracing(log_level: &LogLevel) {
    let level: Level = log_level.into();
    let default_filter =
        format!("locker={level},locker_bridge={level},locker_evm={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
