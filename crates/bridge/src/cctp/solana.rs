//! Burning USDC on Solana through the TokenMessengerMinter program.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::{Signer, SignerError};
use solana_sdk::transaction::{Transaction, TransactionError};
use tokio_util::sync::CancellationToken;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use tracing::{debug, info, warn};

use super::instructions::{DepositForBurn, deposit_for_burn, reclaim_event_account};
use super::pda::DepositForBurnAccounts;
use super::{CctpPrograms, TOKEN_PROGRAM};
use crate::address::to_canonical_recipient;
use crate::error::{ConfigurationError, ErrorKind, ValidationError};
use crate::poll::{PollError, PollPolicy, Polled, Transient, poll_with_deadline};
use crate::registry::ChainRegistry;
use crate::{Attestation, BurnReceipt, SourceChainBurner, TransferRequest};

const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_CONFIRMATION_WAIT: Duration = Duration::from_secs(90);

/// The Solana RPC calls a burn needs.
#[async_trait]
pub trait SolanaRpc: Send + Sync {
    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ClientError>;

    async fn latest_blockhash(&self) -> Result<Hash, ClientError>;

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, ClientError>;

    /// `None` while the transaction is unknown or not yet at the client's
    /// commitment level.
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, ClientError>;
}

#[async_trait]
impl SolanaRpc for RpcClient {
    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ClientError> {
        let response = self
            .get_account_with_commitment(address, self.commitment())
            .await?;
        Ok(response.value.is_some())
    }

    async fn latest_blockhash(&self) -> Result<Hash, ClientError> {
        self.get_latest_blockhash().await
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, ClientError> {
        RpcClient::send_transaction(self, transaction).await
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, ClientError> {
        self.get_signature_status(signature).await
    }
}

#[async_trait]
impl<T: SolanaRpc + ?Sized> SolanaRpc for Arc<T> {
    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ClientError> {
        (**self).account_exists(address).await
    }

    async fn latest_blockhash(&self) -> Result<Hash, ClientError> {
        (**self).latest_blockhash().await
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, ClientError> {
        (**self).send_transaction(transaction).await
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, ClientError> {
        (**self).signature_status(signature).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BurnError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Solana RPC error: {0}")]
    Rpc(#[from] ClientError),
    #[error("failed to sign transaction: {0}")]
    Signing(#[from] SignerError),
    #[error("failed to encode instruction: {0}")]
    Encoding(#[from] std::io::Error),
    #[error("transaction failed preflight simulation: {error}")]
    Simulation {
        error: TransactionError,
        logs: Vec<String>,
    },
    #[error("transaction {signature} failed on chain: {error}")]
    Rejected {
        signature: Signature,
        error: TransactionError,
    },
    #[error("transaction {signature} not confirmed within {waited:?}")]
    ConfirmationTimeout {
        signature: Signature,
        waited: Duration,
    },
    #[error("cancelled while confirming transaction {signature}")]
    Cancelled { signature: Signature },
}

impl BurnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Validation(_) | Self::Signing(_) | Self::Encoding(_) => ErrorKind::Validation,
            Self::Rpc(_) => ErrorKind::TransientNetwork,
            Self::Rejected { .. } | Self::Simulation { .. } => ErrorKind::OnChainRevert,
            Self::ConfirmationTimeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Signature of a submitted transaction whose outcome is unknown.
    /// Such a burn may still land; callers should check it before retrying.
    pub fn pending_signature(&self) -> Option<&Signature> {
        match self {
            Self::ConfirmationTimeout { signature, .. } | Self::Cancelled { signature } => {
                Some(signature)
            }
            _ => None,
        }
    }
}

/// Separates a transaction the cluster refused to accept from a failure to
/// reach the cluster at all.
fn send_error(err: ClientError) -> BurnError {
    let rejection = match err.kind() {
        ClientErrorKind::RpcError(RpcError::RpcResponseError {
            data: RpcResponseErrorData::SendTransactionPreflightFailure(simulation),
            ..
        }) => simulation
            .err
            .clone()
            .map(|error| (error, simulation.logs.clone().unwrap_or_default())),
        ClientErrorKind::TransactionError(error) => Some((error.clone(), Vec::new())),
        _ => None,
    };

    match rejection {
        Some((error, logs)) => BurnError::Simulation { error, logs },
        None => BurnError::Rpc(err),
    }
}

#[derive(Debug, thiserror::Error)]
enum ConfirmationError {
    #[error("not yet confirmed")]
    Unconfirmed,
    #[error("status query failed: {0}")]
    Rpc(ClientError),
}

impl Transient for ConfirmationError {
    fn is_transient(&self) -> bool {
        true
    }
}

/// Burns USDC on a Solana chain via `deposit_for_burn`.
pub struct SolanaBurner<R> {
    rpc: R,
    registry: Arc<ChainRegistry>,
    programs: CctpPrograms,
    confirmation: PollPolicy,
}

impl<R: SolanaRpc> SolanaBurner<R> {
    pub fn new(rpc: R, registry: Arc<ChainRegistry>) -> Self {
        Self {
            rpc,
            registry,
            programs: CctpPrograms::default(),
            confirmation: PollPolicy::new(CONFIRMATION_POLL_INTERVAL)
                .with_max_wait(DEFAULT_CONFIRMATION_WAIT),
        }
    }

    #[must_use]
    pub fn with_confirmation_wait(mut self, max_wait: Duration) -> Self {
        self.confirmation = self.confirmation.with_max_wait(max_wait);
        self
    }

    /// Checks a request against the registry without touching the network.
    fn validate(&self, request: &TransferRequest<'_>) -> Result<BurnPlan, BurnError> {
        let source_domain = self.registry.domain(request.source_chain)?;
        let usdc_mint = self.registry.usdc_mint(request.source_chain)?;

        if request.source_token != usdc_mint {
            return Err(ValidationError::TokenMismatch {
                chain: request.source_chain,
                expected: usdc_mint,
                actual: request.source_token,
            }
            .into());
        }

        if request.amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }

        let destination_domain = self.registry.domain(request.destination.chain)?;
        self.registry.receiver_contract(request.destination.chain)?;

        Ok(BurnPlan {
            source_domain,
            destination_domain,
            usdc_mint,
        })
    }

    async fn ensure_token_account(
        &self,
        signer: &(dyn Signer + Send + Sync),
        owner: Pubkey,
        mint: Pubkey,
        cancel: &CancellationToken,
    ) -> Result<Pubkey, BurnError> {
        let token_account = get_associated_token_address(&owner, &mint);

        if self.rpc.account_exists(&token_account).await? {
            debug!(%token_account, "USDC token account exists");
            return Ok(token_account);
        }

        info!(%token_account, %owner, "Creating USDC token account");
        let instruction =
            create_associated_token_account_idempotent(&owner, &owner, &mint, &TOKEN_PROGRAM);
        self.submit(&[instruction], signer, &[], cancel).await?;

        Ok(token_account)
    }

    async fn submit(
        &self,
        instructions: &[Instruction],
        payer: &(dyn Signer + Send + Sync),
        extra_signers: &[&Keypair],
        cancel: &CancellationToken,
    ) -> Result<Signature, BurnError> {
        let blockhash = self.rpc.latest_blockhash().await?;
        let transaction = sign_transaction(instructions, payer, extra_signers, blockhash)?;

        let signature = self
            .rpc
            .send_transaction(&transaction)
            .await
            .map_err(send_error)
            .inspect_err(|err| {
                if let BurnError::Simulation { logs, .. } = err {
                    warn!(?logs, "Solana transaction rejected in preflight");
                }
            })?;
        info!(%signature, "Submitted Solana transaction");

        self.await_confirmation(signature, cancel).await?;
        Ok(signature)
    }

    async fn await_confirmation(
        &self,
        signature: Signature,
        cancel: &CancellationToken,
    ) -> Result<(), BurnError> {
        let check_status = || async {
            match self.rpc.signature_status(&signature).await {
                Ok(Some(status)) => Ok(status),
                Ok(None) => Err(ConfirmationError::Unconfirmed),
                Err(err) => Err(ConfirmationError::Rpc(err)),
            }
        };

        match poll_with_deadline(self.confirmation, cancel, check_status).await {
            Ok(Polled {
                value: Ok(()),
                retries,
            }) => {
                info!(%signature, retries, "Solana transaction confirmed");
                Ok(())
            }
            Ok(Polled {
                value: Err(error), ..
            }) => Err(BurnError::Rejected { signature, error }),
            Err(PollError::TimedOut { waited, .. }) => {
                Err(BurnError::ConfirmationTimeout { signature, waited })
            }
            Err(PollError::Cancelled { .. }) => Err(BurnError::Cancelled { signature }),
            Err(PollError::Fatal { error, .. }) => match error {
                ConfirmationError::Rpc(err) => Err(BurnError::Rpc(err)),
                ConfirmationError::Unconfirmed => Err(BurnError::ConfirmationTimeout {
                    signature,
                    waited: Duration::ZERO,
                }),
            },
        }
    }

    /// Closes the `MessageSent` event account of an attested burn and
    /// refunds its rent to `payee`.
    pub async fn reclaim_event_account(
        &self,
        payee: &(dyn Signer + Send + Sync),
        event_account: Pubkey,
        attestation: &Attestation,
        cancel: &CancellationToken,
    ) -> Result<Signature, BurnError> {
        let payee_key = payee.try_pubkey()?;
        let instruction = reclaim_event_account(
            &self.programs,
            payee_key,
            event_account,
            &attestation.attestation,
        )?;

        info!(%event_account, payee = %payee_key, "Reclaiming event account rent");
        self.submit(&[instruction], payee, &[], cancel).await
    }
}

struct BurnPlan {
    source_domain: crate::Domain,
    destination_domain: crate::Domain,
    usdc_mint: Pubkey,
}

fn sign_transaction(
    instructions: &[Instruction],
    payer: &(dyn Signer + Send + Sync),
    extra_signers: &[&Keypair],
    blockhash: Hash,
) -> Result<Transaction, SignerError> {
    let payer_key = payer.try_pubkey()?;
    let mut signers: Vec<&dyn Signer> = Vec::with_capacity(extra_signers.len() + 1);
    signers.push(payer);
    for keypair in extra_signers {
        signers.push(*keypair);
    }

    let mut transaction = Transaction::new_with_payer(instructions, Some(&payer_key));
    transaction.try_sign(&signers, blockhash)?;
    Ok(transaction)
}

#[async_trait]
impl<R: SolanaRpc> SourceChainBurner for SolanaBurner<R> {
    async fn burn(
        &self,
        request: &TransferRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<BurnReceipt, BurnError> {
        let plan = self.validate(request)?;
        let owner = request.source_signer.try_pubkey()?;
        let mint_recipient = to_canonical_recipient(request.destination.recipient);

        let burn_token_account = self
            .ensure_token_account(request.source_signer, owner, plan.usdc_mint, cancel)
            .await?;

        let accounts =
            DepositForBurnAccounts::derive(&self.programs, &plan.usdc_mint, plan.destination_domain);
        let event_account = Keypair::new();
        let instruction = deposit_for_burn(
            &self.programs,
            &accounts,
            &DepositForBurn {
                owner,
                burn_token_account,
                usdc_mint: plan.usdc_mint,
                event_account: event_account.pubkey(),
                amount: request.amount,
                destination_domain: plan.destination_domain,
                mint_recipient,
            },
        )?;

        info!(
            amount = request.amount,
            source = %request.source_chain,
            destination = %request.destination.chain,
            recipient = %request.destination.recipient,
            "Burning USDC"
        );

        let source_tx = self
            .submit(&[instruction], request.source_signer, &[&event_account], cancel)
            .await?;

        Ok(BurnReceipt {
            source_tx,
            source_domain: plan.source_domain,
            destination_domain: plan.destination_domain,
            mint_recipient,
            event_account: Some(event_account.pubkey()),
        })
    }
}
