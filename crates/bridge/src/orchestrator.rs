//! Sequencing of burn, attestation, and receive into one transfer.
//!
//! A transfer moves through [`TransferState`]s. Any state can be handed
//! back to [`BridgeOrchestrator::run`] to continue from there, so a caller
//! that persisted the burn receipt (or the attestation) never burns twice.
//! Failures carry every artefact produced before them, see
//! [`TransferError::resume_state`].

use std::fmt;
use std::sync::Arc;

use alloy::primitives::Address;
use locker_evm::ExecutionReceipt;
use locker_evm::split::{SplitError, SplitExtension};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::address::to_canonical_recipient;
use crate::cctp::attestation::{AttestationApi, AttestationError, AttestationPoller};
use crate::cctp::receiver::{CctpReceiver, ReceiveError};
use crate::error::{ConfigurationError, ErrorKind};
use crate::registry::{Chain, ChainRegistry};
use crate::{
    Attestation, BurnError, BurnReceipt, Destination, SourceChainBurner, TransferRequest,
    TransferResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Created,
    Burned(BurnReceipt),
    AttestationObtained {
        burn: BurnReceipt,
        attestation: Attestation,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Burn,
    Attestation,
    Receive,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Burn => "burn",
            Self::Attestation => "attestation",
            Self::Receive => "receive",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Burn(#[from] BurnError),
    #[error(transparent)]
    Attestation(#[from] AttestationError),
    #[error(transparent)]
    Receive(#[from] ReceiveError),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Burn(err) => err.kind(),
            Self::Attestation(err) => err.kind(),
            Self::Receive(err) => err.kind(),
        }
    }
}

/// A failed transfer, with whatever it produced before failing.
#[derive(Debug, thiserror::Error)]
#[error("transfer failed at {stage} stage: {source}")]
pub struct TransferError {
    pub stage: Stage,
    pub burn: Option<BurnReceipt>,
    pub attestation: Option<Attestation>,
    #[source]
    pub source: StageError,
}

impl TransferError {
    fn new(
        stage: Stage,
        burn: Option<BurnReceipt>,
        attestation: Option<Attestation>,
        source: impl Into<StageError>,
    ) -> Self {
        Self {
            stage,
            burn,
            attestation,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// The state to pass back to [`BridgeOrchestrator::run`] to retry from
    /// the failed step.
    pub fn resume_state(&self) -> TransferState {
        match (&self.burn, &self.attestation) {
            (Some(burn), Some(attestation)) => TransferState::AttestationObtained {
                burn: burn.clone(),
                attestation: attestation.clone(),
            },
            (Some(burn), None) => TransferState::Burned(burn.clone()),
            (None, _) => TransferState::Created,
        }
    }
}

/// Split to run on the destination account once funds arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redistribution {
    pub extension: Address,
    pub config_index: u64,
}

impl Redistribution {
    /// Uses the split extension deployed on `chain`.
    pub fn registered(
        registry: &ChainRegistry,
        chain: Chain,
        config_index: u64,
    ) -> Result<Option<Self>, ConfigurationError> {
        Ok(registry
            .split_extension(chain)?
            .map(|extension| Self {
                extension,
                config_index,
            }))
    }
}

/// Result of [`BridgeOrchestrator::bridge_and_receive`]. A failed split
/// does not undo a completed transfer, so it is reported alongside it.
#[derive(Debug)]
pub struct BridgeAndReceive {
    pub transfer: TransferResult,
    pub redistribution: Option<Result<ExecutionReceipt, SplitError>>,
}

pub struct BridgeOrchestrator<B, A> {
    registry: Arc<ChainRegistry>,
    burner: B,
    poller: AttestationPoller<A>,
    receiver: CctpReceiver,
}

impl<B, A> BridgeOrchestrator<B, A>
where
    B: SourceChainBurner,
    A: AttestationApi,
{
    pub fn new(registry: Arc<ChainRegistry>, burner: B, poller: AttestationPoller<A>) -> Self {
        let receiver = CctpReceiver::new(Arc::clone(&registry));

        Self {
            registry,
            burner,
            poller,
            receiver,
        }
    }

    /// Runs a transfer from scratch.
    pub async fn transfer(
        &self,
        request: &TransferRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<TransferResult, TransferError> {
        self.run(request, TransferState::Created, cancel).await
    }

    /// Continues a transfer from `state`. Steps already reflected in
    /// `state` are not repeated.
    pub async fn run(
        &self,
        request: &TransferRequest<'_>,
        state: TransferState,
        cancel: &CancellationToken,
    ) -> Result<TransferResult, TransferError> {
        match state {
            TransferState::Created => {
                let burn = self
                    .burner
                    .burn(request, cancel)
                    .await
                    .map_err(|err| TransferError::new(Stage::Burn, None, None, err))?;

                info!(source_tx = %burn.source_tx, "Burn confirmed");
                self.resume_from_burn(burn, &request.destination, cancel)
                    .await
            }
            TransferState::Burned(burn) => {
                self.resume_from_burn(burn, &request.destination, cancel)
                    .await
            }
            TransferState::AttestationObtained { burn, attestation } => {
                self.resume_from_attestation(burn, attestation, &request.destination)
                    .await
            }
        }
    }

    /// Waits for the attestation of an earlier burn, then receives it.
    pub async fn resume_from_burn(
        &self,
        burn: BurnReceipt,
        destination: &Destination<'_>,
        cancel: &CancellationToken,
    ) -> Result<TransferResult, TransferError> {
        if let Err(err) = self.check_destination(&burn, destination) {
            return Err(TransferError::new(Stage::Attestation, Some(burn), None, err));
        }

        match self
            .poller
            .await_attestation(burn.source_domain, &burn.source_tx, cancel)
            .await
        {
            Ok(attestation) => {
                self.resume_from_attestation(burn, attestation, destination)
                    .await
            }
            Err(err) => Err(TransferError::new(Stage::Attestation, Some(burn), None, err)),
        }
    }

    /// Presents an attestation to the destination chain.
    pub async fn resume_from_attestation(
        &self,
        burn: BurnReceipt,
        attestation: Attestation,
        destination: &Destination<'_>,
    ) -> Result<TransferResult, TransferError> {
        if let Err(err) = self.check_destination(&burn, destination) {
            return Err(TransferError::new(
                Stage::Receive,
                Some(burn),
                Some(attestation),
                err,
            ));
        }

        match self
            .receiver
            .receive(&attestation, destination.chain, destination.account)
            .await
        {
            Ok(mint) => Ok(TransferResult {
                burn_tx: burn.source_tx,
                mint,
                attestation,
                recipient_chain: destination.chain,
            }),
            Err(err) => Err(TransferError::new(
                Stage::Receive,
                Some(burn),
                Some(attestation),
                err,
            )),
        }
    }

    /// Runs a transfer and, once it succeeds, the requested split on the
    /// destination account.
    pub async fn bridge_and_receive(
        &self,
        request: &TransferRequest<'_>,
        redistribution: Option<Redistribution>,
        cancel: &CancellationToken,
    ) -> Result<BridgeAndReceive, TransferError> {
        let transfer = self.transfer(request, cancel).await?;

        let redistribution = match redistribution {
            Some(redistribution) => {
                Some(redistribute(&request.destination, redistribution).await)
            }
            None => None,
        };

        Ok(BridgeAndReceive {
            transfer,
            redistribution,
        })
    }

    fn check_destination(
        &self,
        burn: &BurnReceipt,
        destination: &Destination<'_>,
    ) -> Result<(), ConfigurationError> {
        let registered = self.registry.domain(destination.chain)?;

        if registered != burn.destination_domain {
            return Err(ConfigurationError::DestinationMismatch {
                chain: destination.chain,
                receipt: burn.destination_domain,
                registered,
            });
        }

        if burn.mint_recipient != to_canonical_recipient(destination.recipient) {
            warn!(
                mint_recipient = %burn.mint_recipient,
                recipient = %destination.recipient,
                "Burn credits a different recipient than requested"
            );
        }

        Ok(())
    }
}

async fn redistribute(
    destination: &Destination<'_>,
    redistribution: Redistribution,
) -> Result<ExecutionReceipt, SplitError> {
    let extension = SplitExtension::new(destination.account, redistribution.extension);

    match extension.split(redistribution.config_index).await {
        Ok(receipt) => {
            info!(tx_hash = %receipt.tx_hash, "Redistributed bridged funds");
            Ok(receipt)
        }
        Err(err) => {
            warn!(error = %err, "Redistribution failed, funds remain on the destination account");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{TxHash, address};
    use solana_sdk::signature::Keypair;

    use super::*;
    use crate::cctp::attestation::FetchError;
    use crate::poll::PollPolicy;
    use crate::registry::Network;
    use crate::test_utils::{
        ACCOUNT_ADDRESS, CountingBurner, RecordingAccount, ScriptedAttestationApi, base_recipient,
        sample_attestation, sample_burn_receipt,
    };
    use crate::{Domain, ReceiveOutcome};

    const SPLIT_EXTENSION: Address = address!("0x9fBc03780c1AAc814E6BAD2C35Af4f55fCb31D69");

    type TestOrchestrator = BridgeOrchestrator<Arc<CountingBurner>, Arc<ScriptedAttestationApi>>;

    fn orchestrator(
        burner: &Arc<CountingBurner>,
        api: &Arc<ScriptedAttestationApi>,
    ) -> TestOrchestrator {
        let poller = AttestationPoller::new(Arc::clone(api))
            .with_policy(PollPolicy::new(std::time::Duration::from_millis(1)));

        BridgeOrchestrator::new(
            Arc::new(ChainRegistry::for_network(Network::Testnet)),
            Arc::clone(burner),
            poller,
        )
    }

    fn request<'a>(signer: &'a Keypair, account: &'a RecordingAccount) -> TransferRequest<'a> {
        TransferRequest {
            source_signer: signer,
            source_token: ChainRegistry::for_network(Network::Testnet)
                .usdc_mint(Chain::SolanaDevnet)
                .unwrap(),
            amount: 100,
            source_chain: Chain::SolanaDevnet,
            destination: Destination {
                chain: Chain::BaseSepolia,
                recipient: base_recipient(),
                account,
            },
        }
    }

    #[tokio::test]
    async fn transfer_runs_every_step_once() {
        let burner = Arc::new(CountingBurner::new(sample_burn_receipt()));
        let api = Arc::new(ScriptedAttestationApi::completing());
        let signer = Keypair::new();
        let account = RecordingAccount::new();

        let result = orchestrator(&burner, &api)
            .transfer(&request(&signer, &account), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.burn_tx, sample_burn_receipt().source_tx);
        assert_eq!(
            result.mint,
            ReceiveOutcome::Minted {
                tx: TxHash::repeat_byte(0x11)
            }
        );
        assert_eq!(result.attestation, sample_attestation());
        assert_eq!(result.recipient_chain, Chain::BaseSepolia);
        assert_eq!(burner.calls(), 1);
        assert_eq!(api.calls(), 1);
        assert_eq!(account.calls().len(), 1);
    }

    #[tokio::test]
    async fn resuming_from_burn_never_burns() {
        let burner = Arc::new(CountingBurner::new(sample_burn_receipt()));
        let api = Arc::new(ScriptedAttestationApi::completing());
        let signer = Keypair::new();
        let account = RecordingAccount::new();

        orchestrator(&burner, &api)
            .run(
                &request(&signer, &account),
                TransferState::Burned(sample_burn_receipt()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(burner.calls(), 0);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn resuming_from_attestation_skips_polling() {
        let burner = Arc::new(CountingBurner::new(sample_burn_receipt()));
        let api = Arc::new(ScriptedAttestationApi::completing());
        let account = RecordingAccount::new();
        let destination = Destination {
            chain: Chain::BaseSepolia,
            recipient: base_recipient(),
            account: &account,
        };

        let result = orchestrator(&burner, &api)
            .resume_from_attestation(sample_burn_receipt(), sample_attestation(), &destination)
            .await
            .unwrap();

        assert!(result.mint.mint_tx().is_some());
        assert_eq!(burner.calls(), 0);
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn replayed_message_still_completes_transfer() {
        let burner = Arc::new(CountingBurner::new(sample_burn_receipt()));
        let api = Arc::new(ScriptedAttestationApi::completing());
        let signer = Keypair::new();
        let account = RecordingAccount::rejecting("execution reverted: Nonce already used");

        let result = orchestrator(&burner, &api)
            .transfer(&request(&signer, &account), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.mint, ReceiveOutcome::AlreadyProcessed);
    }

    #[tokio::test]
    async fn attestation_failure_keeps_the_burn_for_resumption() {
        let burner = Arc::new(CountingBurner::new(sample_burn_receipt()));
        let api = Arc::new(ScriptedAttestationApi::new(vec![]));
        let signer = Keypair::new();
        let account = RecordingAccount::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator(&burner, &api)
            .transfer(&request(&signer, &account), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Attestation);
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.resume_state(), TransferState::Burned(sample_burn_receipt()));
        assert!(account.calls().is_empty());
    }

    #[tokio::test]
    async fn receive_failure_keeps_burn_and_attestation() {
        let burner = Arc::new(CountingBurner::new(sample_burn_receipt()));
        let api = Arc::new(ScriptedAttestationApi::new(vec![
            Err(FetchError::Pending),
            Ok(sample_attestation()),
        ]));
        let signer = Keypair::new();
        let account = RecordingAccount::rejecting("execution reverted: Invalid signature");

        let err = orchestrator(&burner, &api)
            .transfer(&request(&signer, &account), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Receive);
        assert_eq!(err.kind(), ErrorKind::OnChainRevert);
        assert_eq!(
            err.resume_state(),
            TransferState::AttestationObtained {
                burn: sample_burn_receipt(),
                attestation: sample_attestation(),
            }
        );
    }

    #[tokio::test]
    async fn resuming_toward_the_wrong_chain_is_a_configuration_error() {
        let burner = Arc::new(CountingBurner::new(sample_burn_receipt()));
        let api = Arc::new(ScriptedAttestationApi::completing());
        let account = RecordingAccount::new();
        let destination = Destination {
            chain: Chain::Sepolia,
            recipient: base_recipient(),
            account: &account,
        };

        let err = orchestrator(&burner, &api)
            .resume_from_burn(sample_burn_receipt(), &destination, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(matches!(
            err.source,
            StageError::Configuration(ConfigurationError::DestinationMismatch {
                receipt: Domain(6),
                registered: Domain(0),
                ..
            })
        ));
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn redistribution_runs_split_after_mint() {
        let burner = Arc::new(CountingBurner::new(sample_burn_receipt()));
        let api = Arc::new(ScriptedAttestationApi::completing());
        let signer = Keypair::new();
        let account = RecordingAccount::new().with_extension(SPLIT_EXTENSION);
        let redistribution = Redistribution::registered(
            &ChainRegistry::for_network(Network::Testnet),
            Chain::BaseSepolia,
            0,
        )
        .unwrap();

        let outcome = orchestrator(&burner, &api)
            .bridge_and_receive(
                &request(&signer, &account),
                redistribution,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome.redistribution, Some(Ok(_))));
        let calls = account.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0, ACCOUNT_ADDRESS);
    }

    #[tokio::test]
    async fn failed_redistribution_does_not_fail_the_transfer() {
        let burner = Arc::new(CountingBurner::new(sample_burn_receipt()));
        let api = Arc::new(ScriptedAttestationApi::completing());
        let signer = Keypair::new();
        let account = RecordingAccount::new();

        let outcome = orchestrator(&burner, &api)
            .bridge_and_receive(
                &request(&signer, &account),
                Some(Redistribution {
                    extension: SPLIT_EXTENSION,
                    config_index: 0,
                }),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.transfer.mint.mint_tx().is_some());
        assert!(matches!(
            outcome.redistribution,
            Some(Err(SplitError::NotInstalled { .. }))
        ));
    }

    #[tokio::test]
    async fn concurrent_transfers_are_independent() {
        let burner = Arc::new(CountingBurner::new(sample_burn_receipt()));
        let api = Arc::new(ScriptedAttestationApi::new(vec![
            Ok(sample_attestation()),
            Ok(sample_attestation()),
        ]));
        let orchestrator = orchestrator(&burner, &api);
        let (first_signer, second_signer) = (Keypair::new(), Keypair::new());
        let (first_account, second_account) = (RecordingAccount::new(), RecordingAccount::new());
        let cancel = CancellationToken::new();
        let first_request = request(&first_signer, &first_account);
        let second_request = request(&second_signer, &second_account);

        let (first, second) = tokio::join!(
            orchestrator.transfer(&first_request, &cancel),
            orchestrator.transfer(&second_request, &cancel),
        );

        first.unwrap();
        second.unwrap();
        assert_eq!(burner.calls(), 2);
        assert_eq!(first_account.calls().len(), 1);
        assert_eq!(second_account.calls().len(), 1);
    }
}
