//! Presenting attested messages to an EVM message transmitter.

use std::sync::Arc;

use alloy::primitives::{Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use locker_evm::{Account, AccountError};
use tracing::{info, warn};

use crate::error::{ConfigurationError, ErrorKind};
use crate::registry::{Chain, ChainRegistry};
use crate::{Attestation, ReceiveOutcome};

sol! {
    interface IMessageTransmitter {
        function receiveMessage(bytes calldata message, bytes calldata attestation)
            external
            returns (bool success);
    }
}

/// Revert reason of a message whose nonce was already consumed.
const NONCE_ALREADY_USED: &str = "Nonce already used";

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("receiveMessage reverted: {reason}")]
    Reverted { reason: String, data: Option<Bytes> },
    #[error("receiveMessage failed: {0}")]
    Account(#[source] AccountError),
}

impl ReceiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Reverted { .. } | Self::Account(AccountError::Reverted { .. }) => {
                ErrorKind::OnChainRevert
            }
            Self::Account(_) => ErrorKind::TransientNetwork,
        }
    }
}

pub fn receive_message_calldata(attestation: &Attestation) -> Bytes {
    IMessageTransmitter::receiveMessageCall {
        message: attestation.message.clone(),
        attestation: attestation.attestation.clone(),
    }
    .abi_encode()
    .into()
}

/// Submits `receiveMessage` through a destination [`Account`].
#[derive(Debug, Clone)]
pub struct CctpReceiver {
    registry: Arc<ChainRegistry>,
}

impl CctpReceiver {
    pub fn new(registry: Arc<ChainRegistry>) -> Self {
        Self { registry }
    }

    /// Mints on `chain`. A message that was already received is reported
    /// as [`ReceiveOutcome::AlreadyProcessed`] rather than an error.
    pub async fn receive(
        &self,
        attestation: &Attestation,
        chain: Chain,
        account: &dyn Account,
    ) -> Result<ReceiveOutcome, ReceiveError> {
        let transmitter = self.registry.receiver_contract(chain)?;

        info!(
            %chain,
            %transmitter,
            account = %account.address(),
            nonce = attestation.event_nonce,
            "Submitting receiveMessage"
        );

        match account
            .execute(transmitter, receive_message_calldata(attestation), U256::ZERO)
            .await
        {
            Ok(receipt) => {
                info!(tx_hash = %receipt.tx_hash, nonce = attestation.event_nonce, "USDC minted");
                Ok(ReceiveOutcome::Minted {
                    tx: receipt.tx_hash,
                })
            }
            Err(AccountError::Rejected { reason, .. }) if reason.contains(NONCE_ALREADY_USED) => {
                warn!(nonce = attestation.event_nonce, "Message already received");
                Ok(ReceiveOutcome::AlreadyProcessed)
            }
            Err(AccountError::Rejected { reason, data }) => {
                Err(ReceiveError::Reverted { reason, data })
            }
            Err(err) => Err(ReceiveError::Account(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::TxHash;

    use super::*;
    use crate::registry::Network;
    use crate::test_utils::{RecordingAccount, sample_attestation};

    fn receiver() -> CctpReceiver {
        CctpReceiver::new(Arc::new(ChainRegistry::for_network(Network::Testnet)))
    }

    #[test]
    fn calldata_uses_receive_message_selector() {
        let calldata = receive_message_calldata(&sample_attestation());

        assert_eq!(calldata[..4], [0x57, 0xec, 0xfd, 0x28]);

        let decoded = IMessageTransmitter::receiveMessageCall::abi_decode(&calldata).unwrap();
        assert_eq!(decoded.message, sample_attestation().message);
        assert_eq!(decoded.attestation, sample_attestation().attestation);
    }

    #[tokio::test]
    async fn successful_receive_returns_mint_tx() {
        let account = RecordingAccount::new();

        let outcome = receiver()
            .receive(&sample_attestation(), Chain::BaseSepolia, &account)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReceiveOutcome::Minted {
                tx: TxHash::repeat_byte(0x11)
            }
        );
        let calls = account.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].0,
            ChainRegistry::for_network(Network::Testnet)
                .receiver_contract(Chain::BaseSepolia)
                .unwrap()
        );
    }

    #[tokio::test]
    async fn used_nonce_is_already_processed() {
        let account = RecordingAccount::rejecting("execution reverted: Nonce already used");

        let outcome = receiver()
            .receive(&sample_attestation(), Chain::BaseSepolia, &account)
            .await
            .unwrap();

        assert_eq!(outcome, ReceiveOutcome::AlreadyProcessed);
        assert_eq!(outcome.mint_tx(), None);
    }

    #[tokio::test]
    async fn other_reverts_are_fatal() {
        let account = RecordingAccount::rejecting("execution reverted: Invalid attestation length");

        let err = receiver()
            .receive(&sample_attestation(), Chain::BaseSepolia, &account)
            .await
            .unwrap_err();

        assert!(
            matches!(&err, ReceiveError::Reverted { reason, .. } if reason.contains("Invalid attestation length")),
            "got {err:?}"
        );
        assert_eq!(err.kind(), ErrorKind::OnChainRevert);
    }

    #[tokio::test]
    async fn mined_revert_is_on_chain_failure() {
        let account = RecordingAccount::reverting();

        let err = receiver()
            .receive(&sample_attestation(), Chain::BaseSepolia, &account)
            .await
            .unwrap_err();

        assert!(matches!(err, ReceiveError::Account(AccountError::Reverted { .. })));
        assert_eq!(err.kind(), ErrorKind::OnChainRevert);
    }

    #[tokio::test]
    async fn solana_destination_is_rejected_without_submitting() {
        let account = RecordingAccount::new();

        let err = receiver()
            .receive(&sample_attestation(), Chain::SolanaDevnet, &account)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(account.calls().is_empty());
    }
}
