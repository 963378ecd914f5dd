use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::primitives::{Address, Bytes, TxHash, U256, address};
use async_trait::async_trait;
use locker_evm::{Account, AccountError, ExecutionReceipt};
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_client::rpc_response::RpcSimulateTransactionResult;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{Transaction, TransactionError};
use tokio_util::sync::CancellationToken;

use crate::address::to_canonical_recipient;
use crate::cctp::attestation::{AttestationApi, FetchError};
use crate::cctp::solana::SolanaRpc;
use crate::{
    Attestation, BurnError, BurnReceipt, Domain, SourceChainBurner, TransferRequest,
};

pub(crate) const ACCOUNT_ADDRESS: Address = address!("0x3333333333333333333333333333333333333333");

pub(crate) fn base_recipient() -> Address {
    address!("0x4444444444444444444444444444444444444444")
}

pub(crate) fn sample_attestation() -> Attestation {
    Attestation {
        message: Bytes::from(vec![0xaa]),
        attestation: Bytes::from(vec![0xbb]),
        event_nonce: 7,
    }
}

pub(crate) fn sample_burn_receipt() -> BurnReceipt {
    BurnReceipt {
        source_tx: Signature::from([1u8; 64]),
        source_domain: Domain(5),
        destination_domain: Domain(6),
        mint_recipient: to_canonical_recipient(base_recipient()),
        event_account: Some(Pubkey::new_from_array([2u8; 32])),
    }
}

pub(crate) struct StubSolanaRpc {
    token_account_exists: bool,
    status: Option<Result<(), TransactionError>>,
    preflight: Option<RpcSimulateTransactionResult>,
    calls: AtomicUsize,
    sent: Mutex<Vec<Transaction>>,
}

impl StubSolanaRpc {
    fn with_status(status: Option<Result<(), TransactionError>>) -> Self {
        Self {
            token_account_exists: true,
            status,
            preflight: None,
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn confirming() -> Self {
        Self::with_status(Some(Ok(())))
    }

    pub(crate) fn failing(error: TransactionError) -> Self {
        Self::with_status(Some(Err(error)))
    }

    pub(crate) fn never_confirming() -> Self {
        Self::with_status(None)
    }

    /// Refuses every transaction the way a node does when simulation fails.
    pub(crate) fn rejecting_preflight(error: TransactionError, logs: &[&str]) -> Self {
        let simulation = serde_json::from_value(serde_json::json!({
            "err": error,
            "logs": logs,
        }))
        .unwrap();

        Self {
            preflight: Some(simulation),
            ..Self::confirming()
        }
    }

    pub(crate) fn without_token_account(mut self) -> Self {
        self.token_account_exists = false;
        self
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sent_transactions(&self) -> Vec<Transaction> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SolanaRpc for StubSolanaRpc {
    async fn account_exists(&self, _address: &Pubkey) -> Result<bool, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.token_account_exists)
    }

    async fn latest_blockhash(&self) -> Result<Hash, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Hash::new_unique())
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(simulation) = &self.preflight {
            return Err(ClientErrorKind::RpcError(RpcError::RpcResponseError {
                code: -32002,
                message: "Transaction simulation failed".to_string(),
                data: RpcResponseErrorData::SendTransactionPreflightFailure(simulation.clone()),
            })
            .into());
        }

        self.sent.lock().unwrap().push(transaction.clone());
        Ok(transaction.signatures[0])
    }

    async fn signature_status(
        &self,
        _signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.clone())
    }
}

enum Behavior {
    Succeed,
    Reject(String),
    Revert,
}

/// Account stub that records every execution.
pub(crate) struct RecordingAccount {
    behavior: Behavior,
    extensions: HashSet<Address>,
    calls: Mutex<Vec<(Address, Bytes)>>,
}

impl RecordingAccount {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            extensions: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn new() -> Self {
        Self::with_behavior(Behavior::Succeed)
    }

    pub(crate) fn rejecting(reason: &str) -> Self {
        Self::with_behavior(Behavior::Reject(reason.to_string()))
    }

    pub(crate) fn reverting() -> Self {
        Self::with_behavior(Behavior::Revert)
    }

    pub(crate) fn with_extension(mut self, extension: Address) -> Self {
        self.extensions.insert(extension);
        self
    }

    pub(crate) fn calls(&self) -> Vec<(Address, Bytes)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Account for RecordingAccount {
    fn address(&self) -> Address {
        ACCOUNT_ADDRESS
    }

    async fn execute(
        &self,
        target: Address,
        data: Bytes,
        _value: U256,
    ) -> Result<ExecutionReceipt, AccountError> {
        self.calls.lock().unwrap().push((target, data));

        match &self.behavior {
            Behavior::Succeed => Ok(ExecutionReceipt {
                tx_hash: TxHash::repeat_byte(0x11),
            }),
            Behavior::Reject(reason) => Err(AccountError::Rejected {
                reason: reason.clone(),
                data: None,
            }),
            Behavior::Revert => Err(AccountError::Reverted {
                tx_hash: TxHash::repeat_byte(0x22),
            }),
        }
    }

    async fn installed_extensions(&self) -> Result<HashSet<Address>, AccountError> {
        Ok(self.extensions.clone())
    }
}

/// Returns scripted results in order, then `Pending` forever.
pub(crate) struct ScriptedAttestationApi {
    script: Mutex<VecDeque<Result<Attestation, FetchError>>>,
    calls: AtomicUsize,
}

impl ScriptedAttestationApi {
    pub(crate) fn new(script: Vec<Result<Attestation, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn completing() -> Self {
        Self::new(vec![Ok(sample_attestation())])
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttestationApi for ScriptedAttestationApi {
    async fn fetch(
        &self,
        _source_domain: Domain,
        _source_tx: &Signature,
    ) -> Result<Attestation, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(FetchError::Pending))
    }
}

/// Burner stub returning a fixed receipt.
pub(crate) struct CountingBurner {
    receipt: BurnReceipt,
    calls: AtomicUsize,
}

impl CountingBurner {
    pub(crate) fn new(receipt: BurnReceipt) -> Self {
        Self {
            receipt,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceChainBurner for CountingBurner {
    async fn burn(
        &self,
        _request: &TransferRequest<'_>,
        _cancel: &CancellationToken,
    ) -> Result<BurnReceipt, BurnError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.receipt.clone())
    }
}
