//! Circle attestation service client and poller.
//!
//! The service indexes burn messages by source domain and transaction
//! signature. Until the burn is observed the lookup 404s; until Circle's
//! attesters sign it the attestation reads `PENDING`. Both are normal
//! states of a healthy transfer, so the poller treats every fetch failure
//! as retryable and relies on its deadline and cancellation token to stop.

use std::time::Duration;

use alloy::hex;
use alloy::primitives::Bytes;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use solana_sdk::signature::Signature;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ErrorKind;
use crate::poll::{PollError, PollPolicy, Polled, Transient, poll_with_deadline};
use crate::{Attestation, Domain};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const PENDING: &str = "PENDING";

/// V1 message header: version (4) | source domain (4) | destination domain
/// (4) | nonce (8, big-endian).
const NONCE_INDEX: usize = 12;
const NONCE_SIZE: usize = size_of::<u64>();
const MIN_MESSAGE_LENGTH: usize = NONCE_INDEX + NONCE_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("attestation service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("attestation service returned HTTP {status}")]
    Server { status: u16 },
    #[error("burn not indexed yet: {detail}")]
    NotYetIndexed { detail: String },
    #[error("attestation pending")]
    Pending,
    #[error("malformed attestation response: {0}")]
    Malformed(String),
}

impl Transient for FetchError {
    fn is_transient(&self) -> bool {
        true
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    #[error("no attestation after {waited:?} ({retries} retries)")]
    Timeout { waited: Duration, retries: usize },
    #[error("attestation wait cancelled after {retries} retries")]
    Cancelled { retries: usize },
    #[error(transparent)]
    Fetch(FetchError),
}

impl AttestationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Fetch(_) => ErrorKind::TransientNetwork,
        }
    }
}

/// One lookup against an attestation service.
#[async_trait]
pub trait AttestationApi: Send + Sync {
    async fn fetch(
        &self,
        source_domain: Domain,
        source_tx: &Signature,
    ) -> Result<Attestation, FetchError>;
}

#[async_trait]
impl<T: AttestationApi + ?Sized> AttestationApi for &T {
    async fn fetch(
        &self,
        source_domain: Domain,
        source_tx: &Signature,
    ) -> Result<Attestation, FetchError> {
        (**self).fetch(source_domain, source_tx).await
    }
}

#[async_trait]
impl<T: AttestationApi + ?Sized> AttestationApi for std::sync::Arc<T> {
    async fn fetch(
        &self,
        source_domain: Domain,
        source_tx: &Signature,
    ) -> Result<Attestation, FetchError> {
        (**self).fetch(source_domain, source_tx).await
    }
}

/// HTTP client for Circle's Iris attestation API.
pub struct IrisClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl IrisClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<MessageEntry>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageEntry {
    attestation: Option<String>,
    message: Option<String>,
    event_nonce: Option<String>,
}

#[async_trait]
impl AttestationApi for IrisClient {
    async fn fetch(
        &self,
        source_domain: Domain,
        source_tx: &Signature,
    ) -> Result<Attestation, FetchError> {
        let url = format!("{}/messages/{source_domain}/{source_tx}", self.base_url);

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotYetIndexed {
                detail: format!("{url} returned 404"),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Server {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|err| FetchError::Malformed(err.to_string()))?;

        parse_messages(parsed)
    }
}

fn parse_messages(response: MessagesResponse) -> Result<Attestation, FetchError> {
    if let Some(detail) = response.error {
        return Err(FetchError::NotYetIndexed { detail });
    }

    let Some(entry) = response.messages.into_iter().next() else {
        return Err(FetchError::NotYetIndexed {
            detail: "no messages for transaction".to_string(),
        });
    };

    let attestation_hex = match entry.attestation.as_deref() {
        None | Some(PENDING) => return Err(FetchError::Pending),
        Some(attestation) => attestation,
    };

    let attestation = decode_hex("attestation", attestation_hex)?;
    let message = decode_hex(
        "message",
        entry
            .message
            .as_deref()
            .ok_or_else(|| FetchError::Malformed("attested entry has no message".to_string()))?,
    )?;

    let event_nonce = match entry.event_nonce {
        Some(nonce) => nonce
            .parse()
            .map_err(|_| FetchError::Malformed(format!("eventNonce {nonce:?} is not a u64")))?,
        None => extract_nonce_from_message(&message)?,
    };

    Ok(Attestation {
        message,
        attestation,
        event_nonce,
    })
}

fn decode_hex(field: &str, value: &str) -> Result<Bytes, FetchError> {
    hex::decode(value)
        .map(Bytes::from)
        .map_err(|err| FetchError::Malformed(format!("{field} is not hex: {err}")))
}

/// Reads the nonce from a V1 message header.
pub fn extract_nonce_from_message(message: &[u8]) -> Result<u64, FetchError> {
    let Some(bytes) = message.get(NONCE_INDEX..MIN_MESSAGE_LENGTH) else {
        return Err(FetchError::Malformed(format!(
            "message of {} bytes is shorter than its {MIN_MESSAGE_LENGTH}-byte header",
            message.len()
        )));
    };

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(nonce))
}

/// Waits for the attestation of a burn.
pub struct AttestationPoller<A> {
    api: A,
    policy: PollPolicy,
}

impl<A: AttestationApi> AttestationPoller<A> {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

    /// Polls every two seconds with no deadline.
    pub fn new(api: A) -> Self {
        Self {
            api,
            policy: PollPolicy::new(Self::DEFAULT_INTERVAL),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn await_attestation(
        &self,
        source_domain: Domain,
        source_tx: &Signature,
        cancel: &CancellationToken,
    ) -> Result<Attestation, AttestationError> {
        info!(%source_domain, %source_tx, "Waiting for attestation");

        let fetch = || async { self.api.fetch(source_domain, source_tx).await };

        match poll_with_deadline(self.policy, cancel, fetch).await {
            Ok(Polled { value, retries }) => {
                info!(%source_tx, retries, nonce = value.event_nonce, "Attestation received");
                Ok(value)
            }
            Err(PollError::TimedOut { waited, retries }) => {
                warn!(%source_tx, ?waited, retries, "Gave up waiting for attestation");
                Err(AttestationError::Timeout { waited, retries })
            }
            Err(PollError::Cancelled { retries }) => Err(AttestationError::Cancelled { retries }),
            Err(PollError::Fatal { error, .. }) => Err(AttestationError::Fetch(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::test_utils::{ScriptedAttestationApi, sample_attestation};

    fn signature() -> Signature {
        Signature::from([7u8; 64])
    }

    fn v1_message(nonce: u64) -> Vec<u8> {
        let mut message = vec![0u8; 116];
        message[4..8].copy_from_slice(&5u32.to_be_bytes());
        message[8..12].copy_from_slice(&6u32.to_be_bytes());
        message[NONCE_INDEX..MIN_MESSAGE_LENGTH].copy_from_slice(&nonce.to_be_bytes());
        message
    }

    #[tokio::test]
    async fn returns_after_exactly_two_pending_retries() {
        let api = ScriptedAttestationApi::new(vec![
            Err(FetchError::Pending),
            Err(FetchError::Pending),
            Ok(sample_attestation()),
        ]);
        let poller = AttestationPoller::new(&api)
            .with_policy(PollPolicy::new(Duration::from_millis(1)));

        let attestation = poller
            .await_attestation(Domain(5), &signature(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(attestation, sample_attestation());
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn never_completing_attestation_times_out_at_deadline() {
        let api = ScriptedAttestationApi::new(vec![]);
        let poller = AttestationPoller::new(&api).with_policy(
            PollPolicy::new(AttestationPoller::<&ScriptedAttestationApi>::DEFAULT_INTERVAL)
                .with_max_wait(Duration::from_secs(5)),
        );
        let started = tokio::time::Instant::now();

        let err = poller
            .await_attestation(Domain(5), &signature(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AttestationError::Timeout { .. }), "got {err:?}");
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn cancellation_is_reported_as_cancelled() {
        let api = ScriptedAttestationApi::new(vec![]);
        let poller = AttestationPoller::new(&api);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = poller
            .await_attestation(Domain(5), &signature(), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn iris_complete_response_is_parsed() {
        let server = MockServer::start_async().await;
        let sig = signature();
        let message = v1_message(42);

        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/messages/5/{sig}"));
                then.status(200).json_body(json!({
                    "messages": [{
                        "attestation": format!("0x{}", "bb".repeat(65)),
                        "message": hex::encode_prefixed(&message),
                        "eventNonce": "42"
                    }]
                }));
            })
            .await;

        let client = IrisClient::new(server.base_url()).unwrap();
        let attestation = client.fetch(Domain(5), &sig).await.unwrap();

        mock.assert_async().await;
        assert_eq!(attestation.event_nonce, 42);
        assert_eq!(attestation.message, Bytes::from(message));
        assert_eq!(attestation.attestation, Bytes::from(vec![0xbb; 65]));
    }

    #[tokio::test]
    async fn iris_pending_attestation_is_pending() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/messages/5/");
                then.status(200).json_body(json!({
                    "messages": [{
                        "attestation": "PENDING",
                        "message": "0x",
                        "eventNonce": "1"
                    }]
                }));
            })
            .await;

        let client = IrisClient::new(server.base_url()).unwrap();
        let err = client.fetch(Domain(5), &signature()).await.unwrap_err();

        assert!(matches!(err, FetchError::Pending), "got {err:?}");
    }

    #[tokio::test]
    async fn iris_not_found_is_not_yet_indexed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/messages/");
                then.status(404)
                    .json_body(json!({ "error": "Message hash not found" }));
            })
            .await;

        let client = IrisClient::new(server.base_url()).unwrap();
        let err = client.fetch(Domain(5), &signature()).await.unwrap_err();

        assert!(matches!(err, FetchError::NotYetIndexed { .. }), "got {err:?}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn iris_server_error_is_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/messages/");
                then.status(503);
            })
            .await;

        let client = IrisClient::new(server.base_url()).unwrap();
        let err = client.fetch(Domain(5), &signature()).await.unwrap_err();

        assert!(matches!(err, FetchError::Server { status: 503 }), "got {err:?}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn iris_garbage_body_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/messages/");
                then.status(200).body("<html>maintenance</html>");
            })
            .await;

        let client = IrisClient::new(server.base_url()).unwrap();
        let err = client.fetch(Domain(5), &signature()).await.unwrap_err();

        assert!(matches!(err, FetchError::Malformed(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn iris_error_field_is_not_yet_indexed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/messages/");
                then.status(200).json_body(json!({ "error": "Transaction not found" }));
            })
            .await;

        let client = IrisClient::new(format!("{}/", server.base_url())).unwrap();
        let err = client.fetch(Domain(5), &signature()).await.unwrap_err();

        assert!(
            matches!(&err, FetchError::NotYetIndexed { detail } if detail == "Transaction not found"),
            "got {err:?}"
        );
    }

    #[test]
    fn missing_event_nonce_falls_back_to_message_header() {
        let response = MessagesResponse {
            messages: vec![MessageEntry {
                attestation: Some("0xbbbb".to_string()),
                message: Some(hex::encode_prefixed(v1_message(9001))),
                event_nonce: None,
            }],
            error: None,
        };

        assert_eq!(parse_messages(response).unwrap().event_nonce, 9001);
    }

    #[test]
    fn attested_entry_without_message_is_malformed() {
        let response = MessagesResponse {
            messages: vec![MessageEntry {
                attestation: Some("0xbbbb".to_string()),
                message: None,
                event_nonce: Some("3".to_string()),
            }],
            error: None,
        };

        assert!(matches!(
            parse_messages(response),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn extract_nonce_from_short_message_is_malformed() {
        let err = extract_nonce_from_message(&[0u8; MIN_MESSAGE_LENGTH - 1]).unwrap_err();

        assert!(matches!(err, FetchError::Malformed(_)), "got {err:?}");
    }

    proptest! {
        #[test]
        fn extract_nonce_reads_big_endian_header(nonce in any::<u64>(), tail in 0usize..200) {
            let mut message = v1_message(nonce);
            message.truncate(MIN_MESSAGE_LENGTH + tail.min(96));

            prop_assert_eq!(extract_nonce_from_message(&message).unwrap(), nonce);
        }

        #[test]
        fn short_messages_never_yield_a_nonce(length in 0usize..MIN_MESSAGE_LENGTH) {
            prop_assert!(extract_nonce_from_message(&vec![0u8; length]).is_err());
        }
    }
}
