//! Constant-interval polling bounded by a deadline and a cancellation
//! token.
//!
//! Used for both Solana confirmation waits and attestation waits. The
//! operation is retried while its error is [`Transient`]; the first
//! non-transient error, the deadline, or cancellation ends the wait,
//! whichever comes first.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Whether an error should be retried.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` waits until success, a fatal error, or cancellation.
    pub max_wait: Option<Duration>,
}

impl PollPolicy {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_wait: None,
        }
    }

    #[must_use]
    pub const fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }
}

#[derive(Debug)]
pub struct Polled<T> {
    pub value: T,
    /// Failed attempts before the successful one.
    pub retries: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    #[error("gave up after {retries} retries: {error}")]
    Fatal { retries: usize, error: E },
    #[error("no result within {waited:?} ({retries} retries)")]
    TimedOut { waited: Duration, retries: usize },
    #[error("cancelled after {retries} retries")]
    Cancelled { retries: usize },
}

/// Runs `operation` every `policy.interval` until it succeeds.
pub async fn poll_with_deadline<T, E, F, Fut>(
    policy: PollPolicy,
    cancel: &CancellationToken,
    operation: F,
) -> Result<Polled<T>, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + std::fmt::Display,
{
    let retries = AtomicUsize::new(0);

    let backoff = ConstantBuilder::default()
        .with_delay(policy.interval)
        .without_max_times();

    let polling = operation
        .retry(backoff)
        .when(|err: &E| err.is_transient())
        .notify(|err: &E, delay: Duration| {
            let attempt = retries.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(attempt, ?delay, error = %err, "Retrying");
        });

    let deadline = async {
        match policy.max_wait {
            Some(max_wait) => tokio::time::sleep(max_wait).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;

        () = cancel.cancelled() => Err(PollError::Cancelled {
            retries: retries.load(Ordering::Relaxed),
        }),
        () = deadline => Err(PollError::TimedOut {
            waited: policy.max_wait.unwrap_or_default(),
            retries: retries.load(Ordering::Relaxed),
        }),
        result = polling => {
            let retries = retries.load(Ordering::Relaxed);
            match result {
                Ok(value) => Ok(Polled { value, retries }),
                Err(error) => Err(PollError::Fatal { retries, error }),
            }
        }
    }
}
