//! Pending-operation poller.
//!
//! After a one-time account lookup, the poller fetches pending operations on a
//! fixed interval and confirms each one in order. It stops when cancelled,
//! after too many consecutive fetch failures, or on the first rejected
//! confirmation. Progress goes to a caller-supplied callback; nothing here
//! prints.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::cache::{CacheManager, HistoryEntry};
use crate::config::PollerConfig;
use crate::models::{AcceptResult, AccountInfo, AccountNumber, PendingOperation};

/// Progress reported while polling or accepting.
#[derive(Debug)]
pub enum PollEvent {
    /// Pre-flight lookup succeeded; polling begins.
    Started { account: AccountInfo },
    NoPending,
    Found { count: usize },
    Accepted { reference: String, result: AcceptResult },
    AcceptFailed { reference: String, error: String },
    /// An operation without a reference was skipped.
    MissingReference { index: usize },
    FetchFailed { consecutive: u32, max: u32, error: String },
    HistoryWriteFailed { reference: String, error: String },
}

/// Why the poller stopped.
#[derive(Debug)]
pub enum PollOutcome {
    Cancelled,
    ErrorBudgetExhausted { last_error: ApiError },
    AcceptFailed { reference: String, error: ApiError },
}

/// First rejected confirmation in an accept-all pass.
#[derive(Error, Debug)]
#[error("Failed to accept operation {reference}: {error}")]
pub struct AcceptFailure {
    pub reference: String,
    #[source]
    pub error: ApiError,
}

/// Confirm `operations` in order, recording every attempt in the account's
/// history. Stops at the first failure; later operations are not attempted.
/// Returns how many were accepted.
pub async fn accept_all<F>(
    client: &ApiClient,
    cache: &CacheManager,
    number: &AccountNumber,
    operations: &[PendingOperation],
    on_event: &mut F,
) -> Result<usize, AcceptFailure>
where
    F: FnMut(PollEvent),
{
    let mut accepted = 0;

    for (index, operation) in operations.iter().enumerate() {
        let Some(reference) = operation.reference() else {
            warn!(index, "Pending operation has no reference, skipping");
            on_event(PollEvent::MissingReference { index });
            continue;
        };

        debug!(reference, amount = %operation.amount_display(), "Accepting operation");
        match client.accept_pending_operation(reference).await {
            Ok(result) => {
                info!(reference, "Operation accepted");
                record_history(
                    cache,
                    number,
                    HistoryEntry::accepted(reference, operations, result.clone()),
                    on_event,
                );
                on_event(PollEvent::Accepted {
                    reference: reference.to_string(),
                    result,
                });
                accepted += 1;
            }
            Err(error) => {
                warn!(reference, error = %error, "Operation rejected");
                record_history(
                    cache,
                    number,
                    HistoryEntry::failed(reference, operations, error.to_string()),
                    on_event,
                );
                on_event(PollEvent::AcceptFailed {
                    reference: reference.to_string(),
                    error: error.to_string(),
                });
                return Err(AcceptFailure {
                    reference: reference.to_string(),
                    error,
                });
            }
        }
    }

    Ok(accepted)
}

fn record_history<F>(cache: &CacheManager, number: &AccountNumber, entry: HistoryEntry, on_event: &mut F)
where
    F: FnMut(PollEvent),
{
    if let Err(e) = cache.append_history(number, &entry) {
        warn!(error = %e, reference = %entry.pending_reference, "Failed to write history");
        on_event(PollEvent::HistoryWriteFailed {
            reference: entry.pending_reference,
            error: e.to_string(),
        });
    }
}

/// Shortest pause between polls
const MIN_INTERVAL: Duration = Duration::from_secs(1);

pub struct OperationPoller {
    interval: Duration,
    max_consecutive_errors: u32,
}

impl OperationPoller {
    pub fn new(config: &PollerConfig) -> Self {
        Self::with_settings(config.interval(), config.max_consecutive_errors)
    }

    /// Intervals under one second are raised to one second, and a budget of
    /// zero is treated as one.
    pub fn with_settings(interval: Duration, max_consecutive_errors: u32) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            max_consecutive_errors: max_consecutive_errors.max(1),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll `number` until cancelled or stopped by a failure.
    ///
    /// `client` must already carry the session token. Only the pre-flight
    /// account lookup returns `Err`; every other stop is a `PollOutcome`.
    pub async fn run<F>(
        &self,
        client: &ApiClient,
        cache: &CacheManager,
        number: &AccountNumber,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<PollOutcome, ApiError>
    where
        F: FnMut(PollEvent),
    {
        let account = client.fetch_account_info(number).await?;
        if let Err(e) = cache.save_account_info(number, &account) {
            warn!(error = %e, "Failed to save account snapshot");
        }
        info!(
            account = %number,
            interval_ms = self.interval.as_millis() as u64,
            "Polling for pending operations"
        );
        on_event(PollEvent::Started { account });

        let mut consecutive_errors = 0u32;

        loop {
            if cancel.is_cancelled() {
                info!("Polling cancelled");
                return Ok(PollOutcome::Cancelled);
            }

            match client.fetch_pending_operations(number).await {
                Ok(operations) => {
                    consecutive_errors = 0;
                    if operations.is_empty() {
                        debug!("No pending operations");
                        on_event(PollEvent::NoPending);
                    } else {
                        info!(count = operations.len(), "Pending operations found");
                        on_event(PollEvent::Found {
                            count: operations.len(),
                        });
                        if let Err(failure) =
                            accept_all(client, cache, number, &operations, &mut on_event).await
                        {
                            return Ok(PollOutcome::AcceptFailed {
                                reference: failure.reference,
                                error: failure.error,
                            });
                        }
                    }
                }
                Err(error) => {
                    consecutive_errors += 1;
                    warn!(
                        consecutive = consecutive_errors,
                        max = self.max_consecutive_errors,
                        error = %error,
                        "Failed to fetch pending operations"
                    );
                    on_event(PollEvent::FetchFailed {
                        consecutive: consecutive_errors,
                        max: self.max_consecutive_errors,
                        error: error.to_string(),
                    });
                    if consecutive_errors >= self.max_consecutive_errors {
                        return Ok(PollOutcome::ErrorBudgetExhausted { last_error: error });
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Polling cancelled");
                    return Ok(PollOutcome::Cancelled);
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
