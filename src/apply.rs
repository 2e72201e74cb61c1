//! Replay of persisted operations against the metadata API.
//!
//! Operations are applied strictly one at a time in position order; later
//! relationship operations depend on earlier table-tracking operations
//! having taken effect on the remote system. Incremental operations are
//! best-effort sequential: a failure is recorded and the remaining
//! operations are still attempted, with no rollback. A declarative
//! replace-metadata call instead gets the bounded retry schedule.

use tokio::time::{sleep, Duration};

use crate::client::{GatewayClient, TransportError};
use crate::emit::{MetadataCommand, Operation};

/// Delay in milliseconds before each replace-metadata attempt.
pub const RETRY_DELAYS_MS: [u64; 3] = [0, 1000, 3000];

#[derive(Debug)]
pub struct ApplyFailure {
    pub label: String,
    pub error: TransportError,
}

#[derive(Debug, Default)]
pub struct ApplyResult {
    pub applied: usize,
    pub failures: Vec<ApplyFailure>,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Applier<'a> {
    client: &'a GatewayClient,
    retry_delays: Vec<u64>,
}

impl<'a> Applier<'a> {
    pub fn new(client: &'a GatewayClient) -> Self {
        Self {
            client,
            retry_delays: RETRY_DELAYS_MS.to_vec(),
        }
    }

    /// Override the retry schedule; tests use zero delays.
    pub fn with_retry_delays(client: &'a GatewayClient, retry_delays: Vec<u64>) -> Self {
        Self {
            client,
            retry_delays,
        }
    }

    pub async fn apply(&self, operations: &[Operation]) -> ApplyResult {
        let mut ordered: Vec<&Operation> = operations.iter().collect();
        ordered.sort_by_key(|op| op.position);

        let mut result = ApplyResult::default();
        for op in ordered {
            let outcome = match &op.command {
                MetadataCommand::ReplaceMetadata(_) => self.post_with_retry(op).await,
                _ => self.post_once(op).await,
            };
            match outcome {
                Ok(()) => {
                    tracing::info!(label = %op.label, "applied");
                    result.applied += 1;
                }
                Err(error) => {
                    tracing::error!(label = %op.label, error = %error, "apply failed");
                    result.failures.push(ApplyFailure {
                        label: op.label.clone(),
                        error,
                    });
                }
            }
        }
        result
    }

    async fn post_once(&self, op: &Operation) -> Result<(), TransportError> {
        let body = serde_json::to_value(&op.command)
            .map_err(|e| TransportError::Unknown(e.to_string()))?;
        self.client.metadata(&body).await.map(|_| ())
    }

    async fn post_with_retry(&self, op: &Operation) -> Result<(), TransportError> {
        let mut last = None;
        for (attempt, delay_ms) in self.retry_delays.iter().enumerate() {
            if *delay_ms > 0 {
                sleep(Duration::from_millis(*delay_ms)).await;
            }
            match self.post_once(op).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    tracing::warn!(
                        label = %op.label,
                        attempt = attempt + 1,
                        attempts = self.retry_delays.len(),
                        error = %error,
                        "attempt failed"
                    );
                    last = Some(error);
                }
            }
        }
        Err(last.unwrap_or_else(|| TransportError::Unknown("no attempts configured".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_schedule_is_fixed() {
        assert_eq!(RETRY_DELAYS_MS, [0, 1000, 3000]);
    }
}
