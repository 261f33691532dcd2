//! # Expiration Monitor
//!
//! Periodic workflow that computes the remaining validity of the external
//! delivery credential and publishes it as a gauge-style value:
//!
//! ```text
//! ReadCredentialMetadata -> ComputeRemainingSeconds -> PublishMetric -> Done
//!          |                                                |
//!    missing metadata                               publish failure
//!          +-------------> PublishErrorMetric <------------+
//!                                  |
//!                                 Fail
//! ```
//!
//! The monitor is stateless across runs: threshold crossings (below 24 h,
//! below 6 h, below zero) are evaluated by the external alerting layer
//! watching the published value, so there is no "already alerted" state here.

use crate::constants::counters;
use crate::error::{MailRouteError, Result};
use crate::metrics::{CounterDatum, CounterEmitter};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Stored metadata for the external credential.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CredentialMetadata {
    /// Expiry instant as seconds since the Unix epoch.
    pub expires_at_epoch: i64,
}

impl CredentialMetadata {
    /// Seconds of validity left at `now_epoch`; negative once expired.
    pub fn remaining_seconds(&self, now_epoch: i64) -> i64 {
        self.expires_at_epoch - now_epoch
    }
}

/// Read access to the stored credential metadata.
#[async_trait]
pub trait CredentialMetadataSource: Send + Sync {
    /// Fetch the current metadata; `Ok(None)` means no credential is stored.
    async fn fetch(&self) -> Result<Option<CredentialMetadata>>;
}

/// Monitor workflow states; each run walks the chain once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    ReadCredentialMetadata,
    ComputeRemainingSeconds,
    PublishMetric,
    PublishErrorMetric,
    Done,
    Failed,
}

impl MonitorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ReadCredentialMetadata => "read_credential_metadata",
            Self::ComputeRemainingSeconds => "compute_remaining_seconds",
            Self::PublishMetric => "publish_metric",
            Self::PublishErrorMetric => "publish_error_metric",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of one monitor run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    pub remaining_seconds: i64,
}

/// Computes and publishes the credential's remaining validity.
pub struct ExpirationMonitor {
    source: Arc<dyn CredentialMetadataSource>,
    emitter: Arc<dyn CounterEmitter>,
    namespace: String,
    run_timeout: Duration,
}

impl ExpirationMonitor {
    pub fn new(
        source: Arc<dyn CredentialMetadataSource>,
        emitter: Arc<dyn CounterEmitter>,
        namespace: impl Into<String>,
        run_timeout: Duration,
    ) -> Self {
        Self {
            source,
            emitter,
            namespace: namespace.into(),
            run_timeout,
        }
    }

    /// Execute one monitor run under its wall-clock budget.
    pub async fn run(&self) -> Result<MonitorReport> {
        match tokio::time::timeout(self.run_timeout, self.run_inner()).await {
            Ok(result) => result,
            Err(_) => {
                self.publish_error_metric("run timed out").await;
                Err(MailRouteError::Timeout(
                    self.run_timeout,
                    "monitor run exceeded budget".into(),
                ))
            }
        }
    }

    async fn run_inner(&self) -> Result<MonitorReport> {
        let mut state = MonitorState::ReadCredentialMetadata;
        let mut metadata: Option<CredentialMetadata> = None;
        let mut remaining_seconds = 0i64;

        loop {
            state = match state {
                MonitorState::ReadCredentialMetadata => match self.source.fetch().await {
                    Ok(Some(found)) => {
                        metadata = Some(found);
                        MonitorState::ComputeRemainingSeconds
                    }
                    Ok(None) => {
                        error!("No credential metadata stored");
                        MonitorState::PublishErrorMetric
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to read credential metadata");
                        MonitorState::PublishErrorMetric
                    }
                },
                MonitorState::ComputeRemainingSeconds => match metadata {
                    Some(found) => {
                        remaining_seconds = found.remaining_seconds(Utc::now().timestamp());
                        MonitorState::PublishMetric
                    }
                    None => MonitorState::PublishErrorMetric,
                },
                MonitorState::PublishMetric => {
                    // Direct emission: a gauge must be published on every run,
                    // zero and negative values included.
                    let datum =
                        CounterDatum::seconds(counters::CREDENTIAL_REMAINING_SECONDS, remaining_seconds as f64);
                    match self.emitter.emit(&self.namespace, &[datum]).await {
                        Ok(_) => {
                            info!(
                                remaining_seconds = remaining_seconds,
                                "Published credential remaining-validity metric"
                            );
                            MonitorState::Done
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to publish remaining-validity metric");
                            MonitorState::PublishErrorMetric
                        }
                    }
                }
                MonitorState::PublishErrorMetric => {
                    self.publish_error_metric("monitor run failed").await;
                    MonitorState::Failed
                }
                MonitorState::Done => return Ok(MonitorReport { remaining_seconds }),
                MonitorState::Failed => {
                    return Err(MailRouteError::CredentialError(
                        "monitor run failed; error metric published".into(),
                    ))
                }
            };
        }
    }

    /// Best effort by definition: this is already the error path.
    async fn publish_error_metric(&self, reason: &str) {
        let datum = CounterDatum::count(counters::CREDENTIAL_MONITOR_ERROR, 1);
        if let Err(e) = self.emitter.emit(&self.namespace, &[datum]).await {
            error!(error = %e, reason = reason, "Failed to publish monitor error metric");
        }
    }
}

/// Fixed metadata source for tests and local runs.
pub struct StaticMetadataSource(pub Option<CredentialMetadata>);

#[async_trait]
impl CredentialMetadataSource for StaticMetadataSource {
    async fn fetch(&self) -> Result<Option<CredentialMetadata>> {
        Ok(self.0)
    }
}
