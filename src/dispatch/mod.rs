//! Action dispatch
//!
//! Translates high-severity correlated alerts into side effects on
//! external collaborators: block a source address, invalidate sessions,
//! require extra verification. Every call is independent and bounded by a
//! timeout; one failed collaborator never stops the others and never
//! prevents the alert itself from being recorded.

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{ActionKind, ActionRecord, Alert, DetectorKind, Severity};

/// Errors from side-effect collaborators
#[derive(Error, Debug)]
pub enum ActionDispatchError {
    #[error("collaborator call timed out after {0:?}")]
    Timeout(Duration),

    #[error("collaborator rejected the call: {0}")]
    Rejected(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Network-policy collaborator that can block source addresses
#[async_trait]
pub trait AddressBlocker: Send + Sync {
    async fn block_address(
        &self,
        addr: IpAddr,
        duration_minutes: u64,
        reason: &str,
    ) -> Result<(), ActionDispatchError>;
}

/// Auth-service collaborator for session and verification control
#[async_trait]
pub trait AuthControl: Send + Sync {
    /// Invalidate every active session for the subject except the one
    /// bound to `except_addr`
    async fn invalidate_sessions(
        &self,
        subject: &str,
        except_addr: IpAddr,
    ) -> Result<(), ActionDispatchError>;

    /// Require an additional verification step on the subject's next
    /// authentication
    async fn require_additional_verification(
        &self,
        subject: &str,
        reason: &str,
    ) -> Result<(), ActionDispatchError>;
}

/// Progressive block duration in minutes for repeated failures
///
/// `min(15 * 1.5^(count-5), 120)`: 15 minutes at the threshold of 5,
/// growing geometrically, capped at two hours. Rounds half-up to whole
/// minutes (count=6 gives 22.5 -> 23).
pub fn progressive_block_minutes(failure_count: u32) -> u64 {
    let exponent = failure_count.saturating_sub(5);
    let minutes = 15.0 * 1.5f64.powi(exponent as i32);
    minutes.min(120.0).round() as u64
}

pub struct ActionDispatcher {
    blocker: Option<Arc<dyn AddressBlocker>>,
    auth: Option<Arc<dyn AuthControl>>,
    base_block_minutes: u64,
    call_timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(
        blocker: Option<Arc<dyn AddressBlocker>>,
        auth: Option<Arc<dyn AuthControl>>,
        base_block_minutes: u64,
        call_timeout: Duration,
    ) -> Self {
        ActionDispatcher {
            blocker,
            auth,
            base_block_minutes,
            call_timeout,
        }
    }

    /// Dispatch the actions mapped to one correlated alert
    ///
    /// Returns a record per attempted action, failed ones included, so the
    /// alert carries a visible marker for every side effect.
    pub async fn dispatch(&self, alert: &Alert) -> Vec<ActionRecord> {
        match alert.kind {
            DetectorKind::BruteForce => {
                vec![
                    self.block(alert, self.base_block_minutes, "brute force attempt")
                        .await,
                ]
            }
            DetectorKind::MultipleFailedAttempts => {
                let count = alert.evidence["failure_count"].as_u64().unwrap_or(5) as u32;
                let minutes = progressive_block_minutes(count);
                vec![self.block(alert, minutes, "repeated failed logins").await]
            }
            DetectorKind::SimultaneousLogins if alert.severity >= Severity::High => {
                vec![self.invalidate_sessions(alert).await]
            }
            DetectorKind::UnusualLocation if alert.severity >= Severity::High => {
                vec![self.require_verification(alert).await]
            }
            // No automatic action for the remaining detectors; the alert
            // itself is the response.
            DetectorKind::UnusualHour
            | DetectorKind::MultiDeviceLogin
            | DetectorKind::BehaviorChange
            | DetectorKind::UnusualLocation
            | DetectorKind::SimultaneousLogins => Vec::new(),
        }
    }

    async fn block(&self, alert: &Alert, minutes: u64, reason: &str) -> ActionRecord {
        let result = match self.blocker {
            Some(ref blocker) => {
                self.bounded(blocker.block_address(alert.source_addr, minutes, reason))
                    .await
            }
            None => Err(ActionDispatchError::Unavailable(
                "no address blocker configured".to_string(),
            )),
        };
        self.record(
            alert,
            ActionKind::BlockAddress,
            result,
            format!("block {} for {} min", alert.source_addr, minutes),
        )
    }

    async fn invalidate_sessions(&self, alert: &Alert) -> ActionRecord {
        let result = match self.auth {
            Some(ref auth) => {
                self.bounded(auth.invalidate_sessions(&alert.subject, alert.source_addr))
                    .await
            }
            None => Err(ActionDispatchError::Unavailable(
                "no auth control configured".to_string(),
            )),
        };
        self.record(
            alert,
            ActionKind::InvalidateSessions,
            result,
            format!("invalidate sessions except {}", alert.source_addr),
        )
    }

    async fn require_verification(&self, alert: &Alert) -> ActionRecord {
        let result = match self.auth {
            Some(ref auth) => {
                self.bounded(
                    auth.require_additional_verification(&alert.subject, &alert.summary),
                )
                .await
            }
            None => Err(ActionDispatchError::Unavailable(
                "no auth control configured".to_string(),
            )),
        };
        self.record(
            alert,
            ActionKind::RequireVerification,
            result,
            "require additional verification".to_string(),
        )
    }

    async fn bounded<F>(&self, call: F) -> Result<(), ActionDispatchError>
    where
        F: std::future::Future<Output = Result<(), ActionDispatchError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ActionDispatchError::Timeout(self.call_timeout)),
        }
    }

    fn record(
        &self,
        alert: &Alert,
        kind: ActionKind,
        result: Result<(), ActionDispatchError>,
        detail: String,
    ) -> ActionRecord {
        match result {
            Ok(()) => ActionRecord {
                kind,
                succeeded: true,
                detail,
                timestamp: alert.created_at,
            },
            Err(e) => {
                log::error!("action {} failed for alert {}: {}", kind, alert.id, e);
                ActionRecord {
                    kind,
                    succeeded: false,
                    detail: format!("{}: {}", detail, e),
                    timestamp: alert.created_at,
                }
            }
        }
    }
}
