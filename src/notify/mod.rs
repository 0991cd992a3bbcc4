//! Notification sinks
//!
//! Fans each correlated alert out, at most once, to structured log
//! emission, an optional dashboard subscriber channel, and an optional
//! SIEM export webhook. All sinks besides the log are optional; their
//! absence is not an error, and a failing sink never propagates.

use reqwest::Client;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{Alert, Severity};

/// Errors that can occur while emitting notifications
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Dashboard channel closed")]
    ChannelClosed,
}

/// Non-blocking handle feeding a dashboard subscriber
///
/// Wraps an mpsc sender; `push` uses try_send so the ingest path never
/// blocks on a slow subscriber. A full queue drops the alert with a
/// warning.
#[derive(Clone)]
pub struct DashboardQueue {
    tx: mpsc::Sender<Alert>,
}

impl DashboardQueue {
    pub fn new(tx: mpsc::Sender<Alert>) -> Self {
        DashboardQueue { tx }
    }

    /// Create a dashboard channel pair
    pub fn channel() -> (mpsc::Sender<Alert>, mpsc::Receiver<Alert>) {
        mpsc::channel(100)
    }

    pub fn push(&self, alert: Alert) {
        if let Err(e) = self.tx.try_send(alert) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    log::warn!("dashboard queue full, dropping alert");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    log::warn!("dashboard queue closed");
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// SIEM export webhook
///
/// Pushes the full alert record as JSON to a configured endpoint,
/// filtered by minimum severity.
pub struct SiemExporter {
    client: Client,
    url: String,
    min_severity: Severity,
}

impl SiemExporter {
    pub fn new(url: String, min_severity: Severity, timeout_secs: u64) -> Self {
        SiemExporter {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            url,
            min_severity,
        }
    }

    pub async fn export(&self, alert: &Alert) -> Result<(), NotifyError> {
        if alert.severity < self.min_severity {
            log::debug!(
                "skipping SIEM export for alert {} ({} < {})",
                alert.id,
                alert.severity,
                self.min_severity
            );
            return Ok(());
        }

        let response = self.client.post(&self.url).json(alert).send().await?;
        if !response.status().is_success() {
            log::warn!(
                "SIEM webhook returned non-success status: {}",
                response.status()
            );
        }
        Ok(())
    }
}

/// At-most-once fan-out over all configured sinks
pub struct NotificationFanout {
    dashboard: Option<DashboardQueue>,
    siem: Option<SiemExporter>,
}

impl NotificationFanout {
    pub fn new(dashboard: Option<DashboardQueue>, siem: Option<SiemExporter>) -> Self {
        NotificationFanout { dashboard, siem }
    }

    /// Publish one alert to every configured sink
    ///
    /// Sink failures are logged and swallowed; publication never fails
    /// the pipeline.
    pub async fn publish(&self, alert: &Alert) {
        log::warn!(
            "ALERT [{}] {} - subject: {}, address: {}, severity: {}",
            alert.kind,
            alert.summary,
            alert.subject,
            alert.source_addr,
            alert.severity
        );

        if let Some(ref dashboard) = self.dashboard {
            dashboard.push(alert.clone());
        }

        if let Some(ref siem) = self.siem {
            if let Err(e) = siem.export(alert).await {
                log::error!("SIEM export failed for alert {}: {}", alert.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Detection, DetectorKind, LoginEvent, Outcome};

    fn test_alert(severity: Severity) -> Alert {
        let event = LoginEvent {
            subject: "user@example.com".to_string(),
            source_addr: "10.0.0.5".parse().unwrap(),
            user_agent: "ua".to_string(),
            timestamp: 1700000000,
            outcome: Outcome::Failure,
        };
        Alert::from_detection(
            Detection {
                kind: DetectorKind::BruteForce,
                severity,
                summary: "test alert".to_string(),
                evidence: serde_json::json!({}),
            },
            &event,
        )
    }

    #[tokio::test]
    async fn test_dashboard_receives_alert() {
        let (tx, mut rx) = DashboardQueue::channel();
        let fanout = NotificationFanout::new(Some(DashboardQueue::new(tx)), None);

        fanout.publish(&test_alert(Severity::Critical)).await;

        let received = rx.recv().await.expect("alert should arrive");
        assert_eq!(received.summary, "test alert");
    }

    #[tokio::test]
    async fn test_publish_without_sinks_is_fine() {
        let fanout = NotificationFanout::new(None, None);
        fanout.publish(&test_alert(Severity::High)).await;
    }

    #[tokio::test]
    async fn test_closed_dashboard_does_not_fail_publish() {
        let (tx, rx) = DashboardQueue::channel();
        drop(rx);
        let queue = DashboardQueue::new(tx);
        assert!(queue.is_closed());

        let fanout = NotificationFanout::new(Some(queue), None);
        fanout.publish(&test_alert(Severity::High)).await;
    }

    #[tokio::test]
    async fn test_siem_severity_filter() {
        // Exporter pointing nowhere: a filtered alert must short-circuit
        // before any request is attempted.
        let exporter = SiemExporter::new(
            "http://127.0.0.1:9/siem".to_string(),
            Severity::High,
            1,
        );
        let result = exporter.export(&test_alert(Severity::Low)).await;
        assert!(result.is_ok());
    }
}
