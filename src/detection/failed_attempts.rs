//! Repeated-failure detection
//!
//! Counts failures for the subject in a trailing window (default 15
//! minutes, threshold 5) and escalates severity as the count grows. A
//! failure fires only once the window already held the threshold before
//! it arrived, so the evidence count starts at threshold+1; the
//! dispatcher uses that count to size the progressive block.

use crate::behavior::BehaviorModel;
use crate::config::FailedAttemptsConfig;
use crate::models::{Detection, DetectorKind, LoginEvent, Severity};

use super::Detector;

pub struct FailedAttemptsDetector {
    config: FailedAttemptsConfig,
}

impl FailedAttemptsDetector {
    pub fn new(config: FailedAttemptsConfig) -> Self {
        FailedAttemptsDetector { config }
    }

    fn severity_for(&self, count: usize) -> Severity {
        let threshold = self.config.failure_threshold;
        if count >= 2 * threshold {
            Severity::Critical
        } else if count as f64 >= 1.5 * threshold as f64 {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

impl Detector for FailedAttemptsDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::MultipleFailedAttempts
    }

    fn evaluate(&self, event: &LoginEvent, model: &BehaviorModel) -> Option<Detection> {
        if !event.is_failure() {
            return None;
        }

        let cutoff = event.timestamp - self.config.window_minutes * 60;
        let count = model.failures_since(cutoff);
        // The model already holds the current failure; the prior window
        // must have reached the threshold on its own.
        if count.saturating_sub(1) < self.config.failure_threshold {
            return None;
        }

        Some(Detection {
            kind: self.kind(),
            severity: self.severity_for(count),
            summary: format!(
                "{} failed logins for '{}' within {} minutes (threshold {})",
                count, event.subject, self.config.window_minutes, self.config.failure_threshold
            ),
            evidence: serde_json::json!({
                "failure_count": count,
                "window_minutes": self.config.window_minutes,
            }),
        })
    }
}
