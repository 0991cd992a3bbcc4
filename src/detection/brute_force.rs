//! Brute-force detection
//!
//! A hard rate rule: 10 or more failures for one subject inside 60
//! seconds is always critical, no escalation ladder.

use crate::behavior::BehaviorModel;
use crate::config::BruteForceConfig;
use crate::models::{Detection, DetectorKind, LoginEvent, Severity};

use super::Detector;

pub struct BruteForceDetector {
    config: BruteForceConfig,
}

impl BruteForceDetector {
    pub fn new(config: BruteForceConfig) -> Self {
        BruteForceDetector { config }
    }
}

impl Detector for BruteForceDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::BruteForce
    }

    fn evaluate(&self, event: &LoginEvent, model: &BehaviorModel) -> Option<Detection> {
        if !event.is_failure() {
            return None;
        }

        let cutoff = event.timestamp - self.config.window_seconds;
        let count = model.failures_since(cutoff);
        if count < self.config.failure_threshold {
            return None;
        }

        Some(Detection {
            kind: self.kind(),
            severity: Severity::Critical,
            summary: format!(
                "{} failed logins for '{}' within {} seconds from {}",
                count, event.subject, self.config.window_seconds, event.source_addr
            ),
            evidence: serde_json::json!({
                "failure_count": count,
                "window_seconds": self.config.window_seconds,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorModelStore;
    use crate::config::Config;
    use crate::detection::test_support::failure;

    fn detector() -> BruteForceDetector {
        BruteForceDetector::new(Config::default().detection.brute_force)
    }

    fn run_failures(count: usize, spacing_secs: i64) -> Option<Detection> {
        let mut store = BehaviorModelStore::new();
        let mut last = None;
        for i in 0..count {
            let event = failure("alice", 1700000000 + i as i64 * spacing_secs, "1.1.1.1", "ua");
            store.update(&event).unwrap();
            last = Some(event);
        }
        let event = last.unwrap();
        detector().evaluate(&event, store.get("alice").unwrap())
    }

    #[test]
    fn test_nine_rapid_failures_not_flagged() {
        assert!(run_failures(9, 1).is_none());
    }

    #[test]
    fn test_ten_rapid_failures_is_critical() {
        let detection = run_failures(10, 1).expect("should fire");
        assert_eq!(detection.severity, Severity::Critical);
        assert_eq!(detection.kind, DetectorKind::BruteForce);
        assert_eq!(detection.evidence["failure_count"], 10);
    }

    #[test]
    fn test_many_failures_remain_critical() {
        let detection = run_failures(30, 1).expect("should fire");
        assert_eq!(detection.severity, Severity::Critical);
    }

    #[test]
    fn test_slow_failures_not_flagged() {
        // 10 failures spaced 10s apart span 90s; the 60s window holds 7
        assert!(run_failures(10, 10).is_none());
    }
}
