//! Alert correlation
//!
//! Deduplicates near-duplicate detections per (subject, detector kind)
//! within a throttle window, owns the active alert set, and handles
//! resolution. A periodic sweep bounds the recent-record map.

use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ActionRecord, Alert, AlertStatus, Detection, DetectorKind, LoginEvent, Severity,
};

/// Errors for alert lifecycle operations
#[derive(Error, Debug)]
pub enum CorrelationError {
    #[error("no active alert with id {0}")]
    UnknownAlert(Uuid),
}

/// Short-lived record supporting throttling; purged after the retention
/// window by the sweep
#[derive(Debug, Clone)]
struct RecentAlertRecord {
    alert_id: Uuid,
    severity: Severity,
    timestamp: i64,
}

/// Outcome of correlating one detection
#[derive(Debug)]
pub enum Correlated {
    /// A new alert was created and should be dispatched
    Fresh(Alert),
    /// A duplicate within the throttle window; folded into an existing
    /// alert when it is still active
    Suppressed { existing: Option<Uuid> },
}

pub struct AlertCorrelator {
    throttle_secs: i64,
    retention_secs: i64,
    recent: HashMap<(String, DetectorKind), RecentAlertRecord>,
    active: HashMap<Uuid, Alert>,
}

impl AlertCorrelator {
    pub fn new(throttle_secs: i64, retention_secs: i64) -> Self {
        AlertCorrelator {
            throttle_secs,
            retention_secs,
            recent: HashMap::new(),
            active: HashMap::new(),
        }
    }

    /// Throttle-or-admit one detection
    pub fn correlate(&mut self, detection: Detection, event: &LoginEvent) -> Correlated {
        let key = (event.subject.clone(), detection.kind);

        if let Some(record) = self.recent.get(&key) {
            if event.timestamp - record.timestamp < self.throttle_secs {
                let existing = match self.active.get_mut(&record.alert_id) {
                    Some(alert) => {
                        alert.repeat_count += 1;
                        log::debug!(
                            "suppressed duplicate {} detection for '{}' (alert {}, {} repeats)",
                            detection.kind,
                            event.subject,
                            alert.id,
                            alert.repeat_count
                        );
                        Some(alert.id)
                    }
                    None => {
                        log::debug!(
                            "suppressed {} detection for '{}'; prior {} alert already resolved",
                            detection.kind,
                            event.subject,
                            record.severity
                        );
                        None
                    }
                };
                return Correlated::Suppressed { existing };
            }
        }

        let alert = Alert::from_detection(detection, event);
        self.recent.insert(
            key,
            RecentAlertRecord {
                alert_id: alert.id,
                severity: alert.severity,
                timestamp: event.timestamp,
            },
        );
        self.active.insert(alert.id, alert.clone());
        log::info!(
            "alert {} created: {} for '{}' ({})",
            alert.id,
            alert.kind,
            alert.subject,
            alert.severity
        );
        Correlated::Fresh(alert)
    }

    /// Readmit a previously created alert into the active set
    ///
    /// Used on startup to restore alerts persisted as active by an
    /// earlier run, so they can be resolved and queried like any other.
    /// Does not touch the recent-record map; throttling starts fresh.
    pub fn admit(&mut self, alert: Alert) {
        if alert.status == AlertStatus::Active {
            self.active.insert(alert.id, alert);
        }
    }

    /// Append dispatched action records to an active alert
    pub fn append_actions(&mut self, id: Uuid, actions: &[ActionRecord]) {
        if let Some(alert) = self.active.get_mut(&id) {
            alert.actions.extend_from_slice(actions);
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&Alert> {
        self.active.get(&id)
    }

    /// Snapshot of an active alert (e.g. after a repeat-count bump)
    pub fn snapshot(&self, id: Uuid) -> Option<Alert> {
        self.active.get(&id).cloned()
    }

    /// Resolve an active alert, removing it from the active set
    pub fn resolve(
        &mut self,
        id: Uuid,
        resolution: &str,
        now: i64,
    ) -> Result<Alert, CorrelationError> {
        let mut alert = self
            .active
            .remove(&id)
            .ok_or(CorrelationError::UnknownAlert(id))?;
        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(now);
        alert.resolution = Some(resolution.to_string());
        log::info!(
            "alert {} resolved for '{}': {}",
            alert.id,
            alert.subject,
            resolution
        );
        Ok(alert)
    }

    /// All currently active alerts, newest first
    pub fn active_alerts(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.active.values().cloned().collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Evict recent-alert records older than the retention window
    ///
    /// Maintenance only; bounds memory but is not correctness-critical.
    /// Safe to run repeatedly.
    pub fn sweep(&mut self, now: i64) -> usize {
        let before = self.recent.len();
        let retention = self.retention_secs;
        self.recent
            .retain(|_, record| now - record.timestamp < retention);
        before - self.recent.len()
    }

    #[cfg(test)]
    fn recent_len(&self) -> usize {
        self.recent.len()
    }

    #[cfg(test)]
    fn recent_severity(&self, subject: &str, kind: DetectorKind) -> Option<Severity> {
        self.recent
            .get(&(subject.to_string(), kind))
            .map(|r| r.severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LoginEvent, Outcome};

    fn correlator() -> AlertCorrelator {
        AlertCorrelator::new(15 * 60, 24 * 3600)
    }

    fn event(subject: &str, ts: i64) -> LoginEvent {
        LoginEvent {
            subject: subject.to_string(),
            source_addr: "1.1.1.1".parse().unwrap(),
            user_agent: "ua".to_string(),
            timestamp: ts,
            outcome: Outcome::Failure,
        }
    }

    fn detection(kind: DetectorKind) -> Detection {
        Detection {
            kind,
            severity: Severity::High,
            summary: "test".to_string(),
            evidence: serde_json::json!({}),
        }
    }

    #[test]
    fn test_first_detection_creates_alert() {
        let mut c = correlator();
        let result = c.correlate(detection(DetectorKind::BruteForce), &event("alice", 1000));
        assert!(matches!(result, Correlated::Fresh(_)));
        assert_eq!(c.active_count(), 1);
    }

    #[test]
    fn test_duplicate_within_window_suppressed() {
        let mut c = correlator();
        let first = c.correlate(detection(DetectorKind::BruteForce), &event("alice", 1000));
        let Correlated::Fresh(alert) = first else {
            panic!("expected fresh alert");
        };

        // One minute later: suppressed, folded into the existing alert
        let second = c.correlate(detection(DetectorKind::BruteForce), &event("alice", 1060));
        match second {
            Correlated::Suppressed { existing } => assert_eq!(existing, Some(alert.id)),
            other => panic!("expected suppression, got {:?}", other),
        }
        assert_eq!(c.active_count(), 1);
        assert_eq!(c.get(alert.id).unwrap().repeat_count, 1);
    }

    #[test]
    fn test_admitted_alert_is_resolvable() {
        let mut c = correlator();
        let Correlated::Fresh(alert) =
            c.correlate(detection(DetectorKind::BruteForce), &event("alice", 1000))
        else {
            panic!("expected fresh alert");
        };

        // A fresh correlator (as after a restart) readmits the alert
        let mut restarted = correlator();
        restarted.admit(alert.clone());
        assert_eq!(restarted.active_count(), 1);

        let resolved = restarted.resolve(alert.id, "handled", 2000).unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(restarted.active_count(), 0);
    }

    #[test]
    fn test_admit_ignores_resolved_alerts() {
        let mut c = correlator();
        let Correlated::Fresh(alert) =
            c.correlate(detection(DetectorKind::BruteForce), &event("alice", 1000))
        else {
            panic!("expected fresh alert");
        };
        let resolved = c.resolve(alert.id, "handled", 2000).unwrap();

        let mut restarted = correlator();
        restarted.admit(resolved);
        assert_eq!(restarted.active_count(), 0);
    }

    #[test]
    fn test_after_window_new_alert() {
        let mut c = correlator();
        c.correlate(detection(DetectorKind::BruteForce), &event("alice", 1000));
        let result = c.correlate(
            detection(DetectorKind::BruteForce),
            &event("alice", 1000 + 15 * 60),
        );
        assert!(matches!(result, Correlated::Fresh(_)));
        assert_eq!(c.active_count(), 2);
    }

    #[test]
    fn test_different_kinds_not_throttled_together() {
        let mut c = correlator();
        c.correlate(detection(DetectorKind::BruteForce), &event("alice", 1000));
        let result = c.correlate(
            detection(DetectorKind::MultipleFailedAttempts),
            &event("alice", 1010),
        );
        assert!(matches!(result, Correlated::Fresh(_)));
    }

    #[test]
    fn test_different_subjects_not_throttled_together() {
        let mut c = correlator();
        c.correlate(detection(DetectorKind::BruteForce), &event("alice", 1000));
        let result = c.correlate(detection(DetectorKind::BruteForce), &event("bob", 1010));
        assert!(matches!(result, Correlated::Fresh(_)));
    }

    #[test]
    fn test_resolve_removes_from_active_set() {
        let mut c = correlator();
        let Correlated::Fresh(alert) =
            c.correlate(detection(DetectorKind::BruteForce), &event("alice", 1000))
        else {
            panic!("expected fresh alert");
        };

        let resolved = c.resolve(alert.id, "confirmed benign", 2000).unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.resolved_at, Some(2000));
        assert_eq!(resolved.resolution.as_deref(), Some("confirmed benign"));
        assert_eq!(c.active_count(), 0);
    }

    #[test]
    fn test_resolve_unknown_alert_fails() {
        let mut c = correlator();
        assert!(c.resolve(Uuid::new_v4(), "n/a", 0).is_err());
    }

    #[test]
    fn test_suppression_after_resolve_has_no_target() {
        let mut c = correlator();
        let Correlated::Fresh(alert) =
            c.correlate(detection(DetectorKind::BruteForce), &event("alice", 1000))
        else {
            panic!("expected fresh alert");
        };
        c.resolve(alert.id, "done", 1030).unwrap();

        // Still within the throttle window: suppressed, but nothing to bump
        let result = c.correlate(detection(DetectorKind::BruteForce), &event("alice", 1060));
        match result {
            Correlated::Suppressed { existing } => assert!(existing.is_none()),
            other => panic!("expected suppression, got {:?}", other),
        }
    }

    #[test]
    fn test_append_actions() {
        let mut c = correlator();
        let Correlated::Fresh(alert) =
            c.correlate(detection(DetectorKind::BruteForce), &event("alice", 1000))
        else {
            panic!("expected fresh alert");
        };

        let record = ActionRecord {
            kind: crate::models::ActionKind::BlockAddress,
            succeeded: true,
            detail: "blocked for 60 min".to_string(),
            timestamp: 1001,
        };
        c.append_actions(alert.id, &[record]);
        assert_eq!(c.get(alert.id).unwrap().actions.len(), 1);
    }

    #[test]
    fn test_sweep_evicts_old_records() {
        let mut c = correlator();
        c.correlate(detection(DetectorKind::BruteForce), &event("alice", 1000));
        c.correlate(detection(DetectorKind::BruteForce), &event("bob", 80_000));
        assert_eq!(c.recent_len(), 2);

        let evicted = c.sweep(90_000);
        assert_eq!(evicted, 1);
        assert_eq!(c.recent_len(), 1);
        assert!(c
            .recent_severity("bob", DetectorKind::BruteForce)
            .is_some());

        // Idempotent
        assert_eq!(c.sweep(90_000), 0);
    }
}
