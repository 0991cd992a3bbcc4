//! Aggregate behavior-change scoring
//!
//! Composite anomaly score over several weak signals: unfamiliar hour,
//! unfamiliar day of week, new or rarely used device, new or rarely used
//! source address. The score is scaled by the configured sensitivity and
//! compared against a threshold. Scoring only starts once the model has
//! enough records and has aged past the learning period.

use crate::behavior::{day_of, hour_of, BehaviorModel};
use crate::config::BehaviorChangeConfig;
use crate::models::{Detection, DetectorKind, LoginEvent, Severity};

use super::Detector;

/// Hour/day share below which the slot counts as unfamiliar
const UNFAMILIAR_SHARE: f64 = 0.05;
/// Usage count at or below which a device/address counts as rare
const RARE_USE_COUNT: u32 = 3;

pub struct BehaviorChangeDetector {
    config: BehaviorChangeConfig,
}

impl BehaviorChangeDetector {
    pub fn new(config: BehaviorChangeConfig) -> Self {
        BehaviorChangeDetector { config }
    }
}

impl Detector for BehaviorChangeDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::BehaviorChange
    }

    fn evaluate(&self, event: &LoginEvent, model: &BehaviorModel) -> Option<Detection> {
        // Learning-period gates: too little history means no baseline to
        // deviate from.
        let historical = model.retained_login_count().saturating_sub(1);
        if historical < self.config.min_records {
            return None;
        }
        if model.age_secs(event.timestamp) < self.config.min_model_age_days * 86400 {
            return None;
        }

        let total = model.total_login_count().saturating_sub(1).max(1);
        let mut score = 0.0f64;
        let mut factors: Vec<&str> = Vec::new();

        let hour = hour_of(event.timestamp);
        let hour_share = model.hour_count(hour).saturating_sub(1) as f64 / total as f64;
        if hour_share < UNFAMILIAR_SHARE {
            score += 0.3;
            factors.push("unfamiliar_hour");
        }

        let day = day_of(event.timestamp);
        let day_share = model.day_count(day).saturating_sub(1) as f64 / total as f64;
        if day_share < UNFAMILIAR_SHARE {
            score += 0.2;
            factors.push("unfamiliar_day");
        }

        // The store already counted the current event, so a count of 1
        // means the device/address was never seen before it.
        match model.agent_stats(&event.user_agent).map(|s| s.count) {
            Some(1) | None => {
                score += 0.3;
                factors.push("new_device");
            }
            Some(n) if n <= RARE_USE_COUNT => {
                score += 0.2;
                factors.push("rare_device");
            }
            _ => {}
        }
        match model.address_stats(&event.source_addr).map(|s| s.count) {
            Some(1) | None => {
                score += 0.3;
                factors.push("new_address");
            }
            Some(n) if n <= RARE_USE_COUNT => {
                score += 0.2;
                factors.push("rare_address");
            }
            _ => {}
        }

        let score = (score * self.config.sensitivity.factor()).min(1.0);
        if score < self.config.score_threshold {
            return None;
        }

        let severity = if score > 0.9 {
            Severity::High
        } else if score > 0.7 {
            Severity::Medium
        } else {
            Severity::Low
        };

        Some(Detection {
            kind: self.kind(),
            severity,
            summary: format!(
                "Login for '{}' deviates from learned behavior (score {:.2}: {})",
                event.subject,
                score,
                factors.join(", ")
            ),
            evidence: serde_json::json!({
                "score": score,
                "factors": factors,
                "historical_logins": historical,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorModelStore;
    use crate::config::{Config, Sensitivity};
    use crate::detection::test_support::success;

    // 1700000000 is Tue 22:13 UTC. The baseline below logs in every
    // weekday at 10:13 from one address and device, for 30 days.
    const NOW: i64 = 1700000000;

    fn baseline_store(subject: &str) -> BehaviorModelStore {
        let mut store = BehaviorModelStore::new();
        for i in 0..30 {
            let ts = NOW - 12 * 3600 - (30 - i) * 86400;
            store
                .update(&success(subject, ts, "1.1.1.1", "firefox"))
                .unwrap();
        }
        store
    }

    fn detector() -> BehaviorChangeDetector {
        BehaviorChangeDetector::new(Config::default().detection.behavior_change)
    }

    #[test]
    fn test_everything_new_fires_high() {
        let mut store = baseline_store("alice");
        // Night hour, new device, new address
        let event = success("alice", NOW, "8.8.8.8", "curl/8.0");
        store.update(&event).unwrap();

        let detection = detector()
            .evaluate(&event, store.get("alice").unwrap())
            .expect("should fire when everything deviates");
        // unfamiliar hour 0.3 + new device 0.3 + new address 0.3 = 0.9
        assert!(detection.severity >= Severity::Medium);
        let factors = detection.evidence["factors"].as_array().unwrap();
        assert!(factors.iter().any(|f| f == "unfamiliar_hour"));
        assert!(factors.iter().any(|f| f == "new_device"));
        assert!(factors.iter().any(|f| f == "new_address"));
    }

    #[test]
    fn test_familiar_login_not_flagged() {
        let mut store = baseline_store("alice");
        // Usual hour, usual device, usual address (a day later)
        let event = success("alice", NOW - 12 * 3600 + 86400, "1.1.1.1", "firefox");
        store.update(&event).unwrap();

        assert!(detector().evaluate(&event, store.get("alice").unwrap()).is_none());
    }

    #[test]
    fn test_too_few_records_never_fires() {
        let mut store = BehaviorModelStore::new();
        for i in 0..10 {
            store
                .update(&success("bob", NOW - (30 - i) * 86400, "1.1.1.1", "firefox"))
                .unwrap();
        }
        let event = success("bob", NOW, "8.8.8.8", "curl/8.0");
        store.update(&event).unwrap();

        assert!(detector().evaluate(&event, store.get("bob").unwrap()).is_none());
    }

    #[test]
    fn test_young_model_never_fires() {
        // Plenty of records but the model is only 2 days old
        let mut store = BehaviorModelStore::new();
        for i in 0..40 {
            store
                .update(&success("carol", NOW - 2 * 86400 + i * 3600, "1.1.1.1", "firefox"))
                .unwrap();
        }
        let event = success("carol", NOW, "8.8.8.8", "curl/8.0");
        store.update(&event).unwrap();

        assert!(detector().evaluate(&event, store.get("carol").unwrap()).is_none());
    }

    #[test]
    fn test_low_sensitivity_dampens_score() {
        let mut config = Config::default().detection.behavior_change;
        config.sensitivity = Sensitivity::Low;
        let detector = BehaviorChangeDetector::new(config);

        let mut store = baseline_store("alice");
        let event = success("alice", NOW, "8.8.8.8", "curl/8.0");
        store.update(&event).unwrap();

        // Raw 0.9 scaled by 0.8 = 0.72, below the 0.8 threshold
        assert!(detector.evaluate(&event, store.get("alice").unwrap()).is_none());
    }

    #[test]
    fn test_high_sensitivity_escalates() {
        let mut config = Config::default().detection.behavior_change;
        config.sensitivity = Sensitivity::High;
        let detector = BehaviorChangeDetector::new(config);

        let mut store = baseline_store("alice");
        let event = success("alice", NOW, "8.8.8.8", "curl/8.0");
        store.update(&event).unwrap();

        let detection = detector
            .evaluate(&event, store.get("alice").unwrap())
            .expect("should fire");
        // 0.9 * 1.2 clamps to 1.0
        assert_eq!(detection.severity, Severity::High);
    }
}
