//! Night-window login detection
//!
//! Flags logins landing in the configured night window when the subject
//! rarely logs in at that hour. Subjects with too little history never
//! trigger (cold-start guard).

use crate::behavior::{hour_of, BehaviorModel};
use crate::config::UnusualHourConfig;
use crate::models::{Detection, DetectorKind, LoginEvent, Severity};

use super::Detector;

pub struct UnusualHourDetector {
    config: UnusualHourConfig,
}

impl UnusualHourDetector {
    pub fn new(config: UnusualHourConfig) -> Self {
        UnusualHourDetector { config }
    }

    fn in_night_window(&self, hour: u32) -> bool {
        let start = self.config.night_start_hour % 24;
        let end = self.config.night_end_hour % 24;
        if start < end {
            hour >= start && hour < end
        } else {
            // Window wraps midnight, e.g. 22:00-06:00
            hour >= start || hour < end
        }
    }
}

impl Detector for UnusualHourDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::UnusualHour
    }

    fn evaluate(&self, event: &LoginEvent, model: &BehaviorModel) -> Option<Detection> {
        let hour = hour_of(event.timestamp);
        if !self.in_night_window(hour) {
            return None;
        }

        // Distribution excludes the current event; the store already
        // counted it, so subtract it back out.
        let historical = model.total_login_count().saturating_sub(1);
        if historical < self.config.min_history {
            return None;
        }
        let hour_hits = model.hour_count(hour).saturating_sub(1);
        let share = hour_hits as f64 / historical as f64;
        if share >= self.config.rare_share {
            return None;
        }

        let severity = if share < self.config.very_rare_share {
            Severity::Medium
        } else {
            Severity::Low
        };

        Some(Detection {
            kind: self.kind(),
            severity,
            summary: format!(
                "Login for '{}' at {:02}:00 UTC, an hour covering {:.1}% of their {} prior logins",
                event.subject,
                hour,
                share * 100.0,
                historical
            ),
            evidence: serde_json::json!({
                "hour": hour,
                "hour_share": share,
                "historical_logins": historical,
            }),
        })
    }
}
