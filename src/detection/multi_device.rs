//! Multi-device burst detection
//!
//! Flags a successful login when too many distinct user agents have logged
//! the subject in within the trailing window, current device included.

use std::collections::HashSet;

use crate::behavior::BehaviorModel;
use crate::config::MultiDeviceConfig;
use crate::models::{Detection, DetectorKind, LoginEvent, Severity};

use super::Detector;

pub struct MultiDeviceDetector {
    config: MultiDeviceConfig,
}

impl MultiDeviceDetector {
    pub fn new(config: MultiDeviceConfig) -> Self {
        MultiDeviceDetector { config }
    }
}

impl Detector for MultiDeviceDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::MultiDeviceLogin
    }

    fn evaluate(&self, event: &LoginEvent, model: &BehaviorModel) -> Option<Detection> {
        if !event.is_success() {
            return None;
        }

        let cutoff = event.timestamp - self.config.window_minutes * 60;
        // The store already recorded the current success, so the current
        // device is part of the window.
        let devices: HashSet<&str> = model
            .successes()
            .filter(|r| r.timestamp >= cutoff && r.timestamp <= event.timestamp)
            .map(|r| r.user_agent.as_str())
            .collect();

        if devices.len() < self.config.device_threshold {
            return None;
        }

        let severity = if devices.len() > self.config.device_threshold + 1 {
            Severity::High
        } else {
            Severity::Medium
        };

        let mut device_list: Vec<&str> = devices.into_iter().collect();
        device_list.sort_unstable();

        Some(Detection {
            kind: self.kind(),
            severity,
            summary: format!(
                "'{}' logged in from {} distinct devices within {} minutes",
                event.subject,
                device_list.len(),
                self.config.window_minutes
            ),
            evidence: serde_json::json!({
                "device_count": device_list.len(),
                "devices": device_list,
                "window_minutes": self.config.window_minutes,
            }),
        })
    }
}
