//! Near-simultaneous login detection
//!
//! Flags a successful login when another success for the same subject
//! happened within the window from a different source address. With the
//! different-location policy enabled, a pair of addresses that resolve far
//! apart (or cannot be resolved at all) escalates to high severity.

use std::sync::Arc;

use crate::behavior::BehaviorModel;
use crate::config::SimultaneousConfig;
use crate::geolocation::{haversine_km, GeoProvider};
use crate::models::{Detection, DetectorKind, LoginEvent, Severity};

use super::Detector;

pub struct SimultaneousLoginsDetector {
    config: SimultaneousConfig,
    geo: Option<Arc<dyn GeoProvider>>,
}

impl SimultaneousLoginsDetector {
    pub fn new(config: SimultaneousConfig, geo: Option<Arc<dyn GeoProvider>>) -> Self {
        SimultaneousLoginsDetector { config, geo }
    }

    fn same_location(&self, event: &LoginEvent, other: &std::net::IpAddr) -> bool {
        let geo = match self.geo {
            Some(ref geo) => geo,
            None => return false,
        };
        match (geo.locate(&event.source_addr), geo.locate(other)) {
            (Some(here), Some(there)) => {
                haversine_km(here, there) < self.config.location_radius_km
            }
            // Unresolvable addresses are treated as distinct locations
            _ => false,
        }
    }
}

impl Detector for SimultaneousLoginsDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::SimultaneousLogins
    }

    fn evaluate(&self, event: &LoginEvent, model: &BehaviorModel) -> Option<Detection> {
        if !event.is_success() {
            return None;
        }

        let window = self.config.window_minutes * 60;
        // The current success shares the event's address, so scanning for
        // a different address naturally excludes it.
        let other = model.successes().find(|r| {
            r.source_addr != event.source_addr && (r.timestamp - event.timestamp).abs() <= window
        })?;

        let severity = if self.config.different_location_policy
            && !self.same_location(event, &other.source_addr)
        {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(Detection {
            kind: self.kind(),
            severity,
            summary: format!(
                "'{}' logged in from {} and {} within {} minutes",
                event.subject, other.source_addr, event.source_addr, self.config.window_minutes
            ),
            evidence: serde_json::json!({
                "other_addr": other.source_addr.to_string(),
                "gap_secs": (event.timestamp - other.timestamp).abs(),
            }),
        })
    }
}
