//! Location-jump detection
//!
//! Flags a successful login from a new source address when the previous
//! login was recent and the two addresses resolve to locations far apart.
//! Without a geolocation provider (or for unresolvable addresses) the
//! check is skipped rather than guessed.

use std::sync::Arc;

use crate::behavior::BehaviorModel;
use crate::config::UnusualLocationConfig;
use crate::geolocation::{haversine_km, GeoProvider};
use crate::models::{Detection, DetectorKind, LoginEvent, Severity};

use super::Detector;

pub struct UnusualLocationDetector {
    config: UnusualLocationConfig,
    geo: Option<Arc<dyn GeoProvider>>,
}

impl UnusualLocationDetector {
    pub fn new(config: UnusualLocationConfig, geo: Option<Arc<dyn GeoProvider>>) -> Self {
        UnusualLocationDetector { config, geo }
    }
}

impl Detector for UnusualLocationDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::UnusualLocation
    }

    fn evaluate(&self, event: &LoginEvent, model: &BehaviorModel) -> Option<Detection> {
        if !event.is_success() {
            return None;
        }

        // Compare against the login before this one (pre-update state)
        let previous = model.previous_login()?;
        if previous.source_addr == event.source_addr {
            return None;
        }
        let gap = event.timestamp - previous.timestamp;
        if gap < 0 || gap > self.config.max_gap_hours * 3600 {
            return None;
        }

        let geo = match self.geo {
            Some(ref geo) => geo,
            None => {
                log::debug!("no geolocation provider configured, skipping location check");
                return None;
            }
        };
        let here = geo.locate(&event.source_addr)?;
        let there = geo.locate(&previous.source_addr)?;
        let distance_km = haversine_km(there, here);
        if distance_km < self.config.distance_threshold_km {
            return None;
        }

        let severity = if distance_km > 2.0 * self.config.distance_threshold_km {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(Detection {
            kind: self.kind(),
            severity,
            summary: format!(
                "'{}' logged in from {} only {:.1}h after a login from {}, {:.0} km away",
                event.subject,
                event.source_addr,
                gap as f64 / 3600.0,
                previous.source_addr,
                distance_km
            ),
            evidence: serde_json::json!({
                "previous_addr": previous.source_addr.to_string(),
                "distance_km": distance_km,
                "gap_secs": gap,
            }),
        })
    }
}
