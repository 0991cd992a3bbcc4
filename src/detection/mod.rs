//! Detector bank
//!
//! Seven independent heuristics evaluated per login event. Each detector
//! reads the subject's behavior model and emits at most one detection; a
//! single event may trigger several detectors at once. A failing detector
//! is isolated: the others still run.

pub mod behavior_change;
pub mod brute_force;
pub mod failed_attempts;
pub mod multi_device;
pub mod simultaneous;
pub mod unusual_hour;
pub mod unusual_location;

pub use behavior_change::BehaviorChangeDetector;
pub use brute_force::BruteForceDetector;
pub use failed_attempts::FailedAttemptsDetector;
pub use multi_device::MultiDeviceDetector;
pub use simultaneous::SimultaneousLoginsDetector;
pub use unusual_hour::UnusualHourDetector;
pub use unusual_location::UnusualLocationDetector;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

use crate::behavior::BehaviorModel;
use crate::config::DetectionConfig;
use crate::geolocation::GeoProvider;
use crate::models::{Detection, DetectorKind, LoginEvent};

/// Errors raised while running a single detector
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector {kind} failed while evaluating event for '{subject}'")]
    Failed { kind: DetectorKind, subject: String },
}

/// A pure per-event heuristic
///
/// Detectors never mutate the model; the store has already applied the
/// current event before evaluation, so the newest history entry is the
/// event itself and pre-update state is reachable through the model's
/// `previous_login`-style accessors.
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;
    fn evaluate(&self, event: &LoginEvent, model: &BehaviorModel) -> Option<Detection>;
}

/// The full set of enabled detectors
pub struct DetectorBank {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorBank {
    /// Build the bank from configuration
    ///
    /// Detectors needing geolocation receive the shared provider; they
    /// degrade gracefully when it is absent.
    pub fn from_config(config: &DetectionConfig, geo: Option<Arc<dyn GeoProvider>>) -> Self {
        let mut detectors: Vec<Box<dyn Detector>> = Vec::new();

        if config.unusual_hour.enabled {
            detectors.push(Box::new(UnusualHourDetector::new(config.unusual_hour.clone())));
        }
        if config.unusual_location.enabled {
            detectors.push(Box::new(UnusualLocationDetector::new(
                config.unusual_location.clone(),
                geo.clone(),
            )));
        }
        if config.multi_device.enabled {
            detectors.push(Box::new(MultiDeviceDetector::new(config.multi_device.clone())));
        }
        if config.failed_attempts.enabled {
            detectors.push(Box::new(FailedAttemptsDetector::new(
                config.failed_attempts.clone(),
            )));
        }
        if config.brute_force.enabled {
            detectors.push(Box::new(BruteForceDetector::new(config.brute_force.clone())));
        }
        if config.behavior_change.enabled {
            detectors.push(Box::new(BehaviorChangeDetector::new(
                config.behavior_change.clone(),
            )));
        }
        if config.simultaneous.enabled {
            detectors.push(Box::new(SimultaneousLoginsDetector::new(
                config.simultaneous.clone(),
                geo,
            )));
        }

        DetectorBank { detectors }
    }

    /// Run every detector against one event
    ///
    /// A detector that panics is logged and skipped; the remaining
    /// detectors still run and their detections are returned.
    pub fn evaluate(&self, event: &LoginEvent, model: &BehaviorModel) -> Vec<Detection> {
        let mut detections = Vec::new();
        for detector in &self.detectors {
            let result =
                std::panic::catch_unwind(AssertUnwindSafe(|| detector.evaluate(event, model)));
            match result {
                Ok(Some(detection)) => detections.push(detection),
                Ok(None) => {}
                Err(_) => {
                    log::error!(
                        "{}",
                        DetectorError::Failed {
                            kind: detector.kind(),
                            subject: event.subject.clone(),
                        }
                    );
                }
            }
        }
        detections
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorModelStore;
    use crate::config::Config;
    use crate::models::Outcome;
    use test_support::login;

    #[test]
    fn test_bank_built_from_config() {
        let config = Config::default();
        let bank = DetectorBank::from_config(&config.detection, None);
        assert_eq!(bank.len(), 7);
    }

    #[test]
    fn test_disabled_detectors_excluded() {
        let mut config = Config::default();
        config.detection.brute_force.enabled = false;
        config.detection.unusual_hour.enabled = false;
        let bank = DetectorBank::from_config(&config.detection, None);
        assert_eq!(bank.len(), 5);
    }

    #[test]
    fn test_one_event_can_trigger_multiple_detectors() {
        let config = Config::default();
        let bank = DetectorBank::from_config(&config.detection, None);
        let mut store = BehaviorModelStore::new();

        // 12 rapid failures: exceeds both the failed-attempts and the
        // brute-force thresholds on the same event.
        let mut last = None;
        for i in 0..12 {
            let event = login("bob", 1700000000 + i, "1.1.1.1", "ua", Outcome::Failure);
            store.update(&event).unwrap();
            last = Some(event);
        }
        let event = last.unwrap();
        let model = store.get("bob").unwrap();
        let detections = bank.evaluate(&event, model);

        let kinds: Vec<_> = detections.iter().map(|d| d.kind).collect();
        assert!(kinds.contains(&crate::models::DetectorKind::MultipleFailedAttempts));
        assert!(kinds.contains(&crate::models::DetectorKind::BruteForce));
    }

    #[test]
    fn test_panicking_detector_is_isolated() {
        struct Panicking;
        impl Detector for Panicking {
            fn kind(&self) -> crate::models::DetectorKind {
                crate::models::DetectorKind::BehaviorChange
            }
            fn evaluate(
                &self,
                _event: &LoginEvent,
                _model: &crate::behavior::BehaviorModel,
            ) -> Option<crate::models::Detection> {
                panic!("boom");
            }
        }

        let config = Config::default();
        let mut bank = DetectorBank::from_config(&config.detection, None);
        bank.detectors.insert(0, Box::new(Panicking));

        let mut store = BehaviorModelStore::new();
        let mut last = None;
        for i in 0..12 {
            let event = login("bob", 1700000000 + i, "1.1.1.1", "ua", Outcome::Failure);
            store.update(&event).unwrap();
            last = Some(event);
        }
        let event = last.unwrap();
        let detections = bank.evaluate(&event, store.get("bob").unwrap());

        // The panicking detector emits nothing but the real ones still run
        assert!(detections
            .iter()
            .any(|d| d.kind == crate::models::DetectorKind::BruteForce));
    }
}
