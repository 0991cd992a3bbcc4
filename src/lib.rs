//! Tech Shield: suspicious-login detection service
//!
//! Ingests login events from an authentication layer, maintains a
//! per-subject behavior model, runs a bank of anomaly detectors over
//! each event, correlates surviving detections into throttled alerts,
//! dispatches containment actions to external collaborators, and fans
//! alerts out to notification sinks. State lives in memory with
//! optional SQLite persistence.

pub mod api;
pub mod behavior;
pub mod config;
pub mod correlation;
pub mod detection;
pub mod dispatch;
pub mod geolocation;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod pipeline;

pub use config::Config;
pub use models::{Alert, Detection, DetectorKind, LoginEvent, Outcome, Severity};
pub use pipeline::Pipeline;
