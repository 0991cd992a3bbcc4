//! Core data model for the detection pipeline
//!
//! Login events come in from the authentication layer, detections are the
//! ephemeral output of the detector bank, and alerts are detections that
//! survived correlation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

/// Errors for malformed ingest payloads
///
/// Events failing validation are rejected before they reach the behavior
/// model store; they are logged but never modeled.
#[derive(Error, Debug)]
pub enum InvalidEventError {
    #[error("event has no subject")]
    MissingSubject,

    #[error("subject '{0}' is not a valid account identifier")]
    MalformedSubject(String),

    #[error("user agent string is empty")]
    MissingUserAgent,

    #[error("timestamp {0} is not a valid unix time")]
    InvalidTimestamp(i64),
}

/// Outcome of a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// A single login attempt reported by the authentication layer
///
/// Immutable fact; consumed exactly once by the pipeline. Timestamps are
/// unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginEvent {
    pub subject: String,
    pub source_addr: IpAddr,
    pub user_agent: String,
    pub timestamp: i64,
    pub outcome: Outcome,
}

fn subject_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    // Account identifiers are email-like or plain usernames; reject
    // whitespace and control characters outright.
    PATTERN.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9._%+@-]{1,254}$").unwrap())
}

impl LoginEvent {
    /// Validate the event before it is modeled
    pub fn validate(&self) -> Result<(), InvalidEventError> {
        if self.subject.is_empty() {
            return Err(InvalidEventError::MissingSubject);
        }
        if !subject_pattern().is_match(&self.subject) {
            return Err(InvalidEventError::MalformedSubject(self.subject.clone()));
        }
        if self.user_agent.is_empty() {
            return Err(InvalidEventError::MissingUserAgent);
        }
        if self.timestamp < 0 {
            return Err(InvalidEventError::InvalidTimestamp(self.timestamp));
        }
        Ok(())
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Failure
    }
}

/// Alert severity, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// The closed set of detector types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectorKind {
    #[serde(rename = "unusual_hour")]
    UnusualHour,
    #[serde(rename = "unusual_location")]
    UnusualLocation,
    #[serde(rename = "multi_device_login")]
    MultiDeviceLogin,
    #[serde(rename = "multiple_failed_attempts")]
    MultipleFailedAttempts,
    #[serde(rename = "brute_force_attempt")]
    BruteForce,
    #[serde(rename = "behavior_change")]
    BehaviorChange,
    #[serde(rename = "simultaneous_logins")]
    SimultaneousLogins,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::UnusualHour => "unusual_hour",
            DetectorKind::UnusualLocation => "unusual_location",
            DetectorKind::MultiDeviceLogin => "multi_device_login",
            DetectorKind::MultipleFailedAttempts => "multiple_failed_attempts",
            DetectorKind::BruteForce => "brute_force_attempt",
            DetectorKind::BehaviorChange => "behavior_change",
            DetectorKind::SimultaneousLogins => "simultaneous_logins",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unusual_hour" => Ok(DetectorKind::UnusualHour),
            "unusual_location" => Ok(DetectorKind::UnusualLocation),
            "multi_device_login" => Ok(DetectorKind::MultiDeviceLogin),
            "multiple_failed_attempts" => Ok(DetectorKind::MultipleFailedAttempts),
            "brute_force_attempt" => Ok(DetectorKind::BruteForce),
            "behavior_change" => Ok(DetectorKind::BehaviorChange),
            "simultaneous_logins" => Ok(DetectorKind::SimultaneousLogins),
            other => Err(format!("unknown detector kind '{}'", other)),
        }
    }
}

/// A raw detection emitted by one detector for one event
///
/// Ephemeral; consumed immediately by the correlator and never persisted
/// as a first-class entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub kind: DetectorKind,
    pub severity: Severity,
    pub summary: String,
    pub evidence: serde_json::Value,
}

/// Side-effect categories the dispatcher can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    BlockAddress,
    InvalidateSessions,
    RequireVerification,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::BlockAddress => "block_address",
            ActionKind::InvalidateSessions => "invalidate_sessions",
            ActionKind::RequireVerification => "require_verification",
        };
        f.write_str(s)
    }
}

/// Record of one action taken (or attempted) for an alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: ActionKind,
    pub succeeded: bool,
    pub detail: String,
    pub timestamp: i64,
}

/// Alert lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(format!("unknown alert status '{}'", other)),
        }
    }
}

/// A detection that survived throttling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub subject: String,
    pub source_addr: IpAddr,
    pub kind: DetectorKind,
    pub severity: Severity,
    pub summary: String,
    pub evidence: serde_json::Value,
    pub status: AlertStatus,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
    pub resolution: Option<String>,
    pub actions: Vec<ActionRecord>,
    /// Number of suppressed duplicate detections folded into this alert
    pub repeat_count: u32,
}

impl Alert {
    /// Build a fresh active alert from a detection and its triggering event
    pub fn from_detection(detection: Detection, event: &LoginEvent) -> Self {
        Alert {
            id: Uuid::new_v4(),
            subject: event.subject.clone(),
            source_addr: event.source_addr,
            kind: detection.kind,
            severity: detection.severity,
            summary: detection.summary,
            evidence: detection.evidence,
            status: AlertStatus::Active,
            created_at: event.timestamp,
            resolved_at: None,
            resolution: None,
            actions: Vec::new(),
            repeat_count: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}
