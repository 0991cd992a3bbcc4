use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::Severity;

/// Configuration for the Tech Shield daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP API configuration
    pub server: ServerConfig,
    /// Detector thresholds
    pub detection: DetectionConfig,
    /// Alert throttling configuration
    pub correlation: CorrelationConfig,
    /// Action dispatch configuration
    pub actions: ActionConfig,
    /// Notification sink configuration
    pub notify: NotifyConfig,
    /// Geolocation configuration
    pub geolocation: GeoConfig,
    /// Persistence configuration
    pub storage: StorageConfig,
    /// Background maintenance configuration
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API
    pub bind: String,
}

/// Per-detector thresholds; each detector can be disabled independently
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub unusual_hour: UnusualHourConfig,
    pub unusual_location: UnusualLocationConfig,
    pub multi_device: MultiDeviceConfig,
    pub failed_attempts: FailedAttemptsConfig,
    pub brute_force: BruteForceConfig,
    pub behavior_change: BehaviorChangeConfig,
    pub simultaneous: SimultaneousConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusualHourConfig {
    pub enabled: bool,
    /// Start of the night window, hour of day (inclusive)
    pub night_start_hour: u32,
    /// End of the night window, hour of day (exclusive)
    pub night_end_hour: u32,
    /// Minimum historical logins before the detector can fire
    pub min_history: u32,
    /// Hour share below which the login hour counts as unusual
    pub rare_share: f64,
    /// Hour share below which severity escalates to medium
    pub very_rare_share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusualLocationConfig {
    pub enabled: bool,
    /// Max gap since the previous login for the comparison to apply
    pub max_gap_hours: i64,
    /// Distance at or above which the jump is suspicious
    pub distance_threshold_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiDeviceConfig {
    pub enabled: bool,
    /// Trailing window over successful logins
    pub window_minutes: i64,
    /// Distinct user agents (current included) at which to fire
    pub device_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedAttemptsConfig {
    pub enabled: bool,
    pub window_minutes: i64,
    pub failure_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BruteForceConfig {
    pub enabled: bool,
    pub window_seconds: i64,
    pub failure_threshold: usize,
}

/// Sensitivity level scaling the composite behavior-change score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
}

impl Sensitivity {
    pub fn factor(&self) -> f64 {
        match self {
            Sensitivity::Low => 0.8,
            Sensitivity::Medium => 1.0,
            Sensitivity::High => 1.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorChangeConfig {
    pub enabled: bool,
    /// Minimum retained login records before scoring starts
    pub min_records: usize,
    /// Minimum model age before scoring starts (learning period)
    pub min_model_age_days: i64,
    /// Composite score at or above which a detection fires
    pub score_threshold: f64,
    pub sensitivity: Sensitivity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimultaneousConfig {
    pub enabled: bool,
    /// Half-width of the window for near-simultaneous successes
    pub window_minutes: i64,
    /// When set, a pair of addresses that resolve to distinct locations
    /// (or cannot be resolved at all) escalates severity to high
    pub different_location_policy: bool,
    /// Two addresses within this radius count as the same location
    pub location_radius_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Duplicate (subject, detector) detections within this window are
    /// suppressed
    pub throttle_minutes: i64,
    /// Recent-alert records older than this are swept
    pub retention_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Block duration for brute-force alerts
    pub base_block_minutes: u64,
    /// Timeout for each collaborator call
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// SIEM export webhook; no exporter is configured when absent
    pub siem_webhook_url: Option<String>,
    /// Minimum severity exported to the SIEM webhook
    pub siem_min_severity: Severity,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Path to a GeoLite2-City.mmdb file; distance-based checks are
    /// skipped when absent
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path; persistence is disabled when absent
    pub sqlite_path: Option<PathBuf>,
    /// Rows and behavior models older than this are purged
    pub retention_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Interval between maintenance sweeps
    pub interval_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                bind: "127.0.0.1:8080".to_string(),
            },
            detection: DetectionConfig {
                unusual_hour: UnusualHourConfig {
                    enabled: true,
                    night_start_hour: 22,
                    night_end_hour: 6,
                    min_history: 5,
                    rare_share: 0.10,
                    very_rare_share: 0.05,
                },
                unusual_location: UnusualLocationConfig {
                    enabled: true,
                    max_gap_hours: 24,
                    distance_threshold_km: 500.0,
                },
                multi_device: MultiDeviceConfig {
                    enabled: true,
                    window_minutes: 60,
                    device_threshold: 3,
                },
                failed_attempts: FailedAttemptsConfig {
                    enabled: true,
                    window_minutes: 15,
                    failure_threshold: 5,
                },
                brute_force: BruteForceConfig {
                    enabled: true,
                    window_seconds: 60,
                    failure_threshold: 10,
                },
                behavior_change: BehaviorChangeConfig {
                    enabled: true,
                    min_records: 20,
                    min_model_age_days: 14,
                    score_threshold: 0.8,
                    sensitivity: Sensitivity::Medium,
                },
                simultaneous: SimultaneousConfig {
                    enabled: true,
                    window_minutes: 5,
                    different_location_policy: true,
                    location_radius_km: 100.0,
                },
            },
            correlation: CorrelationConfig {
                throttle_minutes: 15,
                retention_hours: 24,
            },
            actions: ActionConfig {
                base_block_minutes: 60,
                call_timeout_secs: 5,
            },
            notify: NotifyConfig {
                siem_webhook_url: None,
                siem_min_severity: Severity::Low,
                request_timeout_secs: 30,
            },
            geolocation: GeoConfig {
                database_path: None,
            },
            storage: StorageConfig {
                sqlite_path: Some(PathBuf::from("techshield.db")),
                retention_days: 90,
            },
            maintenance: MaintenanceConfig {
                interval_minutes: 60,
            },
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
