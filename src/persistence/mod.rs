//! Persistence for login events and alerts
//!
//! The pipeline keeps behavior models in memory; the store is the durable
//! record of ingested events and of every alert, active or resolved. The
//! browser-storage keys of the original product have no counterpart here.

pub mod sqlite_store;

pub use sqlite_store::SqliteStateStore;

use thiserror::Error;

use crate::models::{Alert, AlertStatus, DetectorKind, LoginEvent, Severity};

/// Errors that can occur during persistence operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data in database: {0}")]
    InvalidData(String),
}

impl StorageError {
    /// True when the failure is storage-capacity pressure, in which case
    /// the caller should prune and retry once
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            StorageError::Database(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DiskFull
        )
    }
}

/// Query filter for stored alerts
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub severity: Option<Severity>,
    pub kind: Option<DetectorKind>,
    /// Only alerts created at or after this unix timestamp
    pub since: Option<i64>,
}

/// Trait for persistence backends
///
/// Implementations can use different storage engines; the shipped one is
/// SQLite.
pub trait StateStore: Send + Sync {
    /// Record one ingested login event
    fn record_login(&self, event: &LoginEvent) -> Result<(), StorageError>;

    /// Insert a freshly created alert
    fn store_alert(&self, alert: &Alert) -> Result<(), StorageError>;

    /// Overwrite a stored alert (actions appended, repeats bumped, or
    /// resolved)
    fn update_alert(&self, alert: &Alert) -> Result<(), StorageError>;

    /// Query stored alerts, newest first
    fn get_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StorageError>;

    /// Remove login events and resolved alerts older than the cutoff
    ///
    /// Returns the number of rows removed. Used both by scheduled
    /// maintenance and by the capacity-pressure retry path.
    fn prune_before(&self, cutoff: i64) -> Result<usize, StorageError>;

    /// Clear all data (useful for testing)
    fn clear_all(&self) -> Result<(), StorageError>;
}
