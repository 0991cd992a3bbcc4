//! SQLite implementation of the StateStore trait

use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use uuid::Uuid;

use super::{AlertFilter, StateStore, StorageError};
use crate::models::{
    ActionRecord, Alert, AlertStatus, DetectorKind, LoginEvent, Severity,
};

/// SQLite-based state storage
///
/// Stores ingested login events and the full alert history, providing
/// continuity across daemon restarts.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Create a new SQLite state store at the specified path
    ///
    /// Creates the database file and initializes the schema if it doesn't
    /// exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteStateStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStateStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn row_to_alert(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAlertRow> {
        Ok(RawAlertRow {
            id: row.get(0)?,
            subject: row.get(1)?,
            source_addr: row.get(2)?,
            kind: row.get(3)?,
            severity: row.get(4)?,
            summary: row.get(5)?,
            evidence: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
            resolved_at: row.get(9)?,
            resolution: row.get(10)?,
            actions: row.get(11)?,
            repeat_count: row.get(12)?,
        })
    }
}

/// Alert row as stored, before parsing the typed columns
struct RawAlertRow {
    id: String,
    subject: String,
    source_addr: String,
    kind: String,
    severity: String,
    summary: String,
    evidence: String,
    status: String,
    created_at: i64,
    resolved_at: Option<i64>,
    resolution: Option<String>,
    actions: String,
    repeat_count: u32,
}

impl RawAlertRow {
    fn parse(self) -> Result<Alert, StorageError> {
        let id = Uuid::from_str(&self.id)
            .map_err(|_| StorageError::InvalidData(format!("bad alert id: {}", self.id)))?;
        let source_addr = self.source_addr.parse().map_err(|_| {
            StorageError::InvalidData(format!("bad source address: {}", self.source_addr))
        })?;
        let kind = DetectorKind::from_str(&self.kind).map_err(StorageError::InvalidData)?;
        let severity = Severity::from_str(&self.severity).map_err(StorageError::InvalidData)?;
        let status = AlertStatus::from_str(&self.status).map_err(StorageError::InvalidData)?;
        let evidence = serde_json::from_str(&self.evidence)
            .map_err(|e| StorageError::InvalidData(format!("bad evidence json: {}", e)))?;
        let actions: Vec<ActionRecord> = serde_json::from_str(&self.actions)
            .map_err(|e| StorageError::InvalidData(format!("bad actions json: {}", e)))?;

        Ok(Alert {
            id,
            subject: self.subject,
            source_addr,
            kind,
            severity,
            summary: self.summary,
            evidence,
            status,
            created_at: self.created_at,
            resolved_at: self.resolved_at,
            resolution: self.resolution,
            actions,
            repeat_count: self.repeat_count,
        })
    }
}

const ALERT_COLUMNS: &str = "id, subject, source_addr, kind, severity, summary, evidence, \
     status, created_at, resolved_at, resolution, actions, repeat_count";

impl StateStore for SqliteStateStore {
    fn record_login(&self, event: &LoginEvent) -> Result<(), StorageError> {
        let outcome = if event.is_success() { "success" } else { "failure" };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO login_events (subject, source_addr, user_agent, timestamp, outcome)
             VALUES (?, ?, ?, ?, ?)",
            params![
                event.subject,
                event.source_addr.to_string(),
                event.user_agent,
                event.timestamp,
                outcome
            ],
        )?;
        Ok(())
    }

    fn store_alert(&self, alert: &Alert) -> Result<(), StorageError> {
        let evidence = serde_json::to_string(&alert.evidence)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        let actions = serde_json::to_string(&alert.actions)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        let status = if alert.is_active() { "active" } else { "resolved" };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alerts
             (id, subject, source_addr, kind, severity, summary, evidence,
              status, created_at, resolved_at, resolution, actions, repeat_count)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                alert.id.to_string(),
                alert.subject,
                alert.source_addr.to_string(),
                alert.kind.as_str(),
                alert.severity.as_str(),
                alert.summary,
                evidence,
                status,
                alert.created_at,
                alert.resolved_at,
                alert.resolution,
                actions,
                alert.repeat_count
            ],
        )?;
        Ok(())
    }

    fn update_alert(&self, alert: &Alert) -> Result<(), StorageError> {
        let actions = serde_json::to_string(&alert.actions)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        let status = if alert.is_active() { "active" } else { "resolved" };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE alerts
             SET status = ?, resolved_at = ?, resolution = ?, actions = ?, repeat_count = ?
             WHERE id = ?",
            params![
                status,
                alert.resolved_at,
                alert.resolution,
                actions,
                alert.repeat_count,
                alert.id.to_string()
            ],
        )?;
        Ok(())
    }

    fn get_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StorageError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(
                match status {
                    AlertStatus::Active => "active",
                    AlertStatus::Resolved => "resolved",
                }
                .to_string(),
            );
        }
        if let Some(severity) = filter.severity {
            clauses.push("severity = ?");
            values.push(severity.as_str().to_string());
        }
        if let Some(kind) = filter.kind {
            clauses.push("kind = ?");
            values.push(kind.as_str().to_string());
        }
        if let Some(since) = filter.since {
            clauses.push("created_at >= ?");
            values.push(since.to_string());
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let query = format!(
            "SELECT {} FROM alerts{} ORDER BY created_at DESC",
            ALERT_COLUMNS, where_clause
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_alert)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(RawAlertRow::parse).collect()
    }

    fn prune_before(&self, cutoff: i64) -> Result<usize, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut removed = 0usize;

        removed += conn.execute(
            "DELETE FROM login_events WHERE timestamp < ?",
            params![cutoff],
        )?;
        // Active alerts are never pruned regardless of age
        removed += conn.execute(
            "DELETE FROM alerts WHERE status = 'resolved' AND created_at < ?",
            params![cutoff],
        )?;

        Ok(removed)
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM login_events", [])?;
        conn.execute("DELETE FROM alerts", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Detection, Outcome};

    fn store() -> SqliteStateStore {
        SqliteStateStore::in_memory().unwrap()
    }

    fn event(subject: &str, ts: i64) -> LoginEvent {
        LoginEvent {
            subject: subject.to_string(),
            source_addr: "10.0.0.5".parse().unwrap(),
            user_agent: "ua".to_string(),
            timestamp: ts,
            outcome: Outcome::Failure,
        }
    }

    fn alert(subject: &str, ts: i64, kind: DetectorKind, severity: Severity) -> Alert {
        Alert::from_detection(
            Detection {
                kind,
                severity,
                summary: "test".to_string(),
                evidence: serde_json::json!({ "failure_count": 6 }),
            },
            &event(subject, ts),
        )
    }

    #[test]
    fn test_store_and_fetch_alert() {
        let store = store();
        let a = alert("alice", 1000, DetectorKind::BruteForce, Severity::Critical);
        store.store_alert(&a).unwrap();

        let fetched = store.get_alerts(&AlertFilter::default()).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, a.id);
        assert_eq!(fetched[0].kind, DetectorKind::BruteForce);
        assert_eq!(fetched[0].evidence["failure_count"], 6);
    }

    #[test]
    fn test_filter_by_status_and_severity() {
        let store = store();
        let mut resolved = alert("alice", 1000, DetectorKind::BruteForce, Severity::Critical);
        resolved.status = AlertStatus::Resolved;
        resolved.resolved_at = Some(2000);
        resolved.resolution = Some("done".to_string());
        store.store_alert(&resolved).unwrap();
        store
            .store_alert(&alert("bob", 1100, DetectorKind::UnusualHour, Severity::Low))
            .unwrap();

        let active = store
            .get_alerts(&AlertFilter {
                status: Some(AlertStatus::Active),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].subject, "bob");

        let critical = store
            .get_alerts(&AlertFilter {
                severity: Some(Severity::Critical),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].subject, "alice");
    }

    #[test]
    fn test_filter_by_kind_and_since() {
        let store = store();
        store
            .store_alert(&alert("a", 1000, DetectorKind::BruteForce, Severity::Critical))
            .unwrap();
        store
            .store_alert(&alert("b", 2000, DetectorKind::BruteForce, Severity::Critical))
            .unwrap();
        store
            .store_alert(&alert("c", 3000, DetectorKind::UnusualHour, Severity::Low))
            .unwrap();

        let recent_brute = store
            .get_alerts(&AlertFilter {
                kind: Some(DetectorKind::BruteForce),
                since: Some(1500),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(recent_brute.len(), 1);
        assert_eq!(recent_brute[0].subject, "b");
    }

    #[test]
    fn test_update_alert_resolution() {
        let store = store();
        let mut a = alert("alice", 1000, DetectorKind::BruteForce, Severity::Critical);
        store.store_alert(&a).unwrap();

        a.status = AlertStatus::Resolved;
        a.resolved_at = Some(5000);
        a.resolution = Some("false positive".to_string());
        store.update_alert(&a).unwrap();

        let fetched = store.get_alerts(&AlertFilter::default()).unwrap();
        assert_eq!(fetched[0].status, AlertStatus::Resolved);
        assert_eq!(fetched[0].resolution.as_deref(), Some("false positive"));
    }

    #[test]
    fn test_actions_round_trip() {
        let store = store();
        let mut a = alert("alice", 1000, DetectorKind::BruteForce, Severity::Critical);
        a.actions.push(ActionRecord {
            kind: crate::models::ActionKind::BlockAddress,
            succeeded: true,
            detail: "block 10.0.0.5 for 60 min".to_string(),
            timestamp: 1000,
        });
        store.store_alert(&a).unwrap();

        let fetched = store.get_alerts(&AlertFilter::default()).unwrap();
        assert_eq!(fetched[0].actions.len(), 1);
        assert!(fetched[0].actions[0].succeeded);
    }

    #[test]
    fn test_prune_keeps_active_alerts() {
        let store = store();
        store.record_login(&event("alice", 1000)).unwrap();
        store.record_login(&event("alice", 9000)).unwrap();

        let mut old_resolved = alert("a", 1000, DetectorKind::BruteForce, Severity::Critical);
        old_resolved.status = AlertStatus::Resolved;
        store.store_alert(&old_resolved).unwrap();
        store
            .store_alert(&alert("b", 1000, DetectorKind::UnusualHour, Severity::Low))
            .unwrap();

        let removed = store.prune_before(5000).unwrap();
        // One old login event plus one old resolved alert
        assert_eq!(removed, 2);

        let remaining = store.get_alerts(&AlertFilter::default()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].subject, "b");
    }

    #[test]
    fn test_clear_all() {
        let store = store();
        store.record_login(&event("alice", 1000)).unwrap();
        store
            .store_alert(&alert("a", 1000, DetectorKind::BruteForce, Severity::Critical))
            .unwrap();
        store.clear_all().unwrap();
        assert!(store.get_alerts(&AlertFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shield.db");
        {
            let store = SqliteStateStore::new(&path).unwrap();
            store
                .store_alert(&alert("alice", 1000, DetectorKind::BruteForce, Severity::Critical))
                .unwrap();
        }
        let reopened = SqliteStateStore::new(&path).unwrap();
        assert_eq!(reopened.get_alerts(&AlertFilter::default()).unwrap().len(), 1);
    }
}
