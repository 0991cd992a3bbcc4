//! Event-processing pipeline
//!
//! Validate -> model update -> detector bank -> correlation -> action
//! dispatch -> notification -> persistence. Mutable state (behavior
//! models and the correlator) sits behind one lock held only for the
//! synchronous detect/correlate phase; async side effects run outside
//! the lock, so updates to the same subject are serialized while side
//! effects never block ingest of other events on state access.
//!
//! All collaborators are injected at construction; there is no
//! process-global state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::behavior::BehaviorModelStore;
use crate::config::Config;
use crate::correlation::{AlertCorrelator, Correlated, CorrelationError};
use crate::detection::DetectorBank;
use crate::dispatch::{ActionDispatcher, AddressBlocker, AuthControl};
use crate::geolocation::GeoProvider;
use crate::models::{Alert, AlertStatus, InvalidEventError, LoginEvent};
use crate::notify::{DashboardQueue, NotificationFanout, SiemExporter};
use crate::persistence::{AlertFilter, StateStore, StorageError};

struct PipelineState {
    models: BehaviorModelStore,
    correlator: AlertCorrelator,
}

pub struct Pipeline {
    state: Mutex<PipelineState>,
    bank: DetectorBank,
    dispatcher: ActionDispatcher,
    notifier: NotificationFanout,
    store: Option<Arc<dyn StateStore>>,
    retention_secs: i64,
}

impl Pipeline {
    /// Assemble the pipeline from configuration and injected collaborators
    ///
    /// Every collaborator is optional: without a geolocation provider the
    /// distance checks skip, without a blocker/auth service the mapped
    /// actions are recorded as failed, without a store nothing persists.
    pub fn new(
        config: &Config,
        geo: Option<Arc<dyn GeoProvider>>,
        blocker: Option<Arc<dyn AddressBlocker>>,
        auth: Option<Arc<dyn AuthControl>>,
        dashboard: Option<DashboardQueue>,
        store: Option<Arc<dyn StateStore>>,
    ) -> Self {
        let bank = DetectorBank::from_config(&config.detection, geo);
        let mut correlator = AlertCorrelator::new(
            config.correlation.throttle_minutes * 60,
            config.correlation.retention_hours * 3600,
        );
        let dispatcher = ActionDispatcher::new(
            blocker,
            auth,
            config.actions.base_block_minutes,
            Duration::from_secs(config.actions.call_timeout_secs),
        );
        // Restore alerts persisted as active by an earlier run, so they
        // stay resolvable across restarts instead of lingering active in
        // the store forever.
        if let Some(ref store) = store {
            let filter = AlertFilter {
                status: Some(AlertStatus::Active),
                ..Default::default()
            };
            match store.get_alerts(&filter) {
                Ok(alerts) => {
                    if !alerts.is_empty() {
                        log::info!("restored {} active alerts from storage", alerts.len());
                    }
                    for alert in alerts {
                        correlator.admit(alert);
                    }
                }
                Err(e) => log::error!("failed to restore active alerts: {}", e),
            }
        }

        let siem = config.notify.siem_webhook_url.as_ref().map(|url| {
            SiemExporter::new(
                url.clone(),
                config.notify.siem_min_severity,
                config.notify.request_timeout_secs,
            )
        });

        Pipeline {
            state: Mutex::new(PipelineState {
                models: BehaviorModelStore::new(),
                correlator,
            }),
            bank,
            dispatcher,
            notifier: NotificationFanout::new(dashboard, siem),
            store,
            retention_secs: config.storage.retention_days * 86400,
        }
    }

    /// Process one login event end to end
    ///
    /// Returns the alerts created synchronously for this event (suppressed
    /// duplicates are folded into existing alerts and not returned).
    pub async fn handle_event(&self, event: &LoginEvent) -> Result<Vec<Alert>, InvalidEventError> {
        event.validate()?;
        self.persist(|s| s.record_login(event), event.timestamp);

        let (mut fresh, bumped) = {
            let mut guard = self.state.lock().unwrap();
            let state = &mut *guard;
            state.models.update(event)?;

            let detections = match state.models.get(&event.subject) {
                Some(model) => self.bank.evaluate(event, model),
                None => Vec::new(),
            };

            let mut fresh = Vec::new();
            let mut bumped = Vec::new();
            for detection in detections {
                match state.correlator.correlate(detection, event) {
                    Correlated::Fresh(alert) => fresh.push(alert),
                    Correlated::Suppressed { existing: Some(id) } => {
                        if let Some(alert) = state.correlator.snapshot(id) {
                            bumped.push(alert);
                        }
                    }
                    Correlated::Suppressed { existing: None } => {}
                }
            }
            (fresh, bumped)
        };

        for alert in &bumped {
            self.persist(|s| s.update_alert(alert), event.timestamp);
        }

        for alert in fresh.iter_mut() {
            let actions = self.dispatcher.dispatch(alert).await;
            if !actions.is_empty() {
                let mut guard = self.state.lock().unwrap();
                guard.correlator.append_actions(alert.id, &actions);
                alert.actions.extend(actions);
            }
            self.persist(|s| s.store_alert(alert), event.timestamp);
            self.notifier.publish(alert).await;
        }

        Ok(fresh)
    }

    /// Resolve an active alert
    pub fn resolve_alert(&self, id: uuid::Uuid, resolution: &str) -> Result<Alert, CorrelationError> {
        let now = chrono::Utc::now().timestamp();
        let alert = {
            let mut guard = self.state.lock().unwrap();
            guard.correlator.resolve(id, resolution, now)?
        };
        self.persist(|s| s.update_alert(&alert), now);
        Ok(alert)
    }

    /// Query alerts
    ///
    /// With a persistent store configured the store is authoritative (it
    /// holds both active and resolved alerts); otherwise the in-memory
    /// active set is filtered directly and resolved alerts are gone once
    /// resolved.
    pub fn alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StorageError> {
        if let Some(ref store) = self.store {
            return store.get_alerts(filter);
        }

        // Only active alerts exist in memory
        if filter.status == Some(AlertStatus::Resolved) {
            return Ok(Vec::new());
        }
        let guard = self.state.lock().unwrap();
        let alerts = guard
            .correlator
            .active_alerts()
            .into_iter()
            .filter(|a| filter.severity.map_or(true, |s| a.severity == s))
            .filter(|a| filter.kind.map_or(true, |k| a.kind == k))
            .filter(|a| filter.since.map_or(true, |t| a.created_at >= t))
            .collect();
        Ok(alerts)
    }

    pub fn active_alert_count(&self) -> usize {
        self.state.lock().unwrap().correlator.active_count()
    }

    /// Background maintenance: sweep throttle records, purge stale
    /// behavior models, prune old persisted rows
    ///
    /// Runs on a fixed interval from the daemon; idempotent, so an
    /// overlapping or repeated run is harmless.
    pub fn run_maintenance(&self, now: i64) {
        let (swept, purged) = {
            let mut guard = self.state.lock().unwrap();
            let swept = guard.correlator.sweep(now);
            let purged = guard.models.purge_stale(now, self.retention_secs);
            (swept, purged)
        };
        if swept > 0 || purged > 0 {
            log::info!(
                "maintenance: swept {} throttle records, purged {} stale models",
                swept,
                purged
            );
        }

        if let Some(ref store) = self.store {
            match store.prune_before(now - self.retention_secs) {
                Ok(removed) if removed > 0 => {
                    log::info!("maintenance: pruned {} stored rows", removed);
                }
                Ok(_) => {}
                Err(e) => log::error!("maintenance prune failed: {}", e),
            }
        }
    }

    /// Best-effort persistence with one prune-and-retry on capacity
    /// pressure; the ingest path never fails on storage errors.
    fn persist<F>(&self, op: F, now: i64)
    where
        F: Fn(&dyn StateStore) -> Result<(), StorageError>,
    {
        let store = match self.store {
            Some(ref store) => store,
            None => return,
        };
        match op(store.as_ref()) {
            Ok(()) => {}
            Err(e) if e.is_capacity() => {
                log::warn!("storage capacity pressure ({}), pruning and retrying", e);
                if let Err(pe) = store.prune_before(now - self.retention_secs) {
                    log::error!("capacity prune failed: {}", pe);
                }
                if let Err(re) = op(store.as_ref()) {
                    log::error!("storage write dropped after retry: {}", re);
                }
            }
            Err(e) => log::error!("storage write dropped: {}", e),
        }
    }
}
