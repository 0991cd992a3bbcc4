//! Behavior model store
//!
//! Maintains one rolling profile per subject: bounded login history,
//! hour/day frequency counters, device and source-address usage, and
//! bounded failure/success histories. All detectors read from this model;
//! the store is the only writer.

use chrono::{DateTime, Datelike, Timelike};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

use crate::models::{InvalidEventError, LoginEvent, Outcome};

/// Max retained login attempts per subject (oldest evicted first)
pub const LOGIN_HISTORY_CAP: usize = 100;
/// Max retained failure and success records per subject
pub const OUTCOME_HISTORY_CAP: usize = 50;

/// Hour of day (0-23, UTC) for a unix timestamp
pub fn hour_of(timestamp: i64) -> u32 {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.hour())
        .unwrap_or(0)
}

/// Day of week (0 = Monday .. 6 = Sunday) for a unix timestamp
pub fn day_of(timestamp: i64) -> u32 {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.weekday().num_days_from_monday())
        .unwrap_or(0)
}

/// One retained login attempt
#[derive(Debug, Clone)]
pub struct LoginRecord {
    pub timestamp: i64,
    pub source_addr: IpAddr,
    pub user_agent: String,
    pub outcome: Outcome,
}

impl LoginRecord {
    fn from_event(event: &LoginEvent) -> Self {
        LoginRecord {
            timestamp: event.timestamp,
            source_addr: event.source_addr,
            user_agent: event.user_agent.clone(),
            outcome: event.outcome,
        }
    }
}

/// First-seen/last-seen/count triple for a device or source address
#[derive(Debug, Clone, Copy)]
pub struct UsageStats {
    pub first_seen: i64,
    pub last_seen: i64,
    pub count: u32,
}

impl UsageStats {
    fn observe(&mut self, timestamp: i64) {
        self.last_seen = timestamp;
        self.count += 1;
    }

    fn new(timestamp: i64) -> Self {
        UsageStats {
            first_seen: timestamp,
            last_seen: timestamp,
            count: 1,
        }
    }
}

/// Rolling per-subject login profile
#[derive(Debug, Clone)]
pub struct BehaviorModel {
    logins: VecDeque<LoginRecord>,
    hour_counts: [u32; 24],
    day_counts: [u32; 7],
    agents: HashMap<String, UsageStats>,
    addresses: HashMap<IpAddr, UsageStats>,
    failures: VecDeque<LoginRecord>,
    successes: VecDeque<LoginRecord>,
    created_at: i64,
    last_updated: i64,
}

impl BehaviorModel {
    fn new(created_at: i64) -> Self {
        BehaviorModel {
            logins: VecDeque::with_capacity(LOGIN_HISTORY_CAP),
            hour_counts: [0; 24],
            day_counts: [0; 7],
            agents: HashMap::new(),
            addresses: HashMap::new(),
            failures: VecDeque::with_capacity(OUTCOME_HISTORY_CAP),
            successes: VecDeque::with_capacity(OUTCOME_HISTORY_CAP),
            created_at,
            last_updated: created_at,
        }
    }

    fn apply(&mut self, event: &LoginEvent) {
        let record = LoginRecord::from_event(event);

        push_bounded(&mut self.logins, record.clone(), LOGIN_HISTORY_CAP);
        match event.outcome {
            Outcome::Failure => {
                push_bounded(&mut self.failures, record.clone(), OUTCOME_HISTORY_CAP)
            }
            Outcome::Success => {
                push_bounded(&mut self.successes, record, OUTCOME_HISTORY_CAP)
            }
        }

        self.hour_counts[hour_of(event.timestamp) as usize] += 1;
        self.day_counts[day_of(event.timestamp) as usize] += 1;

        self.agents
            .entry(event.user_agent.clone())
            .and_modify(|s| s.observe(event.timestamp))
            .or_insert_with(|| UsageStats::new(event.timestamp));
        self.addresses
            .entry(event.source_addr)
            .and_modify(|s| s.observe(event.timestamp))
            .or_insert_with(|| UsageStats::new(event.timestamp));

        self.last_updated = event.timestamp;
    }

    /// The most recent login, i.e. the event the store just applied
    pub fn last_login(&self) -> Option<&LoginRecord> {
        self.logins.back()
    }

    /// The login before the most recent one
    ///
    /// Detectors that compare the current event against prior state use
    /// this pre-update view: the store updates first, so the newest history
    /// entry is the current event itself.
    pub fn previous_login(&self) -> Option<&LoginRecord> {
        let len = self.logins.len();
        if len < 2 {
            None
        } else {
            self.logins.get(len - 2)
        }
    }

    /// Retained login attempts, oldest first
    pub fn logins(&self) -> impl Iterator<Item = &LoginRecord> {
        self.logins.iter()
    }

    /// Number of retained login attempts (bounded by the history cap)
    pub fn retained_login_count(&self) -> usize {
        self.logins.len()
    }

    /// Lifetime login count (unbounded; backed by the hour counters)
    pub fn total_login_count(&self) -> u32 {
        self.hour_counts.iter().sum()
    }

    pub fn hour_count(&self, hour: u32) -> u32 {
        self.hour_counts[(hour % 24) as usize]
    }

    pub fn day_count(&self, day: u32) -> u32 {
        self.day_counts[(day % 7) as usize]
    }

    pub fn agent_stats(&self, agent: &str) -> Option<&UsageStats> {
        self.agents.get(agent)
    }

    pub fn address_stats(&self, addr: &IpAddr) -> Option<&UsageStats> {
        self.addresses.get(addr)
    }

    /// Failures recorded at or after the cutoff (current event included)
    pub fn failures_since(&self, cutoff: i64) -> usize {
        self.failures.iter().filter(|r| r.timestamp >= cutoff).count()
    }

    /// Retained successful logins, oldest first
    pub fn successes(&self) -> impl Iterator<Item = &LoginRecord> {
        self.successes.iter()
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn last_updated(&self) -> i64 {
        self.last_updated
    }

    pub fn age_secs(&self, now: i64) -> i64 {
        (now - self.created_at).max(0)
    }

    #[cfg(test)]
    pub(crate) fn failure_history_len(&self) -> usize {
        self.failures.len()
    }

    #[cfg(test)]
    pub(crate) fn success_history_len(&self) -> usize {
        self.successes.len()
    }
}

fn push_bounded(queue: &mut VecDeque<LoginRecord>, record: LoginRecord, cap: usize) {
    while queue.len() >= cap {
        queue.pop_front();
    }
    queue.push_back(record);
}

/// Owner of all per-subject behavior models
///
/// Models are created lazily on the first event for a subject and dropped
/// only by the age-based purge.
pub struct BehaviorModelStore {
    models: HashMap<String, BehaviorModel>,
}

impl BehaviorModelStore {
    pub fn new() -> Self {
        BehaviorModelStore {
            models: HashMap::new(),
        }
    }

    /// Apply one event to the subject's model, creating it if absent
    ///
    /// Must be called exactly once per event, before detectors run.
    pub fn update(&mut self, event: &LoginEvent) -> Result<(), InvalidEventError> {
        event.validate()?;
        self.models
            .entry(event.subject.clone())
            .or_insert_with(|| BehaviorModel::new(event.timestamp))
            .apply(event);
        Ok(())
    }

    pub fn get(&self, subject: &str) -> Option<&BehaviorModel> {
        self.models.get(subject)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Drop models untouched for longer than `max_idle_secs`
    ///
    /// Returns the number of models dropped. Safe to run repeatedly.
    pub fn purge_stale(&mut self, now: i64, max_idle_secs: i64) -> usize {
        let before = self.models.len();
        self.models
            .retain(|_, model| now - model.last_updated() < max_idle_secs);
        before - self.models.len()
    }

    pub fn clear_all(&mut self) {
        self.models.clear();
    }
}

impl Default for BehaviorModelStore {
    fn default() -> Self {
        Self::new()
    }
}
