//! Alert storage and lifecycle
//!
//! Handles:
//! - De-duplication: at most one ACTIVE alert per (metric, source)
//! - Acknowledge/resolve transitions and auto-resolution
//! - Optional eviction of terminal alerts

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::{cutoff, BufferKey};
use crate::error::{MonitorError, Result};
use crate::models::{
    traceable_id, Alert, AlertOrigin, AlertSeverity, AlertStatus, Metadata, MetricKind,
};

/// Actor recorded when the maintenance loop resolves an alert
pub const AUTO_RESOLVE_ACTOR: &str = "system:auto-resolve";

/// Everything needed to raise an alert; the store fills in id, status and times
#[derive(Debug, Clone)]
pub struct AlertDraft {
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub metric: MetricKind,
    pub source: String,
    pub current_value: f64,
    pub threshold_value: f64,
    pub origin: AlertOrigin,
    pub metadata: Metadata,
}

/// Result of a create call
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// A new alert was stored
    Created(Alert),
    /// An ACTIVE alert already exists for the key; nothing was stored
    Existing(Alert),
}

impl CreateOutcome {
    pub fn alert(&self) -> &Alert {
        match self {
            CreateOutcome::Created(alert) | CreateOutcome::Existing(alert) => alert,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Alert counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    pub total: usize,
    pub active: usize,
    pub acknowledged: usize,
    pub resolved: usize,
    pub muted: usize,
}

/// Owns all alerts and drives their state transitions.
///
/// Lock order: the active index may be held while touching `alerts`, never
/// the other way around.
#[derive(Default)]
pub struct AlertStore {
    alerts: DashMap<String, Alert>,
    /// (metric, source) -> id of the ACTIVE alert for that key
    active: DashMap<BufferKey, String>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new ACTIVE alert unless one already exists for the key
    pub fn create(&self, draft: AlertDraft) -> CreateOutcome {
        self.create_at(draft, Utc::now())
    }

    /// Like [`create`](Self::create) with an explicit creation time
    pub fn create_at(&self, draft: AlertDraft, now: DateTime<Utc>) -> CreateOutcome {
        match self.active.entry((draft.metric, draft.source.clone())) {
            Entry::Occupied(mut occupied) => {
                let existing = self.alerts.get(occupied.get()).map(|a| a.clone());
                if let Some(existing) = existing.filter(Alert::is_active) {
                    debug!(
                        alert_id = %existing.id,
                        metric = %draft.metric,
                        source = %draft.source,
                        "Alert suppressed, active alert exists"
                    );
                    return CreateOutcome::Existing(existing);
                }
                let alert = self.insert(draft, now);
                occupied.insert(alert.id.clone());
                CreateOutcome::Created(alert)
            }
            Entry::Vacant(vacant) => {
                let alert = self.insert(draft, now);
                vacant.insert(alert.id.clone());
                CreateOutcome::Created(alert)
            }
        }
    }

    fn insert(&self, draft: AlertDraft, now: DateTime<Utc>) -> Alert {
        let alert = Alert {
            id: traceable_id(draft.metric, &draft.source, draft.origin.label(), now),
            severity: draft.severity,
            status: AlertStatus::Active,
            title: draft.title,
            description: draft.description,
            metric: draft.metric,
            current_value: draft.current_value,
            threshold_value: draft.threshold_value,
            source: draft.source,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            acknowledged_by: None,
            resolved_by: None,
            origin: draft.origin,
            metadata: draft.metadata,
        };
        self.alerts.insert(alert.id.clone(), alert.clone());
        alert
    }

    /// ACTIVE -> ACKNOWLEDGED
    pub fn acknowledge(&self, id: &str, actor: &str) -> Result<Alert> {
        let alert = {
            let mut alert = self
                .alerts
                .get_mut(id)
                .ok_or_else(|| MonitorError::AlertNotFound(id.to_string()))?;

            if alert.status != AlertStatus::Active {
                return Err(MonitorError::InvalidTransition {
                    id: id.to_string(),
                    from: alert.status,
                    to: AlertStatus::Acknowledged,
                });
            }

            alert.status = AlertStatus::Acknowledged;
            alert.acknowledged_by = Some(actor.to_string());
            alert.updated_at = Utc::now();
            alert.clone()
        };

        self.release_active(&alert);
        Ok(alert)
    }

    /// ACTIVE or ACKNOWLEDGED -> RESOLVED
    pub fn resolve(&self, id: &str, actor: &str) -> Result<Alert> {
        self.resolve_where(id, actor, Utc::now(), |status| {
            matches!(status, AlertStatus::Active | AlertStatus::Acknowledged)
        })
    }

    /// ACTIVE -> RESOLVED on behalf of the maintenance loop
    pub fn auto_resolve(&self, id: &str, now: DateTime<Utc>) -> Result<Alert> {
        self.resolve_where(id, AUTO_RESOLVE_ACTOR, now, |status| {
            status == AlertStatus::Active
        })
    }

    fn resolve_where(
        &self,
        id: &str,
        actor: &str,
        now: DateTime<Utc>,
        allowed: impl Fn(AlertStatus) -> bool,
    ) -> Result<Alert> {
        let alert = {
            let mut alert = self
                .alerts
                .get_mut(id)
                .ok_or_else(|| MonitorError::AlertNotFound(id.to_string()))?;

            if !allowed(alert.status) {
                return Err(MonitorError::InvalidTransition {
                    id: id.to_string(),
                    from: alert.status,
                    to: AlertStatus::Resolved,
                });
            }

            alert.status = AlertStatus::Resolved;
            alert.resolved_at = Some(now);
            alert.resolved_by = Some(actor.to_string());
            alert.updated_at = now;
            alert.clone()
        };

        self.release_active(&alert);
        Ok(alert)
    }

    /// Drop the de-duplication slot if it still points at this alert
    fn release_active(&self, alert: &Alert) {
        self.active
            .remove_if(&(alert.metric, alert.source.clone()), |_, id| id == &alert.id);
    }

    pub fn get(&self, id: &str) -> Option<Alert> {
        self.alerts.get(id).map(|a| a.clone())
    }

    /// The ACTIVE alert for a key, if any
    pub fn active_for(&self, metric: MetricKind, source: &str) -> Option<Alert> {
        let id = self
            .active
            .get(&(metric, source.to_string()))
            .map(|id| id.clone())?;
        self.get(&id).filter(Alert::is_active)
    }

    /// All ACTIVE alerts, oldest first
    pub fn list_active(&self) -> Vec<Alert> {
        let mut active: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|entry| entry.is_active())
            .map(|entry| entry.value().clone())
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        active
    }

    /// Every stored alert, oldest first
    pub fn all(&self) -> Vec<Alert> {
        let mut all: Vec<Alert> = self.alerts.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    /// Snapshot of ACTIVE alerts created more than `age` before `now`
    pub fn active_older_than(&self, age: Duration, now: DateTime<Utc>) -> Vec<Alert> {
        let cutoff = cutoff(now, age);
        self.alerts
            .iter()
            .filter(|entry| entry.is_active() && entry.created_at < cutoff)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Remove resolved/muted alerts whose last change is older than `retention`
    pub fn evict_terminal(&self, retention: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = cutoff(now, retention);
        let before = self.alerts.len();
        self.alerts.retain(|_, alert| {
            let last_change = alert.resolved_at.unwrap_or(alert.updated_at);
            !(alert.status.is_terminal() && last_change < cutoff)
        });
        before.saturating_sub(self.alerts.len())
    }

    pub fn counts(&self) -> AlertCounts {
        let mut counts = AlertCounts::default();
        for entry in self.alerts.iter() {
            counts.total += 1;
            match entry.status {
                AlertStatus::Active => counts.active += 1,
                AlertStatus::Acknowledged => counts.acknowledged += 1,
                AlertStatus::Resolved => counts.resolved += 1,
                AlertStatus::Muted => counts.muted += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(value: f64) -> AlertDraft {
        AlertDraft {
            severity: AlertSeverity::Critical,
            title: "High response_time".to_string(),
            description: "test".to_string(),
            metric: MetricKind::ResponseTime,
            source: "svcA".to_string(),
            current_value: value,
            threshold_value: 5000.0,
            origin: AlertOrigin::Threshold,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_create_deduplicates_active() {
        let store = AlertStore::new();

        let first = store.create(draft(6000.0));
        assert!(first.is_created());
        assert_eq!(first.alert().status, AlertStatus::Active);

        let second = store.create(draft(6500.0));
        assert!(!second.is_created());
        assert_eq!(second.alert().id, first.alert().id);
        assert_eq!(second.alert().current_value, 6000.0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_different_sources_not_deduplicated() {
        let store = AlertStore::new();
        let mut other = draft(6000.0);
        other.source = "svcB".to_string();

        assert!(store.create(draft(6000.0)).is_created());
        assert!(store.create(other).is_created());
        assert_eq!(store.list_active().len(), 2);
    }

    #[test]
    fn test_acknowledge_unknown_is_not_found() {
        let store = AlertStore::new();
        store.create(draft(6000.0));
        let before = store.all();

        let err = store.acknowledge("missing", "ops").unwrap_err();
        assert!(matches!(err, MonitorError::AlertNotFound(ref id) if id == "missing"));

        let after = store.all();
        assert_eq!(before.len(), after.len());
        assert_eq!(after[0].status, AlertStatus::Active);
    }

    #[test]
    fn test_acknowledge_then_resolve() {
        let store = AlertStore::new();
        let id = store.create(draft(6000.0)).alert().id.clone();

        let acked = store.acknowledge(&id, "ops").unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by.as_deref(), Some("ops"));
        assert!(store.list_active().is_empty());

        let resolved = store.resolve(&id, "ops").unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        let err = store.resolve(&id, "ops").unwrap_err();
        assert!(matches!(err, MonitorError::InvalidTransition { .. }));
    }

    #[test]
    fn test_acknowledge_twice_rejected() {
        let store = AlertStore::new();
        let id = store.create(draft(6000.0)).alert().id.clone();
        store.acknowledge(&id, "ops").unwrap();

        let err = store.acknowledge(&id, "ops").unwrap_err();
        assert!(matches!(
            err,
            MonitorError::InvalidTransition {
                from: AlertStatus::Acknowledged,
                ..
            }
        ));
    }

    #[test]
    fn test_new_alert_allowed_after_resolution() {
        let store = AlertStore::new();
        let id = store.create(draft(6000.0)).alert().id.clone();
        store.resolve(&id, "ops").unwrap();

        let next = store.create(draft(7000.0));
        assert!(next.is_created());
        assert_ne!(next.alert().id, id);
        assert_eq!(
            store.active_for(MetricKind::ResponseTime, "svcA").unwrap().id,
            next.alert().id
        );
    }

    #[test]
    fn test_auto_resolve_requires_active() {
        let store = AlertStore::new();
        let id = store.create(draft(6000.0)).alert().id.clone();
        store.acknowledge(&id, "ops").unwrap();

        assert!(store.auto_resolve(&id, Utc::now()).is_err());
    }

    #[test]
    fn test_active_older_than() {
        let store = AlertStore::new();
        let old = Utc::now() - chrono::Duration::hours(2);
        store.create_at(draft(6000.0), old);
        let mut fresh = draft(6000.0);
        fresh.source = "svcB".to_string();
        store.create(fresh);

        let stale = store.active_older_than(Duration::from_secs(3600), Utc::now());
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].source, "svcA");
    }

    #[test]
    fn test_evict_terminal() {
        let store = AlertStore::new();
        let now = Utc::now();
        let id = store.create(draft(6000.0)).alert().id.clone();
        store
            .auto_resolve(&id, now - chrono::Duration::hours(3))
            .unwrap();
        let mut active = draft(6000.0);
        active.source = "svcB".to_string();
        store.create_at(active, now - chrono::Duration::hours(5));

        let evicted = store.evict_terminal(Duration::from_secs(3600), now);

        assert_eq!(evicted, 1);
        assert!(store.get(&id).is_none());
        assert_eq!(store.counts().active, 1);
    }

    #[test]
    fn test_counts() {
        let store = AlertStore::new();
        let id = store.create(draft(6000.0)).alert().id.clone();
        let mut other = draft(6000.0);
        other.source = "svcB".to_string();
        store.create(other);
        store.acknowledge(&id, "ops").unwrap();

        let counts = store.counts();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.active, 1);
        assert_eq!(counts.acknowledged, 1);
        assert_eq!(counts.resolved, 0);
    }
}
