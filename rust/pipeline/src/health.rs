//! Per-table liveness of the two feeds.
//!
//! The monitor only keeps timestamps and derives states from them. Callers
//! pass `now` explicitly so transitions are reproducible under a paused clock.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use handfuse_engine::record::TableId;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::errors::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    Primary,
    Secondary,
}

impl FeedSource {
    pub fn counterpart(self) -> Self {
        match self {
            FeedSource::Primary => FeedSource::Secondary,
            FeedSource::Secondary => FeedSource::Primary,
        }
    }
}

impl std::fmt::Display for FeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedSource::Primary => write!(f, "primary"),
            FeedSource::Secondary => write!(f, "secondary"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Fresh,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableStatus {
    Healthy,
    Degraded { stale: FeedSource },
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChannelState {
    pub table_id: TableId,
    pub primary: Liveness,
    pub secondary: Liveness,
    pub primary_last_seen: Option<Instant>,
    pub secondary_last_seen: Option<Instant>,
    /// First observation of the table; a feed that never delivered ages from here
    pub registered_at: Instant,
    pub disconnected_since: Option<Instant>,
}

impl TableChannelState {
    fn new(table_id: TableId, now: Instant) -> Self {
        Self {
            table_id,
            primary: Liveness::Fresh,
            secondary: Liveness::Fresh,
            primary_last_seen: None,
            secondary_last_seen: None,
            registered_at: now,
            disconnected_since: None,
        }
    }

    pub fn liveness(&self, source: FeedSource) -> Liveness {
        match source {
            FeedSource::Primary => self.primary,
            FeedSource::Secondary => self.secondary,
        }
    }

    pub fn status(&self) -> TableStatus {
        match (self.primary, self.secondary) {
            (Liveness::Fresh, Liveness::Fresh) => TableStatus::Healthy,
            (Liveness::Stale, Liveness::Fresh) => TableStatus::Degraded {
                stale: FeedSource::Primary,
            },
            (Liveness::Fresh, Liveness::Stale) => TableStatus::Degraded {
                stale: FeedSource::Secondary,
            },
            (Liveness::Stale, Liveness::Stale) => TableStatus::Disconnected,
        }
    }

    fn mark_seen(&mut self, source: FeedSource, now: Instant) {
        match source {
            FeedSource::Primary => {
                self.primary = Liveness::Fresh;
                self.primary_last_seen = Some(now);
            }
            FeedSource::Secondary => {
                self.secondary = Liveness::Fresh;
                self.secondary_last_seen = Some(now);
            }
        }
        self.disconnected_since = None;
    }

    fn age(&self, source: FeedSource, now: Instant) -> Duration {
        let last = match source {
            FeedSource::Primary => self.primary_last_seen,
            FeedSource::Secondary => self.secondary_last_seen,
        };
        now.saturating_duration_since(last.unwrap_or(self.registered_at))
    }

    fn refresh(&mut self, now: Instant, staleness_window: Duration) {
        let liveness = |age: Duration| {
            if age >= staleness_window {
                Liveness::Stale
            } else {
                Liveness::Fresh
            }
        };
        self.primary = liveness(self.age(FeedSource::Primary, now));
        self.secondary = liveness(self.age(FeedSource::Secondary, now));
        match self.status() {
            TableStatus::Disconnected => {
                self.disconnected_since.get_or_insert(now);
            }
            _ => self.disconnected_since = None,
        }
    }
}

/// A change of table status, handed to the orchestrator and to monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthTransition {
    pub table_id: TableId,
    pub from: TableStatus,
    pub to: TableStatus,
    pub primary: Liveness,
    pub secondary: Liveness,
    pub observed_at: DateTime<Utc>,
}

impl HealthTransition {
    fn between(before: TableStatus, state: &TableChannelState) -> Option<Self> {
        let after = state.status();
        (before != after).then(|| HealthTransition {
            table_id: state.table_id.clone(),
            from: before,
            to: after,
            primary: state.primary,
            secondary: state.secondary,
            observed_at: Utc::now(),
        })
    }
}

#[derive(Debug)]
pub struct ChannelHealthMonitor {
    tables: RwLock<HashMap<TableId, TableChannelState>>,
    staleness_window: Duration,
}

impl ChannelHealthMonitor {
    pub fn new(staleness_window: Duration) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            staleness_window,
        }
    }

    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    /// Records an arrival. Returns a transition when the arrival revives a
    /// stale feed.
    pub fn observe(
        &self,
        table_id: &str,
        source: FeedSource,
        now: Instant,
    ) -> Result<Option<HealthTransition>, PipelineError> {
        let mut guard = self
            .tables
            .write()
            .map_err(|_| PipelineError::RegistryPoisoned)?;
        let state = guard
            .entry(table_id.to_string())
            .or_insert_with(|| TableChannelState::new(table_id.to_string(), now));
        let before = state.status();
        state.mark_seen(source, now);
        Ok(HealthTransition::between(before, state))
    }

    /// Re-derives liveness for every table, returning only the changes.
    pub fn sweep(&self, now: Instant) -> Result<Vec<HealthTransition>, PipelineError> {
        let mut guard = self
            .tables
            .write()
            .map_err(|_| PipelineError::RegistryPoisoned)?;
        let mut transitions: Vec<HealthTransition> = guard
            .values_mut()
            .filter_map(|state| {
                let before = state.status();
                state.refresh(now, self.staleness_window);
                HealthTransition::between(before, state)
            })
            .collect();
        transitions.sort_by(|a, b| a.table_id.cmp(&b.table_id));

        for transition in &transitions {
            tracing::info!(
                table_id = %transition.table_id,
                from = ?transition.from,
                to = ?transition.to,
                "table health changed"
            );
        }
        Ok(transitions)
    }

    pub fn state(&self, table_id: &str) -> Result<Option<TableChannelState>, PipelineError> {
        let guard = self
            .tables
            .read()
            .map_err(|_| PipelineError::RegistryPoisoned)?;
        Ok(guard.get(table_id).cloned())
    }

    pub fn forget(&self, table_id: &str) -> Result<bool, PipelineError> {
        let mut guard = self
            .tables
            .write()
            .map_err(|_| PipelineError::RegistryPoisoned)?;
        Ok(guard.remove(table_id).is_some())
    }

    /// Tables that have stayed disconnected for at least `grace`.
    pub fn reapable(&self, now: Instant, grace: Duration) -> Result<Vec<TableId>, PipelineError> {
        let guard = self
            .tables
            .read()
            .map_err(|_| PipelineError::RegistryPoisoned)?;
        let mut ids: Vec<TableId> = guard
            .values()
            .filter(|state| {
                state
                    .disconnected_since
                    .is_some_and(|since| now.saturating_duration_since(since) >= grace)
            })
            .map(|state| state.table_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn tracked_tables(&self) -> Result<usize, PipelineError> {
        let guard = self
            .tables
            .read()
            .map_err(|_| PipelineError::RegistryPoisoned)?;
        Ok(guard.len())
    }
}
