use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use handfuse_engine::classifier::HandResult;
use handfuse_engine::fusion::{FusedResult, FusionStats, InferredResult};
use handfuse_engine::record::TableId;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::events::{EventBus, PipelineEvent};
use crate::health::{ChannelHealthMonitor, FeedSource, HealthTransition};
use crate::table::{TableHandle, TableSender, TableSettings, TableSnapshot};

/// Routes results to per-table fusion tasks and manages their lifecycle.
#[derive(Debug)]
pub struct Orchestrator {
    tables: RwLock<HashMap<TableId, TableHandle>>,
    settings: TableSettings,
    disconnect_grace: Duration,
    health: Arc<ChannelHealthMonitor>,
    fused_tx: mpsc::Sender<FusedResult>,
    events: EventBus,
    // Counters of tables that have been reaped or shut down.
    retired: Mutex<FusionStats>,
}

impl Orchestrator {
    pub fn new(
        config: &PipelineConfig,
        health: Arc<ChannelHealthMonitor>,
        fused_tx: mpsc::Sender<FusedResult>,
        events: EventBus,
    ) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            settings: TableSettings {
                policy: config.fusion_policy(),
                match_window: config.match_window,
                mismatch_threshold: config.mismatch_threshold,
            },
            disconnect_grace: config.disconnect_grace,
            health,
            fused_tx,
            events,
            retired: Mutex::new(FusionStats::default()),
        }
    }

    pub async fn submit_primary(&self, result: HandResult) -> Result<(), PipelineError> {
        let table = self.table(&result.table_id)?;
        self.arrival(&table, FeedSource::Primary).await?;
        table.submit_primary(result).await
    }

    pub async fn submit_inferred(&self, result: InferredResult) -> Result<(), PipelineError> {
        result.validate()?;
        let table = self.table(&result.table_id)?;
        self.arrival(&table, FeedSource::Secondary).await?;
        table.submit_inferred(result).await
    }

    /// Notes that a feed delivered something for `table_id` without a result
    /// to fuse, e.g. a record where every player folded pre-flop.
    pub async fn touch(&self, table_id: &str, source: FeedSource) -> Result<(), PipelineError> {
        match self.existing(table_id)? {
            Some(table) => self.arrival(&table, source).await,
            None => self
                .health
                .observe(table_id, source, Instant::now())
                .map(|_| ()),
        }
    }

    async fn arrival(&self, table: &TableSender, source: FeedSource) -> Result<(), PipelineError> {
        if let Some(transition) = self
            .health
            .observe(table.table_id(), source, Instant::now())?
        {
            tracing::info!(
                table_id = %transition.table_id,
                source = %source,
                to = ?transition.to,
                "feed recovered"
            );
            table
                .apply_health(transition.primary, transition.secondary)
                .await?;
            self.events
                .publish(PipelineEvent::HealthChanged { transition });
        }
        Ok(())
    }

    /// Pushes a health change into the affected table, if it is live.
    pub async fn apply_health(&self, transition: &HealthTransition) -> Result<(), PipelineError> {
        match self.existing(&transition.table_id)? {
            Some(table) => {
                table
                    .apply_health(transition.primary, transition.secondary)
                    .await
            }
            None => Ok(()),
        }
    }

    /// One monitoring pass: derive liveness, forward changes to the tables,
    /// publish them and reap tables disconnected past the grace period.
    pub async fn check_health(&self, now: Instant) -> Result<Vec<HealthTransition>, PipelineError> {
        let transitions = self.health.sweep(now)?;
        for transition in &transitions {
            if let Err(err) = self.apply_health(transition).await {
                tracing::warn!(
                    table_id = %transition.table_id,
                    error = %err,
                    "failed to forward health change"
                );
            }
            self.events.publish(PipelineEvent::HealthChanged {
                transition: transition.clone(),
            });
        }

        for table_id in self.health.reapable(now, self.disconnect_grace)? {
            self.reap(&table_id).await?;
        }
        Ok(transitions)
    }

    /// Removes a table and resolves everything it still holds.
    pub async fn reap(&self, table_id: &str) -> Result<Option<FusionStats>, PipelineError> {
        let handle = {
            let mut guard = self
                .tables
                .write()
                .map_err(|_| PipelineError::RegistryPoisoned)?;
            guard.remove(table_id)
        };
        self.health.forget(table_id)?;

        let Some(handle) = handle else {
            return Ok(None);
        };
        tracing::info!(table_id = %table_id, "reaping disconnected table");
        let stats = handle.shutdown().await?;
        self.retire(&stats)?;
        Ok(Some(stats))
    }

    pub fn active_tables(&self) -> Result<Vec<TableId>, PipelineError> {
        let guard = self
            .tables
            .read()
            .map_err(|_| PipelineError::RegistryPoisoned)?;
        let mut ids: Vec<TableId> = guard.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    pub async fn snapshot(&self, table_id: &str) -> Result<Option<TableSnapshot>, PipelineError> {
        match self.existing(table_id)? {
            Some(table) => table.snapshot().await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn stats(&self, table_id: &str) -> Result<Option<FusionStats>, PipelineError> {
        Ok(self.snapshot(table_id).await?.map(|snapshot| snapshot.stats))
    }

    /// Live tables plus every table already retired.
    pub async fn aggregate_stats(&self) -> Result<FusionStats, PipelineError> {
        let mut total = *self
            .retired
            .lock()
            .map_err(|_| PipelineError::RegistryPoisoned)?;
        for table_id in self.active_tables()? {
            if let Some(stats) = self.stats(&table_id).await? {
                total.merge(&stats);
            }
        }
        Ok(total)
    }

    /// Drains every table; pending hands resolve as manual review.
    pub async fn shutdown(&self) -> Result<FusionStats, PipelineError> {
        let handles: Vec<(TableId, TableHandle)> = {
            let mut guard = self
                .tables
                .write()
                .map_err(|_| PipelineError::RegistryPoisoned)?;
            guard.drain().collect()
        };
        tracing::info!(tables = handles.len(), "shutting down orchestrator");

        for (table_id, handle) in handles {
            match handle.shutdown().await {
                Ok(stats) => self.retire(&stats)?,
                Err(err) => {
                    tracing::error!(table_id = %table_id, error = %err, "table shutdown failed")
                }
            }
        }
        let total = *self
            .retired
            .lock()
            .map_err(|_| PipelineError::RegistryPoisoned)?;
        Ok(total)
    }

    fn retire(&self, stats: &FusionStats) -> Result<(), PipelineError> {
        self.retired
            .lock()
            .map_err(|_| PipelineError::RegistryPoisoned)?
            .merge(stats);
        Ok(())
    }

    fn existing(&self, table_id: &str) -> Result<Option<TableSender>, PipelineError> {
        let guard = self
            .tables
            .read()
            .map_err(|_| PipelineError::RegistryPoisoned)?;
        Ok(guard.get(table_id).map(TableHandle::sender))
    }

    /// Looks up the table, starting its fusion task on first sight.
    fn table(&self, table_id: &str) -> Result<TableSender, PipelineError> {
        if let Some(sender) = self.existing(table_id)? {
            return Ok(sender);
        }
        let mut guard = self
            .tables
            .write()
            .map_err(|_| PipelineError::RegistryPoisoned)?;
        let handle = guard.entry(table_id.to_string()).or_insert_with(|| {
            TableHandle::spawn(
                table_id.to_string(),
                self.settings.clone(),
                self.fused_tx.clone(),
                self.events.clone(),
            )
        });
        Ok(handle.sender())
    }
}
