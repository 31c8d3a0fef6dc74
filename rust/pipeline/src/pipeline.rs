use std::sync::Arc;

use handfuse_engine::classifier::{classify, Classification, SkipReason};
use handfuse_engine::fusion::{FusedResult, FusionStats, InferredResult};
use handfuse_engine::grade::{grade, GradingThresholds};
use handfuse_engine::record::{HandRecord, TableId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::events::{EventBus, EventSubscription, PipelineEvent};
use crate::health::{ChannelHealthMonitor, FeedSource, TableChannelState};
use crate::orchestrator::Orchestrator;
use crate::table::TableSnapshot;

const FUSED_CHANNEL_BUFFER: usize = 1000;

/// Running reconciliation service: classification, per-table fusion, grading
/// and feed health, wired together with channels.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    orchestrator: Arc<Orchestrator>,
    health: Arc<ChannelHealthMonitor>,
    events: EventBus,
    grading_task: JoinHandle<()>,
    sweep_task: JoinHandle<()>,
}

impl Pipeline {
    /// Validates `config` and spawns the grading stage and the health sweep.
    /// Must be called inside a tokio runtime.
    pub fn start(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let events = EventBus::new();
        let health = Arc::new(ChannelHealthMonitor::new(config.staleness_window));
        let (fused_tx, fused_rx) = mpsc::channel(FUSED_CHANNEL_BUFFER);
        let orchestrator = Arc::new(Orchestrator::new(
            &config,
            Arc::clone(&health),
            fused_tx,
            events.clone(),
        ));

        let grading_task = tokio::spawn(run_grading(
            fused_rx,
            config.grading_thresholds(),
            events.clone(),
        ));
        let sweep_task = tokio::spawn(run_health_sweep(
            Arc::clone(&orchestrator),
            config.health_check_interval,
        ));

        tracing::info!(
            match_window_ms = config.match_window.as_millis() as u64,
            staleness_window_ms = config.staleness_window.as_millis() as u64,
            secondary_threshold = config.secondary_confidence_threshold,
            "pipeline started"
        );

        Ok(Self {
            config,
            orchestrator,
            health,
            events,
            grading_task,
            sweep_task,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Classifies a structured-feed record and submits the best player's
    /// result for fusion. Skipped players are logged, never fatal.
    pub async fn ingest_record(&self, record: &HandRecord) -> Result<Classification, PipelineError> {
        let classification = classify(record);

        for skipped in &classification.skipped {
            match &skipped.reason {
                SkipReason::MalformedCard { .. }
                | SkipReason::TooManyHoleCards { .. }
                | SkipReason::InvalidHand { .. } => {
                    tracing::warn!(
                        table_id = %record.table_id,
                        hand_number = record.hand_number,
                        player = ?skipped.player,
                        reason = ?skipped.reason,
                        "player skipped"
                    )
                }
                SkipReason::NoHoleCards | SkipReason::IncompleteBoard { .. } => {
                    tracing::debug!(
                        table_id = %record.table_id,
                        hand_number = record.hand_number,
                        player = ?skipped.player,
                        reason = ?skipped.reason,
                        "player skipped"
                    )
                }
            }
        }

        match classification.best() {
            Some(best) => {
                self.orchestrator.submit_primary(best.clone()).await?;
            }
            None => {
                tracing::debug!(
                    table_id = %record.table_id,
                    hand_number = record.hand_number,
                    "no rankable player in record"
                );
                self.orchestrator
                    .touch(&record.table_id, FeedSource::Primary)
                    .await?;
            }
        }
        Ok(classification)
    }

    pub async fn ingest_inferred(&self, result: InferredResult) -> Result<(), PipelineError> {
        self.orchestrator.submit_inferred(result).await
    }

    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    pub fn subscribe_table(&self, table_id: impl Into<TableId>) -> EventSubscription {
        self.events.subscribe_table(table_id)
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn channel_state(&self, table_id: &str) -> Result<Option<TableChannelState>, PipelineError> {
        self.health.state(table_id)
    }

    pub async fn snapshot(&self, table_id: &str) -> Result<Option<TableSnapshot>, PipelineError> {
        self.orchestrator.snapshot(table_id).await
    }

    pub async fn aggregate_stats(&self) -> Result<FusionStats, PipelineError> {
        self.orchestrator.aggregate_stats().await
    }

    /// Runs one health pass immediately instead of waiting for the sweep.
    pub async fn check_health(&self) -> Result<(), PipelineError> {
        self.orchestrator.check_health(Instant::now()).await.map(|_| ())
    }

    /// Stops the sweep, resolves every pending hand, lets grading finish the
    /// last results and returns the final counters.
    pub async fn shutdown(self) -> Result<FusionStats, PipelineError> {
        self.sweep_task.abort();
        let _ = self.sweep_task.await;

        let stats = self.orchestrator.shutdown().await?;
        // The orchestrator owns the last fused-result sender.
        drop(self.orchestrator);
        if let Err(err) = self.grading_task.await {
            tracing::error!(error = %err, "grading stage ended abnormally");
        }

        tracing::info!(
            total = stats.total,
            cross_validated = stats.cross_validated,
            review_flagged = stats.review_flagged,
            undetected = stats.undetected,
            "pipeline stopped"
        );
        Ok(stats)
    }
}

async fn run_grading(
    mut fused_rx: mpsc::Receiver<FusedResult>,
    thresholds: GradingThresholds,
    events: EventBus,
) {
    while let Some(fused) = fused_rx.recv().await {
        let grading = grade(&fused, &thresholds);
        let result = *grading.result();

        tracing::info!(
            table_id = %fused.table_id,
            hand_number = fused.hand_number,
            grade = ?result.grade,
            criteria_met = result.criteria_met,
            complete = grading.is_complete(),
            "hand graded"
        );

        let candidate = result
            .broadcast_eligible
            .then(|| PipelineEvent::BroadcastCandidate {
                fused: fused.clone(),
                grade: result,
            });
        events.publish(PipelineEvent::HandGraded { fused, grading });
        if let Some(candidate) = candidate {
            events.publish(candidate);
        }
    }
    tracing::debug!("grading stage drained");
}

async fn run_health_sweep(orchestrator: Arc<Orchestrator>, every: std::time::Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(err) = orchestrator.check_health(Instant::now()).await {
            tracing::warn!(error = %err, "health check failed");
        }
    }
}
