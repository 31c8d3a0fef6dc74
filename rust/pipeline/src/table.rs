//! Per-table fusion actor.
//!
//! Each table runs one task that owns every pending hand for that table.
//! Arrivals, timer expiries and health updates all reach it through one
//! inbox, so transitions for a hand key are strictly serialized.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use handfuse_engine::classifier::HandResult;
use handfuse_engine::fusion::{
    FusedResult, FusionOutcome, FusionPolicy, FusionStats, HandKey, InferredResult, Resolution,
};
use handfuse_engine::record::TableId;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};

use crate::errors::PipelineError;
use crate::events::{EventBus, PipelineEvent};
use crate::health::{FeedSource, Liveness};

const TABLE_INBOX_BUFFER: usize = 256;
// Resolved hand numbers remembered to drop late arrivals.
const RESOLVED_HISTORY: usize = 512;

#[derive(Debug, Clone)]
pub struct TableSettings {
    pub policy: FusionPolicy,
    pub match_window: Duration,
    pub mismatch_threshold: u32,
}

#[derive(Debug)]
enum TableMessage {
    Primary(HandResult),
    Secondary(InferredResult),
    Health {
        primary: Liveness,
        secondary: Liveness,
    },
    Expired {
        hand_number: u32,
        generation: u64,
    },
    Snapshot(oneshot::Sender<TableSnapshot>),
    Shutdown(oneshot::Sender<FusionStats>),
}

/// Point-in-time view of one table's fusion state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSnapshot {
    pub table_id: TableId,
    pub pending_hands: Vec<u32>,
    pub stats: FusionStats,
    pub primary: Liveness,
    pub secondary: Liveness,
    pub consecutive_mismatches: u32,
}

/// Cancellable match-window timer. Dropping it cancels the pending expiry.
#[derive(Debug)]
struct MatchTimer {
    handle: AbortHandle,
}

impl MatchTimer {
    fn start(
        inbox: mpsc::WeakSender<TableMessage>,
        hand_number: u32,
        generation: u64,
        window: Duration,
    ) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(tx) = inbox.upgrade() {
                let _ = tx
                    .send(TableMessage::Expired {
                        hand_number,
                        generation,
                    })
                    .await;
            }
        });
        Self {
            handle: task.abort_handle(),
        }
    }

    fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for MatchTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug)]
struct PendingHand {
    primary: Option<HandResult>,
    secondary: Option<InferredResult>,
    generation: u64,
    timer: Option<MatchTimer>,
}

impl PendingHand {
    fn waiting_on(&self) -> Option<FeedSource> {
        match (&self.primary, &self.secondary) {
            (Some(_), None) => Some(FeedSource::Secondary),
            (None, Some(_)) => Some(FeedSource::Primary),
            _ => None,
        }
    }
}

/// Cloneable sending half used by the orchestrator to route into a table.
#[derive(Debug, Clone)]
pub struct TableSender {
    table_id: TableId,
    tx: mpsc::Sender<TableMessage>,
}

impl TableSender {
    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    async fn send(&self, message: TableMessage) -> Result<(), PipelineError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| PipelineError::TableClosed(self.table_id.clone()))
    }

    pub async fn submit_primary(&self, result: HandResult) -> Result<(), PipelineError> {
        self.send(TableMessage::Primary(result)).await
    }

    pub async fn submit_inferred(&self, result: InferredResult) -> Result<(), PipelineError> {
        self.send(TableMessage::Secondary(result)).await
    }

    pub async fn apply_health(
        &self,
        primary: Liveness,
        secondary: Liveness,
    ) -> Result<(), PipelineError> {
        self.send(TableMessage::Health { primary, secondary }).await
    }

    pub async fn snapshot(&self) -> Result<TableSnapshot, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.send(TableMessage::Snapshot(reply)).await?;
        rx.await
            .map_err(|_| PipelineError::TableClosed(self.table_id.clone()))
    }
}

/// Owning handle: the only way to stop the table task.
#[derive(Debug)]
pub struct TableHandle {
    sender: TableSender,
    task: JoinHandle<()>,
}

impl TableHandle {
    pub fn spawn(
        table_id: TableId,
        settings: TableSettings,
        fused_tx: mpsc::Sender<FusedResult>,
        events: EventBus,
    ) -> Self {
        let (tx, rx) = mpsc::channel(TABLE_INBOX_BUFFER);
        let fusion = TableFusion {
            table_id: table_id.clone(),
            settings,
            pending: HashMap::new(),
            resolved: HashSet::new(),
            resolved_order: VecDeque::new(),
            next_generation: 0,
            primary: Liveness::Fresh,
            secondary: Liveness::Fresh,
            consecutive_mismatches: 0,
            stats: FusionStats::default(),
            inbox: tx.downgrade(),
            fused_tx,
            events,
        };
        tracing::info!(table_id = %table_id, "starting table fusion task");
        let task = tokio::spawn(fusion.run(rx));
        Self {
            sender: TableSender { table_id, tx },
            task,
        }
    }

    pub fn sender(&self) -> TableSender {
        self.sender.clone()
    }

    /// Resolves every pending hand, waits for the task to exit and returns
    /// the table's final counters.
    pub async fn shutdown(self) -> Result<FusionStats, PipelineError> {
        let table_id = self.sender.table_id.clone();
        let (reply, rx) = oneshot::channel();
        self.sender.send(TableMessage::Shutdown(reply)).await?;
        let stats = rx
            .await
            .map_err(|_| PipelineError::TableClosed(table_id.clone()))?;
        if let Err(err) = self.task.await {
            tracing::error!(table_id = %table_id, error = %err, "table task ended abnormally");
        }
        Ok(stats)
    }
}

struct TableFusion {
    table_id: TableId,
    settings: TableSettings,
    pending: HashMap<u32, PendingHand>,
    resolved: HashSet<u32>,
    resolved_order: VecDeque<u32>,
    next_generation: u64,
    primary: Liveness,
    secondary: Liveness,
    consecutive_mismatches: u32,
    stats: FusionStats,
    inbox: mpsc::WeakSender<TableMessage>,
    fused_tx: mpsc::Sender<FusedResult>,
    events: EventBus,
}

impl TableFusion {
    async fn run(mut self, mut rx: mpsc::Receiver<TableMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                TableMessage::Primary(result) => self.on_primary(result).await,
                TableMessage::Secondary(result) => self.on_secondary(result).await,
                TableMessage::Health { primary, secondary } => {
                    self.on_health(primary, secondary).await
                }
                TableMessage::Expired {
                    hand_number,
                    generation,
                } => self.on_expired(hand_number, generation).await,
                TableMessage::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                TableMessage::Shutdown(reply) => {
                    self.drain().await;
                    let _ = reply.send(self.stats);
                    return;
                }
            }
        }
        // Every sender dropped without an explicit shutdown.
        self.drain().await;
    }

    fn liveness(&self, source: FeedSource) -> Liveness {
        match source {
            FeedSource::Primary => self.primary,
            FeedSource::Secondary => self.secondary,
        }
    }

    async fn on_primary(&mut self, result: HandResult) {
        let hand_number = result.hand_number;
        if let Some(pending) = self.pending.get_mut(&hand_number) {
            if pending.primary.is_some() {
                tracing::info!(
                    table_id = %self.table_id,
                    hand_number,
                    source = %FeedSource::Primary,
                    "replacing duplicate observation"
                );
                pending.primary = Some(result);
                return;
            }
            pending.primary = Some(result);
            self.resolve(hand_number, Resolution::Matched).await;
            return;
        }
        self.open(
            hand_number,
            PendingHand {
                primary: Some(result),
                secondary: None,
                generation: 0,
                timer: None,
            },
            FeedSource::Primary,
        )
        .await;
    }

    async fn on_secondary(&mut self, result: InferredResult) {
        let hand_number = result.hand_number;
        if let Some(pending) = self.pending.get_mut(&hand_number) {
            if pending.secondary.is_some() {
                tracing::info!(
                    table_id = %self.table_id,
                    hand_number,
                    source = %FeedSource::Secondary,
                    "replacing duplicate observation"
                );
                pending.secondary = Some(result);
                return;
            }
            pending.secondary = Some(result);
            self.resolve(hand_number, Resolution::Matched).await;
            return;
        }
        self.open(
            hand_number,
            PendingHand {
                primary: None,
                secondary: Some(result),
                generation: 0,
                timer: None,
            },
            FeedSource::Secondary,
        )
        .await;
    }

    /// First arrival for a hand: wait for the counterpart unless its feed is
    /// already known to be down. Arrivals for a hand that already resolved
    /// are dropped.
    async fn open(&mut self, hand_number: u32, mut pending: PendingHand, arrived: FeedSource) {
        if self.resolved.contains(&hand_number) {
            tracing::warn!(
                table_id = %self.table_id,
                hand_number,
                source = %arrived,
                "hand already resolved, dropping late arrival"
            );
            return;
        }

        self.next_generation += 1;
        pending.generation = self.next_generation;
        let stale_counterpart = self.liveness(arrived.counterpart()) == Liveness::Stale;
        if !stale_counterpart {
            pending.timer = Some(MatchTimer::start(
                self.inbox.clone(),
                hand_number,
                pending.generation,
                self.settings.match_window,
            ));
        }
        self.pending.insert(hand_number, pending);

        tracing::debug!(
            table_id = %self.table_id,
            hand_number,
            source = %arrived,
            "awaiting counterpart"
        );

        if stale_counterpart {
            self.resolve(hand_number, Resolution::SourceStale).await;
        }
    }

    async fn on_expired(&mut self, hand_number: u32, generation: u64) {
        let current = self
            .pending
            .get(&hand_number)
            .is_some_and(|pending| pending.generation == generation);
        if current {
            self.resolve(hand_number, Resolution::WindowExpired).await;
        } else {
            tracing::trace!(
                table_id = %self.table_id,
                hand_number,
                generation,
                "ignoring stale expiry"
            );
        }
    }

    /// Hands still waiting on a feed that just went stale resolve now.
    async fn on_health(&mut self, primary: Liveness, secondary: Liveness) {
        self.primary = primary;
        self.secondary = secondary;

        let mut stalled: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, pending)| {
                pending
                    .waiting_on()
                    .is_some_and(|source| self.liveness(source) == Liveness::Stale)
            })
            .map(|(hand_number, _)| *hand_number)
            .collect();
        stalled.sort_unstable();
        for hand_number in stalled {
            self.resolve(hand_number, Resolution::SourceStale).await;
        }
    }

    async fn drain(&mut self) {
        let mut hands: Vec<u32> = self.pending.keys().copied().collect();
        hands.sort_unstable();
        if !hands.is_empty() {
            tracing::info!(
                table_id = %self.table_id,
                pending = hands.len(),
                "resolving pending hands for shutdown"
            );
        }
        for hand_number in hands {
            if let Some(timer) = self.pending.remove(&hand_number).and_then(|p| p.timer) {
                timer.cancel();
            }
            let key = HandKey::new(self.table_id.clone(), hand_number);
            let fused = FusionPolicy::manual(&key, Resolution::Shutdown);
            self.emit(fused).await;
        }
    }

    async fn resolve(&mut self, hand_number: u32, resolution: Resolution) {
        let Some(mut pending) = self.pending.remove(&hand_number) else {
            return;
        };
        if let Some(timer) = pending.timer.take() {
            timer.cancel();
        }
        let key = HandKey::new(self.table_id.clone(), hand_number);
        let fused = self.settings.policy.decide(
            &key,
            pending.primary.as_ref(),
            pending.secondary.as_ref(),
            resolution,
        );
        self.track_agreement(fused.outcome);
        self.emit(fused).await;
    }

    fn track_agreement(&mut self, outcome: FusionOutcome) {
        match outcome {
            FusionOutcome::Ambiguous => {
                self.consecutive_mismatches += 1;
                if self.consecutive_mismatches == self.settings.mismatch_threshold {
                    tracing::warn!(
                        table_id = %self.table_id,
                        consecutive_mismatches = self.consecutive_mismatches,
                        "sources keep disagreeing"
                    );
                    self.events.publish(PipelineEvent::FusionDegraded {
                        table_id: self.table_id.clone(),
                        consecutive_mismatches: self.consecutive_mismatches,
                    });
                }
            }
            FusionOutcome::CrossValidated => {
                if self.consecutive_mismatches >= self.settings.mismatch_threshold {
                    tracing::info!(table_id = %self.table_id, "sources agree again");
                }
                self.consecutive_mismatches = 0;
            }
            _ => {}
        }
    }

    async fn emit(&mut self, fused: FusedResult) {
        self.stats.record(&fused);
        self.remember(fused.hand_number);

        tracing::info!(
            table_id = %fused.table_id,
            hand_number = fused.hand_number,
            outcome = ?fused.outcome,
            resolution = ?fused.resolution,
            category = ?fused.category,
            requires_review = fused.requires_review,
            "hand resolved"
        );

        if self.fused_tx.send(fused).await.is_err() {
            tracing::warn!(table_id = %self.table_id, "fused result receiver closed");
        }
    }

    fn remember(&mut self, hand_number: u32) {
        if self.resolved.insert(hand_number) {
            self.resolved_order.push_back(hand_number);
        }
        while self.resolved_order.len() > RESOLVED_HISTORY {
            if let Some(oldest) = self.resolved_order.pop_front() {
                self.resolved.remove(&oldest);
            }
        }
    }

    fn snapshot(&self) -> TableSnapshot {
        let mut pending_hands: Vec<u32> = self.pending.keys().copied().collect();
        pending_hands.sort_unstable();
        TableSnapshot {
            table_id: self.table_id.clone(),
            pending_hands,
            stats: self.stats,
            primary: self.primary,
            secondary: self.secondary,
            consecutive_mismatches: self.consecutive_mismatches,
        }
    }
}
