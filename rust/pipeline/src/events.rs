use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use handfuse_engine::fusion::FusedResult;
use handfuse_engine::grade::{GradeResult, Grading};
use handfuse_engine::record::TableId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::health::HealthTransition;

// Slow subscribers lose events once their buffer is full.
const EVENT_CHANNEL_BUFFER: usize = 1000;

pub type EventSender = mpsc::Sender<PipelineEvent>;
pub type EventReceiver = mpsc::Receiver<PipelineEvent>;

/// Everything the pipeline hands to its outside collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Every resolved hand, for persistence.
    HandGraded {
        fused: FusedResult,
        grading: Grading,
    },
    /// Grade A or B hands, for recording control.
    BroadcastCandidate {
        fused: FusedResult,
        grade: GradeResult,
    },
    HealthChanged {
        transition: HealthTransition,
    },
    /// Too many consecutive source disagreements on one table.
    FusionDegraded {
        table_id: TableId,
        consecutive_mismatches: u32,
    },
}

impl PipelineEvent {
    pub fn table_id(&self) -> &str {
        match self {
            PipelineEvent::HandGraded { fused, .. } => &fused.table_id,
            PipelineEvent::BroadcastCandidate { fused, .. } => &fused.table_id,
            PipelineEvent::HealthChanged { transition } => &transition.table_id,
            PipelineEvent::FusionDegraded { table_id, .. } => table_id,
        }
    }
}

/// Who a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    All,
    Table(TableId),
}

pub struct EventSubscription {
    bus: EventBus,
    topic: Topic,
    subscriber_id: usize,
    pub receiver: EventReceiver,
}

impl EventSubscription {
    pub fn receiver(&mut self) -> &mut EventReceiver {
        &mut self.receiver
    }

    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        self.receiver.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.topic, self.subscriber_id);
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Debug, Default)]
struct EventBusInner {
    subscribers: RwLock<HashMap<Topic, Vec<(usize, EventSender)>>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventSubscription {
        self.subscribe_topic(Topic::All)
    }

    pub fn subscribe_table(&self, table_id: impl Into<TableId>) -> EventSubscription {
        self.subscribe_topic(Topic::Table(table_id.into()))
    }

    fn subscribe_topic(&self, topic: Topic) -> EventSubscription {
        let (subscriber_id, receiver) = self.subscribe_raw(topic.clone());
        EventSubscription {
            bus: self.clone(),
            topic,
            subscriber_id,
            receiver,
        }
    }

    fn subscribe_raw(&self, topic: Topic) -> (usize, EventReceiver) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
        let mut guard = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.entry(topic.clone()).or_default().push((id, tx));

        tracing::debug!(topic = ?topic, subscriber_id = id, "subscribed to pipeline events");

        (id, rx)
    }

    pub fn publish(&self, event: PipelineEvent) {
        tracing::trace!(
            table_id = %event.table_id(),
            event = ?event,
            "publishing pipeline event"
        );

        let table_topic = Topic::Table(event.table_id().to_string());
        let targets: Vec<(Topic, usize, EventSender)> = {
            let guard = self
                .inner
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            [Topic::All, table_topic]
                .into_iter()
                .filter_map(|topic| guard.get(&topic).map(|list| (topic, list.clone())))
                .flat_map(|(topic, list)| {
                    list.into_iter()
                        .map(move |(id, tx)| (topic.clone(), id, tx))
                })
                .collect()
        };

        for (topic, id, sender) in targets {
            if let Err(e) = sender.try_send(event.clone()) {
                tracing::warn!(
                    topic = ?topic,
                    subscriber_id = id,
                    error = ?e,
                    "dropping subscriber that cannot keep up"
                );
                self.unsubscribe(&topic, id);
            }
        }
    }

    pub fn unsubscribe(&self, topic: &Topic, subscriber_id: usize) {
        let mut guard = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = guard.get_mut(topic) {
            list.retain(|(id, _)| *id != subscriber_id);
            if list.is_empty() {
                guard.remove(topic);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let guard = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard.values().map(|list| list.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn degraded(table: &str) -> PipelineEvent {
        PipelineEvent::FusionDegraded {
            table_id: table.into(),
            consecutive_mismatches: 3,
        }
    }

    #[test]
    fn subscription_drop_unsubscribes() {
        let bus = EventBus::new();
        {
            let _all = bus.subscribe();
            let _one = bus.subscribe_table("t1");
            assert_eq!(bus.subscriber_count(), 2);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn table_topic_only_sees_its_table() {
        let bus = EventBus::new();
        let mut all = bus.subscribe();
        let mut t1 = bus.subscribe_table("t1");

        bus.publish(degraded("t2"));
        bus.publish(degraded("t1"));

        assert_eq!(all.receiver.try_recv().unwrap().table_id(), "t2");
        assert_eq!(all.receiver.try_recv().unwrap().table_id(), "t1");
        assert_eq!(t1.receiver.try_recv().unwrap().table_id(), "t1");
        assert!(t1.receiver.try_recv().is_err());
    }

    #[test]
    fn stale_receiver_is_pruned() {
        let bus = EventBus::new();
        let (id, rx) = bus.subscribe_raw(Topic::All);
        drop(rx);
        bus.publish(degraded("t1"));
        assert_eq!(bus.subscriber_count(), 0);
        bus.unsubscribe(&Topic::All, id);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(degraded("t9")).unwrap();
        assert_eq!(json["type"], "fusion_degraded");
        assert_eq!(json["table_id"], "t9");
    }
}
