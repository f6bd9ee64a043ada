//! In-memory pub/sub bus for [`WorkflowEvent`]s (spec component B).
//!
//! Generalizes the coordination layer's original session/task-scoped
//! `EnsembleEvent` bus to a workflow-scoped one: every subscriber may filter
//! by `workflow_id` and/or a set of [`EventType`]s, and every workflow shares
//! one bounded broadcast channel rather than one per session.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::types::{EventType, WorkflowEvent};

/// Default channel capacity, overridable via `OrchestratorConfig` (spec §5
/// backpressure: bounded with drop-oldest-and-warn on lag).
pub const DEFAULT_BUS_CAPACITY: usize = 4096;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("no active subscribers for workflow {0}")]
    NoSubscribers(Uuid),
    #[error("event channel closed")]
    Closed,
}

pub type EventBusResult<T> = Result<T, EventBusError>;

/// A predicate subscribers use to narrow the firehose down to what they
/// actually want to observe.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub workflow_id: Option<Uuid>,
    pub event_types: Option<Vec<EventType>>,
}

impl EventFilter {
    pub fn for_workflow(workflow_id: Uuid) -> Self {
        Self {
            workflow_id: Some(workflow_id),
            event_types: None,
        }
    }

    pub fn with_event_types(mut self, event_types: Vec<EventType>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    fn matches(&self, event: &WorkflowEvent) -> bool {
        if let Some(workflow_id) = self.workflow_id {
            if event.workflow_id != workflow_id {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        true
    }
}

/// Broadcast-backed pub/sub bus shared across the orchestrator.
///
/// Cloning is cheap: it shares the same underlying `broadcast::Sender`.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

/// `Arc`-wrapped handle suitable for sharing across orchestrator tasks.
pub type SharedEventBus = Arc<EventBus>;

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn shared(capacity: usize) -> SharedEventBus {
        Arc::new(Self::new(capacity))
    }

    /// Publish an event to every current subscriber. Returns the number of
    /// receivers the event was delivered to; `0` is not an error — a
    /// workflow may have no live stream consumers at the moment it runs.
    pub fn publish(&self, event: WorkflowEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to the raw, unfiltered stream.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied client-side by [`FilteredReceiver`].
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver {
            inner: self.sender.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// A subscription narrowed to one [`EventFilter`].
///
/// On `RecvError::Lagged(n)`, `recv()` logs a warning (spec §5: bus
/// backpressure drops the oldest events and tells the subscriber it happened
/// rather than blocking the publisher) and transparently resumes from the
/// next available event instead of surfacing the lag as an error.
pub struct FilteredReceiver {
    inner: broadcast::Receiver<WorkflowEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub async fn recv(&mut self) -> EventBusResult<WorkflowEvent> {
        loop {
            match self.inner.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event bus subscriber lagged, dropping oldest events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return Err(EventBusError::Closed),
            }
        }
    }
}

/// Convenience helpers layered on top of [`EventBus`].
pub trait EventBusExt {
    /// Publish and immediately warn (rather than fail) if nobody is
    /// listening; workflows run unattended by default.
    fn publish_or_warn(&self, event: WorkflowEvent);
}

impl EventBusExt for EventBus {
    fn publish_or_warn(&self, event: WorkflowEvent) {
        let delivered = self.publish(event.clone());
        if delivered == 0 {
            tracing::debug!(
                workflow_id = %event.workflow_id,
                event_type = ?event.event_type,
                "published event with no active subscribers"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(workflow_id: Uuid, event_type: EventType) -> WorkflowEvent {
        WorkflowEvent::new(workflow_id, "architect", event_type)
    }

    #[tokio::test]
    async fn filtered_receiver_only_sees_matching_workflow() {
        let bus = EventBus::new(16);
        let wf_a = Uuid::new_v4();
        let wf_b = Uuid::new_v4();
        let mut rx = bus.subscribe_filtered(EventFilter::for_workflow(wf_a));

        bus.publish(event(wf_b, EventType::AgentStarted));
        bus.publish(event(wf_a, EventType::AgentCompleted));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.workflow_id, wf_a);
        assert_eq!(received.event_type, EventType::AgentCompleted);
    }

    #[tokio::test]
    async fn filtered_receiver_respects_event_type_filter() {
        let bus = EventBus::new(16);
        let wf = Uuid::new_v4();
        let mut rx = bus.subscribe_filtered(
            EventFilter::for_workflow(wf).with_event_types(vec![EventType::WorkflowCompleted]),
        );

        bus.publish(event(wf, EventType::AgentStarted));
        bus.publish(event(wf, EventType::WorkflowCompleted));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, EventType::WorkflowCompleted);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = EventBus::new(16);
        let delivered = bus.publish(event(Uuid::new_v4(), EventType::AgentStarted));
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn lagged_subscriber_resumes_instead_of_erroring() {
        let bus = EventBus::new(2);
        let wf = Uuid::new_v4();
        let mut rx = bus.subscribe_filtered(EventFilter::for_workflow(wf));

        for _ in 0..8 {
            bus.publish(event(wf, EventType::AgentStarted));
        }
        bus.publish(event(wf, EventType::WorkflowCompleted));

        let mut last = None;
        while let Ok(e) = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv())
            .await
            .unwrap_or(Err(EventBusError::Closed))
        {
            last = Some(e.event_type);
        }
        assert_eq!(last, Some(EventType::WorkflowCompleted));
    }
}
