use super::types::ExecutionEvent;
use serde_json::Value;
use tokio::sync::broadcast;

/// High-throughput event publisher for execution lifecycle events
///
/// Publishing never blocks and never fails; events sent while nobody is
/// subscribed are dropped.
///
/// ```rust
/// use cascade_core::events::{EventPublisher, ExecutionEvent};
///
/// # tokio_test::block_on(async {
/// let publisher = EventPublisher::new(16);
/// let mut receiver = publisher.subscribe();
///
/// publisher.publish(ExecutionEvent::StepStarted {
///     task_id: "task-1".to_string(),
///     step_id: "models".to_string(),
/// });
///
/// let published = receiver.recv().await.unwrap();
/// assert_eq!(published.name, "step.started");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: &'static str,
    pub event: ExecutionEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl PublishedEvent {
    /// JSON form of the event payload
    pub fn context(&self) -> Value {
        serde_json::to_value(&self.event).unwrap_or(Value::Null)
    }
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event
    ///
    /// Publishing with no subscribers is not an error; events are simply
    /// dropped.
    pub fn publish(&self, event: ExecutionEvent) {
        let published = PublishedEvent {
            name: event.name(),
            event,
            published_at: chrono::Utc::now(),
        };

        // send() only fails when there are no receivers
        let _ = self.sender.send(published);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::events;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::default();
        assert_eq!(publisher.subscriber_count(), 0);
        publisher.publish(ExecutionEvent::StepStarted {
            task_id: "t".to_string(),
            step_id: "a".to_string(),
        });
    }

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();

        publisher.publish(ExecutionEvent::PlanStarted {
            task_id: "t".to_string(),
            total_steps: 3,
            total_batches: 2,
        });
        publisher.publish(ExecutionEvent::BatchCompleted {
            task_id: "t".to_string(),
            batch_index: 0,
            succeeded: 1,
            failed: 0,
        });

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.name, events::PLAN_STARTED);
        assert_eq!(first.context()["event"], "plan_started");
        assert_eq!(first.context()["total_steps"], 3);

        let second = receiver.recv().await.unwrap();
        assert_eq!(second.name, events::BATCH_COMPLETED);
    }
}
