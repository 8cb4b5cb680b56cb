//! Completion event bus
//!
//! Every run that reaches a terminal status is published here. The
//! orchestrator's dependency listener consumes it to trigger downstream
//! pipelines; tests and other observers may subscribe as well.

use sluice_core::domain::event::RunCompleted;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct CompletionBus {
    sender: broadcast::Sender<RunCompleted>,
}

impl CompletionBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes a completion; having no subscribers is not an error
    pub fn publish(&self, completed: RunCompleted) {
        let receivers = self.sender.send(completed).unwrap_or(0);
        tracing::trace!(receivers, "Published run completion");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunCompleted> {
        self.sender.subscribe()
    }
}

impl Default for CompletionBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sluice_core::domain::run::RunStatus;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_subscribers_receive_completions() {
        let bus = CompletionBus::default();
        let mut rx = bus.subscribe();

        bus.publish(RunCompleted {
            pipeline: "data-collection".to_string(),
            run_id: Uuid::new_v4(),
            status: RunStatus::Succeeded,
            completed_at: Utc::now(),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.pipeline, "data-collection");
        assert_eq!(received.status, RunStatus::Succeeded);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = CompletionBus::default();
        bus.publish(RunCompleted {
            pipeline: "main-ci".to_string(),
            run_id: Uuid::new_v4(),
            status: RunStatus::Failed,
            completed_at: Utc::now(),
        });
    }
}
