//! Notifier
//!
//! Fans events out to notification channels. Delivery is fire-and-forget:
//! each channel gets one attempt on its own task and failures are only
//! logged.

mod log;
mod webhook;

use async_trait::async_trait;
use sluice_core::domain::event::{Event, Severity};
use std::sync::Arc;

pub use log::LogChannel;
pub use webhook::WebhookChannel;

/// A destination for run notifications
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, event_type: &str, message: &str, severity: Severity)
    -> anyhow::Result<()>;
}

#[derive(Clone, Default)]
pub struct Notifier {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl Notifier {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Dispatches the event to every channel without waiting for delivery
    pub fn emit(&self, event: Event) {
        let message = format_message(&event);
        let event_type = event.kind.as_str();

        for channel in &self.channels {
            let channel = Arc::clone(channel);
            let message = message.clone();
            let severity = event.severity;

            tokio::spawn(async move {
                if let Err(e) = channel.send(event_type, &message, severity).await {
                    tracing::warn!(
                        channel = channel.name(),
                        event_type,
                        "Notification delivery failed: {:#}",
                        e
                    );
                }
            });
        }
    }
}

fn format_message(event: &Event) -> String {
    let mut message = match event.run_id {
        Some(run_id) => format!("[{}] run {}: {}", event.pipeline, run_id, event.message),
        None => format!("[{}] {}", event.pipeline, event.message),
    };
    if let Some(kind) = event.error {
        message.push_str(&format!(" ({:?})", kind));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::domain::event::EventKind;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<(String, String, Severity)>>,
    }

    #[async_trait]
    impl NotificationChannel for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(
            &self,
            event_type: &str,
            message: &str,
            severity: Severity,
        ) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((event_type.to_string(), message.to_string(), severity));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl NotificationChannel for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn send(&self, _: &str, _: &str, _: Severity) -> anyhow::Result<()> {
            anyhow::bail!("chat service unavailable")
        }
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let recording = Arc::new(Recording::default());
        let channels: Vec<Arc<dyn NotificationChannel>> =
            vec![Arc::new(Failing), recording.clone() as Arc<dyn NotificationChannel>];
        let notifier = Notifier::new(channels);

        notifier.emit(Event::new(
            EventKind::RunFailed,
            "analysis",
            None,
            "task 'openai' failed",
        ));

        for _ in 0..100 {
            if !recording.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let sent = recording.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "run_failed");
        assert_eq!(sent[0].1, "[analysis] task 'openai' failed");
        assert_eq!(sent[0].2, Severity::Error);
    }

    #[test]
    fn test_message_carries_error_kind() {
        let warning = Event::new(EventKind::QualityWarning, "recommendation", None, "score 0.61");
        assert_eq!(
            format_message(&warning),
            "[recommendation] score 0.61 (DataQualityWarning)"
        );

        let skipped = Event::new(EventKind::RunSkipped, "nightly", None, "still active");
        assert_eq!(format_message(&skipped), "[nightly] still active");
    }
}
