use async_trait::async_trait;
use sluice_core::domain::event::Severity;

use super::NotificationChannel;

/// Writes notifications to the tracing log
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(
        &self,
        event_type: &str,
        message: &str,
        severity: Severity,
    ) -> anyhow::Result<()> {
        match severity {
            Severity::Info => tracing::info!(event_type, "{}", message),
            Severity::Warning => tracing::warn!(event_type, "{}", message),
            Severity::Error => tracing::error!(event_type, "{}", message),
        }
        Ok(())
    }
}
