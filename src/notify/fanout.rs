use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::NotificationSink;
use crate::domain::Notification;

/// Delivers each notification to every configured sink.
///
/// A failing sink does not stop delivery to the others. The fan-out only
/// reports failure when no sink accepted the notification.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        let mut delivered = 0usize;
        for (index, sink) in self.sinks.iter().enumerate() {
            match sink.notify(notification).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    error = %e,
                    sink = index,
                    recipient = %notification.recipient,
                    "Notification sink failed"
                ),
            }
        }

        if delivered == 0 && !self.sinks.is_empty() {
            anyhow::bail!("no sink accepted notification '{}'", notification.title);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Recipient, Severity};
    use crate::notify::MemorySink;

    fn notification() -> Notification {
        Notification::new(Recipient::Admin, "New request", "Check it", Severity::Info)
    }

    #[tokio::test]
    async fn test_delivers_to_all_sinks() {
        let a = Arc::new(MemorySink::new());
        let b = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new(vec![a.clone(), b.clone()]);

        fanout.notify(&notification()).await.unwrap();

        assert_eq!(a.sent().len(), 1);
        assert_eq!(b.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_one_failing_sink_does_not_block_others() {
        let broken = Arc::new(MemorySink::failing());
        let healthy = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new(vec![broken.clone()]).with_sink(healthy.clone());

        assert!(fanout.notify(&notification()).await.is_ok());
        assert!(broken.sent().is_empty());
        assert_eq!(healthy.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_all_sinks_failing_is_an_error() {
        let fanout = FanoutSink::new(vec![Arc::new(MemorySink::failing())]);
        assert!(fanout.notify(&notification()).await.is_err());
    }
}
