use async_trait::async_trait;

use crate::domain::Notification;

/// Pluggable destination for notifications.
///
/// Delivery is best-effort: callers log a failed `notify` and carry on, so an
/// implementation should not retry internally for long.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}
