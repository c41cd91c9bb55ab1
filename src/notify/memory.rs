use std::sync::Mutex;

use async_trait::async_trait;

use super::NotificationSink;
use crate::domain::{Notification, Recipient};

/// Keeps every notification in memory, in emission order.
///
/// Can be switched into a failing mode to exercise best-effort delivery.
#[derive(Default)]
pub struct MemorySink {
    sent: Mutex<Vec<Notification>>,
    failing: Mutex<bool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose `notify` always errors and records nothing.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_to(&self, recipient: Recipient) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.recipient == recipient)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            anyhow::bail!("notification sink unavailable");
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
        Ok(())
    }
}
