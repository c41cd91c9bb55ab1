use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{Notification, NotificationId, Recipient, Severity};
use crate::notify::NotificationSink;

use super::Repository;

/// A stored notification plus its read marker.
#[derive(Debug, Clone, Serialize)]
pub struct InboxEntry {
    #[serde(flatten)]
    pub notification: Notification,
    pub read: bool,
}

impl Repository {
    /// Notifications for one recipient, newest first.
    pub async fn list_notifications(
        &self,
        recipient: Recipient,
        unread_only: bool,
    ) -> Result<Vec<InboxEntry>> {
        let query = if unread_only {
            "SELECT id, recipient, title, message, severity, link, created_at, read_at FROM notifications WHERE recipient = ? AND read_at IS NULL ORDER BY created_at DESC"
        } else {
            "SELECT id, recipient, title, message, severity, link, created_at, read_at FROM notifications WHERE recipient = ? ORDER BY created_at DESC"
        };

        let rows = sqlx::query(query)
            .bind(recipient.key())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list notifications")?;

        rows.iter().map(Self::row_to_inbox_entry).collect()
    }

    /// Mark one of `recipient`'s notifications read. Returns false if it does
    /// not exist, belongs to someone else, or was already read.
    pub async fn mark_notification_read(
        &self,
        recipient: Recipient,
        id: NotificationId,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            "UPDATE notifications SET read_at = ? WHERE id = ? AND recipient = ? AND read_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(recipient.key())
        .execute(&self.pool)
        .await
        .context("Failed to mark notification read")?;
        Ok(result.rows_affected() > 0)
    }

    fn row_to_inbox_entry(row: &sqlx::sqlite::SqliteRow) -> Result<InboxEntry> {
        let id_str: String = row.get("id");
        let recipient_str: String = row.get("recipient");
        let severity_str: String = row.get("severity");
        let created_at_str: String = row.get("created_at");
        let read_at: Option<String> = row.get("read_at");

        Ok(InboxEntry {
            notification: Notification {
                id: Uuid::parse_str(&id_str).context("Invalid notification ID")?,
                recipient: Recipient::from_key(&recipient_str)
                    .ok_or_else(|| anyhow::anyhow!("Invalid recipient: {}", recipient_str))?,
                title: row.get("title"),
                message: row.get("message"),
                severity: Severity::from_str(&severity_str)
                    .ok_or_else(|| anyhow::anyhow!("Invalid severity: {}", severity_str))?,
                link: row.get("link"),
                created_at: Self::parse_timestamp(&created_at_str, "created_at")?,
            },
            read: read_at.is_some(),
        })
    }
}

#[async_trait]
impl NotificationSink for Repository {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient, title, message, severity, link, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(notification.id.to_string())
        .bind(notification.recipient.key())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.severity.as_str())
        .bind(&notification.link)
        .bind(notification.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to store notification")?;
        Ok(())
    }
}
