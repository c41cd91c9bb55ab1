use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ConsultantId;

pub type NotificationId = Uuid;

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Recipient {
    Consultant(ConsultantId),
    /// The shared admin channel
    Admin,
}

impl Recipient {
    /// Storage key: the consultant UUID, or the literal "admin".
    pub fn key(&self) -> String {
        match self {
            Recipient::Consultant(id) => id.to_string(),
            Recipient::Admin => "admin".to_string(),
        }
    }

    pub fn from_key(s: &str) -> Option<Self> {
        if s == "admin" {
            return Some(Recipient::Admin);
        }
        Uuid::parse_str(s).ok().map(Recipient::Consultant)
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "success" => Some(Severity::Success),
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    /// In-app route the UI can open, e.g. "/consultant/withdrawals"
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient: Recipient,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient,
            title: title.into(),
            message: message.into(),
            severity,
            link: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_key_roundtrip() {
        let id = Uuid::new_v4();
        for recipient in [Recipient::Admin, Recipient::Consultant(id)] {
            assert_eq!(Recipient::from_key(&recipient.key()), Some(recipient));
        }
        assert_eq!(Recipient::from_key("someone"), None);
    }

    #[test]
    fn test_notification_builder() {
        let n = Notification::new(Recipient::Admin, "Hi", "There", Severity::Info)
            .with_link("/admin/withdrawals");
        assert_eq!(n.link.as_deref(), Some("/admin/withdrawals"));
        assert_eq!(n.severity, Severity::Info);
    }
}
