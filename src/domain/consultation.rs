use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{Cents, ConsultantId, TransitionError};

pub type ServiceId = Uuid;

/// Publication state of a consultation service.
///
/// ```text
/// pending  --approve-->         active
/// pending  --reject(reason)-->  rejected
/// active   --convert(reason)--> draft
/// draft    --republish-->       active
/// rejected --republish-->       active
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Submitted, awaiting moderation
    Pending,
    /// Publicly listed and bookable
    Active,
    /// Declined at moderation
    Rejected,
    /// Previously active, hidden by an admin
    Draft,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::Active => "active",
            ServiceStatus::Rejected => "rejected",
            ServiceStatus::Draft => "draft",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(ServiceStatus::Pending),
            "active" => Some(ServiceStatus::Active),
            "rejected" => Some(ServiceStatus::Rejected),
            "draft" => Some(ServiceStatus::Draft),
            _ => None,
        }
    }

    /// The status reached by applying `action`, if that edge exists.
    pub fn next(&self, action: ModerationAction) -> Option<ServiceStatus> {
        use ModerationAction::*;
        use ServiceStatus::*;

        match (*self, action) {
            (Pending, Approve) => Some(Active),
            (Pending, Reject) => Some(Rejected),
            (Active, ConvertToDraft) => Some(Draft),
            (Draft, Republish) | (Rejected, Republish) => Some(Active),
            _ => None,
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, ServiceStatus::Active)
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    Approve,
    Reject,
    ConvertToDraft,
    Republish,
}

impl ModerationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationAction::Approve => "approve",
            ModerationAction::Reject => "reject",
            ModerationAction::ConvertToDraft => "convert to draft",
            ModerationAction::Republish => "republish",
        }
    }
}

/// Content fields a consultant may change. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<Cents>,
    pub duration_minutes: Option<i64>,
}

impl ServiceEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price_cents.is_none()
            && self.duration_minutes.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("price must be positive, got {0}")]
    NonPositivePrice(Cents),

    #[error("duration must be a positive number of minutes, got {0}")]
    NonPositiveDuration(i64),
}

/// A service offering defined by a consultant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationService {
    pub id: ServiceId,
    pub consultant_id: ConsultantId,
    pub title: String,
    pub description: String,
    pub price_cents: Cents,
    pub duration_minutes: i64,
    pub status: ServiceStatus,
    /// Rejection cause, or the admin's timestamped note after a draft conversion
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConsultationService {
    pub fn new(
        consultant_id: ConsultantId,
        title: impl Into<String>,
        description: impl Into<String>,
        price_cents: Cents,
        duration_minutes: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            consultant_id,
            title: title.into().trim().to_string(),
            description: description.into(),
            price_cents,
            duration_minutes,
            status: ServiceStatus::Pending,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Content checks shared by creation and editing.
    pub fn validate(&self) -> Result<(), ServiceValidationError> {
        if self.title.trim().is_empty() {
            return Err(ServiceValidationError::EmptyTitle);
        }
        if self.price_cents <= 0 {
            return Err(ServiceValidationError::NonPositivePrice(self.price_cents));
        }
        if self.duration_minutes <= 0 {
            return Err(ServiceValidationError::NonPositiveDuration(
                self.duration_minutes,
            ));
        }
        Ok(())
    }

    /// Apply content edits. Status and reason are never touched here.
    pub fn edited(&self, edit: &ServiceEdit, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        if let Some(title) = &edit.title {
            next.title = title.trim().to_string();
        }
        if let Some(description) = &edit.description {
            next.description = description.clone();
        }
        if let Some(price) = edit.price_cents {
            next.price_cents = price;
        }
        if let Some(duration) = edit.duration_minutes {
            next.duration_minutes = duration;
        }
        next.updated_at = now;
        next
    }

    /// Move along one edge of the moderation state machine.
    ///
    /// `reason` is required for `Reject` and `ConvertToDraft` and ignored
    /// otherwise. Draft conversions store the reason behind a UTC timestamp so
    /// the consultant can tell when the listing was pulled.
    pub fn transition(
        &self,
        action: ModerationAction,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        let to = self
            .status
            .next(action)
            .ok_or(TransitionError::InvalidEdge {
                from: self.status.as_str(),
                action: action.as_str(),
            })?;

        let mut next = self.clone();
        next.rejection_reason = match action {
            ModerationAction::Reject => Some(required_reason(reason)?.to_string()),
            ModerationAction::ConvertToDraft => {
                let reason = required_reason(reason)?;
                Some(format!("[{}] {}", now.format("%Y-%m-%d %H:%M UTC"), reason))
            }
            ModerationAction::Republish => None,
            ModerationAction::Approve => self.rejection_reason.clone(),
        };
        next.status = to;
        next.updated_at = now;
        Ok(next)
    }

    pub fn is_public(&self) -> bool {
        self.status.is_public()
    }
}

fn required_reason(reason: Option<&str>) -> Result<&str, TransitionError> {
    // Blank-only text counts as missing; otherwise stored verbatim
    reason
        .filter(|r| !r.trim().is_empty())
        .ok_or(TransitionError::MissingReason)
}
