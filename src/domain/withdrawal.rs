use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, ConsultantId, TransitionError};

pub type WithdrawalId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    /// Awaiting an admin decision
    Pending,
    /// Settled; funds moved to `withdrawn`
    Approved,
    /// Declined with a reason
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(WithdrawalStatus::Pending),
            "approved" => Some(WithdrawalStatus::Approved),
            "rejected" => Some(WithdrawalStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An admin's ruling on a pending withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum WithdrawalDecision {
    Approve,
    Reject { reason: String },
}

impl WithdrawalDecision {
    pub fn action(&self) -> &'static str {
        match self {
            WithdrawalDecision::Approve => "approve",
            WithdrawalDecision::Reject { .. } => "reject",
        }
    }
}

/// Where an approved withdrawal is paid to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_holder: String,
    pub iban: String,
}

impl BankDetails {
    pub fn new(
        bank_name: impl Into<String>,
        account_holder: impl Into<String>,
        iban: impl Into<String>,
    ) -> Self {
        Self {
            bank_name: bank_name.into().trim().to_string(),
            account_holder: account_holder.into().trim().to_string(),
            iban: iban.into().trim().to_string(),
        }
    }

    /// Names the first blank field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.bank_name.is_empty() {
            Some("bank name")
        } else if self.account_holder.is_empty() {
            Some("account holder")
        } else if self.iban.is_empty() {
            Some("IBAN")
        } else {
            None
        }
    }
}

/// A consultant's request to be paid out part of their available balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: WithdrawalId,
    pub consultant_id: ConsultantId,
    pub amount_cents: Cents,
    pub bank: BankDetails,
    pub status: WithdrawalStatus,
    /// Set when rejected
    pub rejection_reason: Option<String>,
    /// Admin-only; the one field that stays editable after a decision
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, when the request leaves `pending`
    pub processed_at: Option<DateTime<Utc>>,
}

impl WithdrawalRequest {
    pub fn new(consultant_id: ConsultantId, amount_cents: Cents, bank: BankDetails) -> Self {
        assert!(amount_cents > 0, "Withdrawal amount must be positive");
        Self {
            id: Uuid::new_v4(),
            consultant_id,
            amount_cents,
            bank,
            status: WithdrawalStatus::Pending,
            rejection_reason: None,
            admin_notes: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    /// Apply a decision, producing the processed request.
    ///
    /// Only a pending request can be decided, and a rejection must carry a
    /// non-blank reason. Notes, when given, replace any earlier notes.
    pub fn decide(
        &self,
        decision: &WithdrawalDecision,
        admin_notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        if self.status != WithdrawalStatus::Pending {
            return Err(TransitionError::InvalidEdge {
                from: self.status.as_str(),
                action: decision.action(),
            });
        }

        let mut next = self.clone();
        match decision {
            WithdrawalDecision::Approve => {
                next.status = WithdrawalStatus::Approved;
            }
            WithdrawalDecision::Reject { reason } => {
                if reason.trim().is_empty() {
                    return Err(TransitionError::MissingReason);
                }
                next.status = WithdrawalStatus::Rejected;
                next.rejection_reason = Some(reason.clone());
            }
        }
        if let Some(notes) = admin_notes {
            next.admin_notes = Some(notes);
        }
        next.processed_at = Some(now);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> BankDetails {
        BankDetails::new("Acme Bank", "Jo Doe", "DE89370400440532013000")
    }

    fn request(amount: Cents) -> WithdrawalRequest {
        WithdrawalRequest::new(Uuid::new_v4(), amount, bank())
    }

    #[test]
    fn test_new_request_is_pending() {
        let r = request(50000);
        assert_eq!(r.status, WithdrawalStatus::Pending);
        assert!(r.processed_at.is_none());
    }

    #[test]
    fn test_approve_sets_processed_at() {
        let now = Utc::now();
        let r = request(50000)
            .decide(&WithdrawalDecision::Approve, None, now)
            .unwrap();
        assert_eq!(r.status, WithdrawalStatus::Approved);
        assert_eq!(r.processed_at, Some(now));
        assert!(r.rejection_reason.is_none());
    }

    #[test]
    fn test_reject_requires_reason() {
        let result = request(50000).decide(
            &WithdrawalDecision::Reject {
                reason: "   ".into(),
            },
            None,
            Utc::now(),
        );
        assert_eq!(result, Err(TransitionError::MissingReason));
    }

    #[test]
    fn test_reject_stores_reason_and_notes() {
        let r = request(50000)
            .decide(
                &WithdrawalDecision::Reject {
                    reason: "IBAN does not match holder".into(),
                },
                Some("called the bank".into()),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(r.status, WithdrawalStatus::Rejected);
        assert_eq!(
            r.rejection_reason.as_deref(),
            Some("IBAN does not match holder")
        );
        assert_eq!(r.admin_notes.as_deref(), Some("called the bank"));
    }

    #[test]
    fn test_cannot_decide_twice() {
        let approved = request(50000)
            .decide(&WithdrawalDecision::Approve, None, Utc::now())
            .unwrap();

        let again = approved.decide(&WithdrawalDecision::Approve, None, Utc::now());
        assert_eq!(
            again,
            Err(TransitionError::InvalidEdge {
                from: "approved",
                action: "approve"
            })
        );

        let flip = approved.decide(
            &WithdrawalDecision::Reject {
                reason: "oops".into(),
            },
            None,
            Utc::now(),
        );
        assert!(matches!(flip, Err(TransitionError::InvalidEdge { .. })));
    }

    #[test]
    fn test_bank_details_missing_field() {
        assert_eq!(bank().missing_field(), None);
        assert_eq!(
            BankDetails::new(" ", "Jo", "DE00").missing_field(),
            Some("bank name")
        );
        assert_eq!(
            BankDetails::new("Acme", "Jo", "").missing_field(),
            Some("IBAN")
        );
    }

    #[test]
    #[should_panic(expected = "Withdrawal amount must be positive")]
    fn test_withdrawal_requires_positive_amount() {
        request(0);
    }
}
