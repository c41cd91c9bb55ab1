use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::SettlementPolicy;
use crate::domain::{
    BalanceError, BalanceMutation, BankDetails, Cents, ConsultantBalance, ConsultantId,
    TransitionError, WithdrawalDecision, WithdrawalId, WithdrawalRequest, format_cents,
};
use crate::storage::{CasOutcome, LedgerStore, WithdrawalFilter};

use super::AppError;

/// Owns the withdrawal lifecycle and every balance mutation.
///
/// Submission validates against the available balance but does not reserve
/// it: funds stay available until an admin approves, at which point the
/// decision and the deduction are committed together.
pub struct SettlementEngine {
    store: Arc<dyn LedgerStore>,
    policy: SettlementPolicy,
}

/// Result of deciding a withdrawal request
#[derive(Debug, Clone)]
pub struct Settlement {
    pub request: WithdrawalRequest,
    /// The consultant's balance after settlement; `None` for a rejection
    pub balance: Option<ConsultantBalance>,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn LedgerStore>, policy: SettlementPolicy) -> Self {
        Self { store, policy }
    }

    // ========================
    // Balances
    // ========================

    /// Current balance; a consultant with no recorded earnings has a zero balance.
    pub async fn balance(&self, consultant_id: ConsultantId) -> Result<ConsultantBalance, AppError> {
        Ok(self
            .store
            .get_balance(consultant_id)
            .await?
            .unwrap_or_else(|| ConsultantBalance::empty(consultant_id)))
    }

    /// Credit an earning reported by the upstream payment flow.
    pub async fn record_earning(
        &self,
        consultant_id: ConsultantId,
        amount_cents: Cents,
        cleared: bool,
    ) -> Result<ConsultantBalance, AppError> {
        let balance = self
            .mutate_balance(
                consultant_id,
                BalanceMutation::Earn {
                    amount: amount_cents,
                    cleared,
                },
            )
            .await?;

        info!(
            consultant_id = %consultant_id,
            amount = amount_cents,
            cleared,
            "Earning recorded"
        );
        Ok(balance)
    }

    /// Move funds whose clearing period has elapsed from pending to available.
    pub async fn release_pending(
        &self,
        consultant_id: ConsultantId,
        amount_cents: Cents,
    ) -> Result<ConsultantBalance, AppError> {
        let balance = self
            .mutate_balance(
                consultant_id,
                BalanceMutation::Release {
                    amount: amount_cents,
                },
            )
            .await?;

        info!(consultant_id = %consultant_id, amount = amount_cents, "Pending funds released");
        Ok(balance)
    }

    /// Read, apply, write with a version guard; re-read on a lost race.
    async fn mutate_balance(
        &self,
        consultant_id: ConsultantId,
        mutation: BalanceMutation,
    ) -> Result<ConsultantBalance, AppError> {
        for attempt in 1..=self.policy.balance_retries.max(1) {
            let current = self.balance(consultant_id).await?;
            let next = current.apply(mutation).map_err(balance_error)?;

            match self.store.save_balance(&next).await? {
                CasOutcome::Committed(stored) => return Ok(stored),
                CasOutcome::Stale => {
                    debug!(
                        consultant_id = %consultant_id,
                        attempt,
                        "Balance version moved, retrying"
                    );
                }
            }
        }

        Err(AppError::Conflict(format!(
            "balance of consultant {}",
            consultant_id
        )))
    }

    // ========================
    // Withdrawals
    // ========================

    /// Open a withdrawal request against the consultant's available balance.
    pub async fn submit_withdrawal(
        &self,
        consultant_id: ConsultantId,
        amount_cents: Cents,
        bank: BankDetails,
    ) -> Result<WithdrawalRequest, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }
        if amount_cents < self.policy.minimum_withdrawal {
            return Err(AppError::InvalidAmount(format!(
                "Minimum withdrawal is {}, requested {}",
                format_cents(self.policy.minimum_withdrawal),
                format_cents(amount_cents)
            )));
        }
        if let Some(field) = bank.missing_field() {
            return Err(AppError::InvalidBankDetails(field));
        }

        let balance = self.balance(consultant_id).await?;
        if amount_cents > balance.available {
            return Err(AppError::InsufficientBalance {
                available: balance.available,
                requested: amount_cents,
            });
        }

        let request = WithdrawalRequest::new(consultant_id, amount_cents, bank);
        self.store.insert_withdrawal(&request).await?;

        info!(
            withdrawal_id = %request.id,
            consultant_id = %consultant_id,
            amount = amount_cents,
            "Withdrawal requested"
        );
        Ok(request)
    }

    /// Approve or reject a pending request.
    ///
    /// The status change and, for an approval, the balance deduction land in
    /// one store transaction guarded on the request still being pending, so a
    /// concurrent second decision fails instead of settling twice.
    pub async fn decide_withdrawal(
        &self,
        id: WithdrawalId,
        decision: WithdrawalDecision,
        admin_notes: Option<String>,
    ) -> Result<Settlement, AppError> {
        let request = self.get_withdrawal(id).await?;
        let decided = request
            .decide(&decision, admin_notes, Utc::now())
            .map_err(|e| withdrawal_transition_error(&request, e))?;

        match self.store.commit_decision(&decided).await? {
            CasOutcome::Committed(balance) => {
                info!(
                    withdrawal_id = %id,
                    consultant_id = %decided.consultant_id,
                    amount = decided.amount_cents,
                    status = %decided.status,
                    "Withdrawal decided"
                );
                Ok(Settlement {
                    request: decided,
                    balance,
                })
            }
            CasOutcome::Stale => {
                let latest = self.get_withdrawal(id).await?;
                Err(AppError::InvalidStateTransition {
                    entity: "withdrawal request",
                    id: id.to_string(),
                    from: latest.status.to_string(),
                    action: decision.action(),
                })
            }
        }
    }

    /// Replace the admin notes on a request, in any status.
    pub async fn annotate_withdrawal(
        &self,
        id: WithdrawalId,
        notes: Option<String>,
    ) -> Result<WithdrawalRequest, AppError> {
        let mut request = self.get_withdrawal(id).await?;
        let notes = notes.filter(|n| !n.trim().is_empty());
        self.store.update_admin_notes(id, notes.as_deref()).await?;
        request.admin_notes = notes;
        Ok(request)
    }

    pub async fn get_withdrawal(&self, id: WithdrawalId) -> Result<WithdrawalRequest, AppError> {
        self.store
            .get_withdrawal(id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                entity: "Withdrawal request",
                id: id.to_string(),
            })
    }

    pub async fn list_withdrawals(
        &self,
        filter: &WithdrawalFilter,
    ) -> Result<Vec<WithdrawalRequest>, AppError> {
        Ok(self.store.list_withdrawals(filter).await?)
    }
}

fn balance_error(err: BalanceError) -> AppError {
    match err {
        BalanceError::NonPositiveAmount(_) => {
            AppError::InvalidAmount("Amount must be positive".to_string())
        }
        BalanceError::InsufficientPending { pending, requested } => {
            AppError::InvalidAmount(format!(
                "Cannot release {}, only {} pending",
                format_cents(requested),
                format_cents(pending)
            ))
        }
        BalanceError::Overflow => AppError::InvalidAmount("Amount is too large".to_string()),
    }
}

fn withdrawal_transition_error(request: &WithdrawalRequest, err: TransitionError) -> AppError {
    match err {
        TransitionError::InvalidEdge { from, action } => AppError::InvalidStateTransition {
            entity: "withdrawal request",
            id: request.id.to_string(),
            from: from.to_string(),
            action,
        },
        TransitionError::MissingReason => AppError::MissingReason("reject a withdrawal request"),
    }
}
