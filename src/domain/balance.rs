use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Cents, ConsultantId};

/// Money state for one consultant.
///
/// All three buckets are non-negative at every observed instant, and
/// `withdrawn` never decreases. Balances are only changed through
/// [`ConsultantBalance::apply`], which returns a new value and leaves the
/// original untouched so the caller can persist it with a version check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultantBalance {
    pub consultant_id: ConsultantId,
    /// Withdrawable now
    pub available: Cents,
    /// Earned, still inside the clearing period
    pub pending: Cents,
    /// Lifetime total paid out
    pub withdrawn: Cents,
    /// Optimistic-concurrency counter; 0 means "never persisted"
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// A change to a consultant's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BalanceMutation {
    /// Credit an earning. Uncleared earnings go to `pending`.
    Earn { amount: Cents, cleared: bool },
    /// Move funds from `pending` to `available`.
    Release { amount: Cents },
    /// Pay out an approved withdrawal.
    Settle { amount: Cents },
}

impl BalanceMutation {
    pub fn amount(&self) -> Cents {
        match *self {
            BalanceMutation::Earn { amount, .. }
            | BalanceMutation::Release { amount }
            | BalanceMutation::Settle { amount } => amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    #[error("balance mutation amount must be positive, got {0}")]
    NonPositiveAmount(Cents),

    #[error("cannot release {requested} cents, only {pending} cents pending")]
    InsufficientPending { pending: Cents, requested: Cents },

    #[error("balance arithmetic overflow")]
    Overflow,
}

impl ConsultantBalance {
    /// A zero balance that has not been stored yet.
    pub fn empty(consultant_id: ConsultantId) -> Self {
        Self {
            consultant_id,
            available: 0,
            pending: 0,
            withdrawn: 0,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.version > 0
    }

    /// Apply a mutation, returning the resulting balance.
    ///
    /// Settlement floors `available` at zero: the withdrawal was validated
    /// against `available` at submission time, and funds may have drifted
    /// since (see the notes on submission in the settlement engine).
    pub fn apply(&self, mutation: BalanceMutation) -> Result<Self, BalanceError> {
        let amount = mutation.amount();
        if amount <= 0 {
            return Err(BalanceError::NonPositiveAmount(amount));
        }

        let mut next = self.clone();
        match mutation {
            BalanceMutation::Earn { cleared: true, .. } => {
                next.available = checked(self.available.checked_add(amount))?;
            }
            BalanceMutation::Earn { cleared: false, .. } => {
                next.pending = checked(self.pending.checked_add(amount))?;
            }
            BalanceMutation::Release { .. } => {
                if amount > self.pending {
                    return Err(BalanceError::InsufficientPending {
                        pending: self.pending,
                        requested: amount,
                    });
                }
                next.pending = self.pending - amount;
                next.available = checked(self.available.checked_add(amount))?;
            }
            BalanceMutation::Settle { .. } => {
                next.available = (self.available - amount).max(0);
                next.withdrawn = checked(self.withdrawn.checked_add(amount))?;
            }
        }
        next.updated_at = Utc::now();
        Ok(next)
    }
}

fn checked(value: Option<Cents>) -> Result<Cents, BalanceError> {
    value.ok_or(BalanceError::Overflow)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn balance(available: Cents, pending: Cents, withdrawn: Cents) -> ConsultantBalance {
        ConsultantBalance {
            available,
            pending,
            withdrawn,
            ..ConsultantBalance::empty(Uuid::new_v4())
        }
    }

    #[test]
    fn test_uncleared_earning_goes_to_pending() {
        let b = balance(0, 0, 0)
            .apply(BalanceMutation::Earn {
                amount: 5000,
                cleared: false,
            })
            .unwrap();
        assert_eq!((b.available, b.pending), (0, 5000));
    }

    #[test]
    fn test_cleared_earning_goes_to_available() {
        let b = balance(100, 0, 0)
            .apply(BalanceMutation::Earn {
                amount: 5000,
                cleared: true,
            })
            .unwrap();
        assert_eq!((b.available, b.pending), (5100, 0));
    }

    #[test]
    fn test_release_moves_pending_to_available() {
        let b = balance(1000, 3000, 0)
            .apply(BalanceMutation::Release { amount: 2000 })
            .unwrap();
        assert_eq!((b.available, b.pending), (3000, 1000));
    }

    #[test]
    fn test_release_more_than_pending_fails() {
        let result = balance(0, 1000, 0).apply(BalanceMutation::Release { amount: 2000 });
        assert_eq!(
            result,
            Err(BalanceError::InsufficientPending {
                pending: 1000,
                requested: 2000
            })
        );
    }

    #[test]
    fn test_settle_deducts_and_accumulates_withdrawn() {
        let b = balance(80000, 0, 1000)
            .apply(BalanceMutation::Settle { amount: 50000 })
            .unwrap();
        assert_eq!(b.available, 30000);
        assert_eq!(b.withdrawn, 51000);
    }

    #[test]
    fn test_settle_floors_available_at_zero() {
        let b = balance(300, 0, 0)
            .apply(BalanceMutation::Settle { amount: 500 })
            .unwrap();
        assert_eq!(b.available, 0);
        assert_eq!(b.withdrawn, 500);
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        let b = balance(100, 100, 0);
        for mutation in [
            BalanceMutation::Earn {
                amount: 0,
                cleared: true,
            },
            BalanceMutation::Release { amount: -1 },
            BalanceMutation::Settle { amount: 0 },
        ] {
            assert!(matches!(
                b.apply(mutation),
                Err(BalanceError::NonPositiveAmount(_))
            ));
        }
    }

    #[test]
    fn test_apply_keeps_version() {
        // The store bumps the version on write, not the domain
        let mut b = balance(0, 0, 0);
        b.version = 4;
        let next = b
            .apply(BalanceMutation::Earn {
                amount: 1,
                cleared: true,
            })
            .unwrap();
        assert_eq!(next.version, 4);
    }
}
