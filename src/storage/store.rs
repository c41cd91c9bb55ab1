use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::domain::{
    ConsultantBalance, ConsultantId, ConsultationService, ServiceId, ServiceStatus,
    WithdrawalId, WithdrawalRequest, WithdrawalStatus,
};

/// A committed change, published so read projections can refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    BalanceChanged(ConsultantId),
    WithdrawalChanged {
        id: WithdrawalId,
        consultant_id: ConsultantId,
    },
    ServiceChanged {
        id: ServiceId,
        consultant_id: ConsultantId,
    },
    ServiceDeleted {
        id: ServiceId,
        consultant_id: ConsultantId,
    },
}

/// Push-style change notification for read projections.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// Filter for listing withdrawal requests. Empty filter lists everything.
#[derive(Debug, Clone, Default)]
pub struct WithdrawalFilter {
    pub consultant_id: Option<ConsultantId>,
    pub status: Option<WithdrawalStatus>,
}

/// Filter for listing consultation services. Empty filter lists everything.
#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    pub consultant_id: Option<ConsultantId>,
    pub status: Option<ServiceStatus>,
}

/// Result of a compare-and-set write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome<T> {
    /// The write landed; carries the stored value
    Committed(T),
    /// The guard no longer matched what is stored; nothing was written
    Stale,
}

/// Durable money state: balances and withdrawal requests.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_balance(&self, consultant_id: ConsultantId) -> Result<Option<ConsultantBalance>>;

    /// Persist `balance` only if the stored version still equals
    /// `balance.version` (0 meaning "no row yet"). The committed value carries
    /// the bumped version.
    async fn save_balance(
        &self,
        balance: &ConsultantBalance,
    ) -> Result<CasOutcome<ConsultantBalance>>;

    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<()>;

    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<WithdrawalRequest>>;

    /// Newest first.
    async fn list_withdrawals(&self, filter: &WithdrawalFilter) -> Result<Vec<WithdrawalRequest>>;

    /// Persist a decided request, guarded on the stored status still being
    /// `pending`. For an approval the settlement of the consultant's balance
    /// is applied in the same transaction, and the committed value carries the
    /// resulting balance.
    async fn commit_decision(
        &self,
        decided: &WithdrawalRequest,
    ) -> Result<CasOutcome<Option<ConsultantBalance>>>;

    async fn update_admin_notes(&self, id: WithdrawalId, notes: Option<&str>) -> Result<()>;
}

/// Durable consultation-service definitions.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn insert_service(&self, service: &ConsultationService) -> Result<()>;

    async fn get_service(&self, id: ServiceId) -> Result<Option<ConsultationService>>;

    /// Newest first.
    async fn list_services(&self, filter: &ServiceFilter) -> Result<Vec<ConsultationService>>;

    /// Write the content fields of `service` (title, description, price,
    /// duration), guarded on the stored status still being `expected_status`.
    /// Status and reason are left as stored.
    async fn update_content(
        &self,
        service: &ConsultationService,
        expected_status: ServiceStatus,
    ) -> Result<CasOutcome<ConsultationService>>;

    /// Move a service to `status`, guarded on the stored status still being
    /// `expected_status`. Content fields are left as stored, so a concurrent
    /// edit survives. The committed value is the row as it now stands.
    async fn update_status(
        &self,
        id: ServiceId,
        expected_status: ServiceStatus,
        status: ServiceStatus,
        rejection_reason: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<CasOutcome<ConsultationService>>;

    /// Returns false if there was nothing to delete.
    async fn delete_service(&self, id: ServiceId) -> Result<bool>;
}
