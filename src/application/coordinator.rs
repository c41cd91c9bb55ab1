use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::SettlementPolicy;
use crate::domain::{
    Actor, BankDetails, Cents, ConsultantBalance, ConsultantId, ConsultationService,
    Notification, Recipient, ServiceEdit, ServiceId, Severity, WithdrawalDecision, WithdrawalId,
    WithdrawalRequest, WithdrawalStatus, format_cents,
};
use crate::notify::NotificationSink;
use crate::storage::{ChangeFeed, Repository, ServiceFilter, StoreEvent, WithdrawalFilter};

use super::{AppError, ModerationEngine, NewService, SettlementEngine};

const CONSULTANT_EARNINGS_LINK: &str = "/consultant/earnings";
const CONSULTANT_SERVICES_LINK: &str = "/consultant/services";
const ADMIN_WITHDRAWALS_LINK: &str = "/admin/withdrawals";
const ADMIN_SERVICES_LINK: &str = "/admin/services";

/// The façade every caller goes through.
///
/// Each operation checks the actor's role and ownership, runs the engine
/// mutation, then emits notifications. Notifications are best-effort: a
/// failing sink is logged and never fails or undoes the operation.
pub struct Coordinator {
    settlement: SettlementEngine,
    moderation: ModerationEngine,
    sink: Arc<dyn NotificationSink>,
    feed: Arc<dyn ChangeFeed>,
}

impl Coordinator {
    pub fn new(
        settlement: SettlementEngine,
        moderation: ModerationEngine,
        sink: Arc<dyn NotificationSink>,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        Self {
            settlement,
            moderation,
            sink,
            feed,
        }
    }

    /// Wire both engines and the change feed to one SQLite repository.
    pub fn with_repository(
        repo: Arc<Repository>,
        policy: SettlementPolicy,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self::new(
            SettlementEngine::new(repo.clone(), policy),
            ModerationEngine::new(repo.clone()),
            sink,
            repo,
        )
    }

    /// Subscribe to committed store changes, for refreshing read projections.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.feed.subscribe()
    }

    async fn emit(&self, notification: Notification) {
        if let Err(e) = self.sink.notify(&notification).await {
            warn!(
                error = %e,
                recipient = %notification.recipient,
                title = %notification.title,
                "Failed to deliver notification"
            );
        }
    }

    fn require_admin(actor: &Actor, action: &'static str) -> Result<(), AppError> {
        if actor.is_admin() {
            Ok(())
        } else {
            Err(AppError::unauthorized(actor, action))
        }
    }

    fn require_consultant(
        actor: &Actor,
        consultant_id: ConsultantId,
        action: &'static str,
    ) -> Result<(), AppError> {
        if actor.is_consultant(consultant_id) {
            Ok(())
        } else {
            Err(AppError::unauthorized(actor, action))
        }
    }

    fn require_owner_or_admin(
        actor: &Actor,
        owner: ConsultantId,
        action: &'static str,
    ) -> Result<(), AppError> {
        if actor.can_read(owner) {
            Ok(())
        } else {
            Err(AppError::unauthorized(actor, action))
        }
    }

    /// Consultants may only query their own entities; a filter naming another
    /// consultant is refused rather than silently rewritten.
    fn scope_to_actor(
        actor: &Actor,
        requested: Option<ConsultantId>,
        action: &'static str,
    ) -> Result<Option<ConsultantId>, AppError> {
        match actor {
            Actor::Admin => Ok(requested),
            Actor::Consultant(own) => match requested {
                Some(other) if other != *own => Err(AppError::unauthorized(actor, action)),
                _ => Ok(Some(*own)),
            },
            Actor::System => Err(AppError::unauthorized(actor, action)),
        }
    }

    // ========================
    // Settlement
    // ========================

    pub async fn balance(
        &self,
        actor: &Actor,
        consultant_id: ConsultantId,
    ) -> Result<ConsultantBalance, AppError> {
        Self::require_owner_or_admin(actor, consultant_id, "view this balance")?;
        self.settlement.balance(consultant_id).await
    }

    /// Upstream payment event: a consultant earned money.
    pub async fn record_earning(
        &self,
        actor: &Actor,
        consultant_id: ConsultantId,
        amount_cents: Cents,
        cleared: bool,
    ) -> Result<ConsultantBalance, AppError> {
        if !matches!(actor, Actor::Admin | Actor::System) {
            return Err(AppError::unauthorized(actor, "record earnings"));
        }

        let balance = self
            .settlement
            .record_earning(consultant_id, amount_cents, cleared)
            .await?;

        let bucket = if cleared { "available" } else { "pending" };
        self.emit(
            Notification::new(
                Recipient::Consultant(consultant_id),
                "Earnings received",
                format!(
                    "{} was added to your {} balance.",
                    format_cents(amount_cents),
                    bucket
                ),
                Severity::Info,
            )
            .with_link(CONSULTANT_EARNINGS_LINK),
        )
        .await;

        Ok(balance)
    }

    pub async fn release_pending(
        &self,
        actor: &Actor,
        consultant_id: ConsultantId,
        amount_cents: Cents,
    ) -> Result<ConsultantBalance, AppError> {
        if !matches!(actor, Actor::Admin | Actor::System) {
            return Err(AppError::unauthorized(actor, "release pending funds"));
        }

        let balance = self
            .settlement
            .release_pending(consultant_id, amount_cents)
            .await?;

        self.emit(
            Notification::new(
                Recipient::Consultant(consultant_id),
                "Funds available",
                format!(
                    "{} is now available for withdrawal.",
                    format_cents(amount_cents)
                ),
                Severity::Success,
            )
            .with_link(CONSULTANT_EARNINGS_LINK),
        )
        .await;

        Ok(balance)
    }

    pub async fn submit_withdrawal(
        &self,
        actor: &Actor,
        consultant_id: ConsultantId,
        amount_cents: Cents,
        bank: BankDetails,
    ) -> Result<WithdrawalRequest, AppError> {
        Self::require_consultant(actor, consultant_id, "request a withdrawal")?;

        let request = self
            .settlement
            .submit_withdrawal(consultant_id, amount_cents, bank)
            .await?;

        let amount = format_cents(request.amount_cents);
        self.emit(
            Notification::new(
                Recipient::Consultant(consultant_id),
                "Withdrawal request submitted",
                format!(
                    "Your request to withdraw {} has been received and is awaiting review.",
                    amount
                ),
                Severity::Success,
            )
            .with_link(CONSULTANT_EARNINGS_LINK),
        )
        .await;
        self.emit(
            Notification::new(
                Recipient::Admin,
                "New withdrawal request",
                format!(
                    "Consultant {} requested a withdrawal of {}.",
                    consultant_id, amount
                ),
                Severity::Info,
            )
            .with_link(ADMIN_WITHDRAWALS_LINK),
        )
        .await;

        Ok(request)
    }

    pub async fn decide_withdrawal(
        &self,
        actor: &Actor,
        id: WithdrawalId,
        decision: WithdrawalDecision,
        admin_notes: Option<String>,
    ) -> Result<WithdrawalRequest, AppError> {
        Self::require_admin(actor, "decide withdrawal requests")?;

        let settlement = self
            .settlement
            .decide_withdrawal(id, decision, admin_notes)
            .await?;
        let request = &settlement.request;
        let amount = format_cents(request.amount_cents);

        let notification = match request.status {
            WithdrawalStatus::Approved => {
                let mut message = format!(
                    "Your withdrawal of {} has been approved and sent to {}.",
                    amount, request.bank.bank_name
                );
                if let Some(balance) = &settlement.balance {
                    message.push_str(&format!(
                        " Available balance: {}.",
                        format_cents(balance.available)
                    ));
                }
                Notification::new(
                    Recipient::Consultant(request.consultant_id),
                    "Withdrawal approved",
                    message,
                    Severity::Success,
                )
            }
            _ => Notification::new(
                Recipient::Consultant(request.consultant_id),
                "Withdrawal rejected",
                format!(
                    "Your withdrawal of {} was rejected: {}",
                    amount,
                    request.rejection_reason.as_deref().unwrap_or_default()
                ),
                Severity::Error,
            ),
        };
        self.emit(notification.with_link(CONSULTANT_EARNINGS_LINK))
            .await;

        Ok(settlement.request)
    }

    pub async fn annotate_withdrawal(
        &self,
        actor: &Actor,
        id: WithdrawalId,
        notes: Option<String>,
    ) -> Result<WithdrawalRequest, AppError> {
        Self::require_admin(actor, "annotate withdrawal requests")?;
        self.settlement.annotate_withdrawal(id, notes).await
    }

    pub async fn get_withdrawal(
        &self,
        actor: &Actor,
        id: WithdrawalId,
    ) -> Result<WithdrawalRequest, AppError> {
        let request = self.settlement.get_withdrawal(id).await?;
        Self::require_owner_or_admin(actor, request.consultant_id, "view this withdrawal request")?;
        Ok(request)
    }

    pub async fn list_withdrawals(
        &self,
        actor: &Actor,
        filter: WithdrawalFilter,
    ) -> Result<Vec<WithdrawalRequest>, AppError> {
        let consultant_id =
            Self::scope_to_actor(actor, filter.consultant_id, "list these withdrawal requests")?;
        self.settlement
            .list_withdrawals(&WithdrawalFilter {
                consultant_id,
                ..filter
            })
            .await
    }

    // ========================
    // Moderation
    // ========================

    pub async fn create_service(
        &self,
        actor: &Actor,
        consultant_id: ConsultantId,
        new: NewService,
    ) -> Result<ConsultationService, AppError> {
        Self::require_consultant(actor, consultant_id, "create a service")?;

        let service = self.moderation.create(consultant_id, new).await?;

        self.emit(
            Notification::new(
                Recipient::Admin,
                "New service submitted",
                format!("'{}' is awaiting moderation.", service.title),
                Severity::Info,
            )
            .with_link(ADMIN_SERVICES_LINK),
        )
        .await;

        Ok(service)
    }

    pub async fn approve_service(
        &self,
        actor: &Actor,
        id: ServiceId,
    ) -> Result<ConsultationService, AppError> {
        Self::require_admin(actor, "approve services")?;
        let service = self.moderation.approve(id).await?;

        self.notify_owner(
            &service,
            "Service approved",
            format!("'{}' is now live on the marketplace.", service.title),
            Severity::Success,
        )
        .await;
        Ok(service)
    }

    pub async fn reject_service(
        &self,
        actor: &Actor,
        id: ServiceId,
        reason: &str,
    ) -> Result<ConsultationService, AppError> {
        Self::require_admin(actor, "reject services")?;
        let service = self.moderation.reject(id, reason).await?;

        self.notify_owner(
            &service,
            "Service rejected",
            format!("'{}' was rejected: {}", service.title, reason),
            Severity::Error,
        )
        .await;
        Ok(service)
    }

    pub async fn convert_service_to_draft(
        &self,
        actor: &Actor,
        id: ServiceId,
        reason: &str,
    ) -> Result<ConsultationService, AppError> {
        Self::require_admin(actor, "convert services to draft")?;
        let service = self.moderation.convert_to_draft(id, reason).await?;

        self.notify_owner(
            &service,
            "Service moved to draft",
            format!(
                "'{}' was hidden from the marketplace by an administrator: {}",
                service.title, reason
            ),
            Severity::Warning,
        )
        .await;
        Ok(service)
    }

    pub async fn republish_service(
        &self,
        actor: &Actor,
        id: ServiceId,
    ) -> Result<ConsultationService, AppError> {
        let current = self.moderation.get(id).await?;
        Self::require_owner_or_admin(actor, current.consultant_id, "republish this service")?;

        let service = self.moderation.republish(id).await?;

        self.notify_owner(
            &service,
            "Service published",
            format!("'{}' is live again.", service.title),
            Severity::Success,
        )
        .await;
        Ok(service)
    }

    pub async fn edit_service(
        &self,
        actor: &Actor,
        id: ServiceId,
        edit: ServiceEdit,
    ) -> Result<ConsultationService, AppError> {
        let current = self.moderation.get(id).await?;
        Self::require_owner_or_admin(actor, current.consultant_id, "edit this service")?;
        self.moderation.edit(id, &edit).await
    }

    pub async fn delete_service(
        &self,
        actor: &Actor,
        id: ServiceId,
    ) -> Result<ConsultationService, AppError> {
        let current = self.moderation.get(id).await?;
        Self::require_owner_or_admin(actor, current.consultant_id, "delete this service")?;

        let service = self.moderation.delete(id).await?;

        let by = if actor.is_admin() {
            "an administrator"
        } else {
            "you"
        };
        self.notify_owner(
            &service,
            "Service deleted",
            format!("'{}' was deleted by {}.", service.title, by),
            Severity::Info,
        )
        .await;
        self.emit(
            Notification::new(
                Recipient::Admin,
                "Service deleted",
                format!(
                    "'{}' of consultant {} was deleted by {}.",
                    service.title, service.consultant_id, actor
                ),
                Severity::Info,
            )
            .with_link(ADMIN_SERVICES_LINK),
        )
        .await;

        info!(service_id = %id, deleted_by = %actor, "Service removed");
        Ok(service)
    }

    pub async fn get_service(
        &self,
        actor: &Actor,
        id: ServiceId,
    ) -> Result<ConsultationService, AppError> {
        let service = self.moderation.get(id).await?;
        Self::require_owner_or_admin(actor, service.consultant_id, "view this service")?;
        Ok(service)
    }

    pub async fn list_services(
        &self,
        actor: &Actor,
        filter: ServiceFilter,
    ) -> Result<Vec<ConsultationService>, AppError> {
        let consultant_id = Self::scope_to_actor(actor, filter.consultant_id, "list these services")?;
        self.moderation
            .list(&ServiceFilter {
                consultant_id,
                ..filter
            })
            .await
    }

    /// What end customers may see and book. Needs no actor.
    pub async fn list_public_services(&self) -> Result<Vec<ConsultationService>, AppError> {
        self.moderation.list_public().await
    }

    async fn notify_owner(
        &self,
        service: &ConsultationService,
        title: &str,
        message: String,
        severity: Severity,
    ) {
        self.emit(
            Notification::new(
                Recipient::Consultant(service.consultant_id),
                title,
                message,
                severity,
            )
            .with_link(CONSULTANT_SERVICES_LINK),
        )
        .await;
    }
}
