mod common;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{active_service, new_consultant, tax_planning, test_env};
use counsel::application::{AppError, ModerationEngine, NewService};
use counsel::domain::{
    Actor, ConsultationService, Recipient, ServiceEdit, ServiceId, ServiceStatus,
    ServiceValidationError, Severity,
};
use counsel::storage::{CasOutcome, Repository, ServiceFilter, ServiceStore};

/// Service store that lets a consultant edit land right before every status
/// write, as if it raced with the moderator.
struct EditBeforeStatusWrite {
    inner: Arc<Repository>,
    price_cents: i64,
}

#[async_trait]
impl ServiceStore for EditBeforeStatusWrite {
    async fn insert_service(&self, service: &ConsultationService) -> anyhow::Result<()> {
        self.inner.insert_service(service).await
    }

    async fn get_service(&self, id: ServiceId) -> anyhow::Result<Option<ConsultationService>> {
        self.inner.get_service(id).await
    }

    async fn list_services(
        &self,
        filter: &ServiceFilter,
    ) -> anyhow::Result<Vec<ConsultationService>> {
        self.inner.list_services(filter).await
    }

    async fn update_content(
        &self,
        service: &ConsultationService,
        expected_status: ServiceStatus,
    ) -> anyhow::Result<CasOutcome<ConsultationService>> {
        self.inner.update_content(service, expected_status).await
    }

    async fn update_status(
        &self,
        id: ServiceId,
        expected_status: ServiceStatus,
        status: ServiceStatus,
        rejection_reason: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> anyhow::Result<CasOutcome<ConsultationService>> {
        if let Some(current) = self.inner.get_service(id).await? {
            let mut edited = current.clone();
            edited.price_cents = self.price_cents;
            edited.updated_at = Utc::now();
            self.inner.update_content(&edited, current.status).await?;
        }
        self.inner
            .update_status(id, expected_status, status, rejection_reason, updated_at)
            .await
    }

    async fn delete_service(&self, id: ServiceId) -> anyhow::Result<bool> {
        self.inner.delete_service(id).await
    }
}

#[tokio::test]
async fn test_reject_then_republish() -> Result<()> {
    let env = test_env().await?;
    let (consultant_id, consultant) = new_consultant();

    let service = env
        .coordinator
        .create_service(&consultant, consultant_id, tax_planning())
        .await?;
    assert_eq!(service.status, ServiceStatus::Pending);
    assert_eq!(service.title, "Tax Planning");

    let rejected = env
        .coordinator
        .reject_service(&Actor::Admin, service.id, "needs more detail")
        .await?;
    assert_eq!(rejected.status, ServiceStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("needs more detail"));

    let sent = env.sink.sent_to(Recipient::Consultant(consultant_id));
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].severity, Severity::Error);
    assert!(sent[0].message.contains("needs more detail"));

    let republished = env
        .coordinator
        .republish_service(&consultant, service.id)
        .await?;
    assert_eq!(republished.status, ServiceStatus::Active);
    assert!(republished.rejection_reason.is_none());

    let stored = env.coordinator.get_service(&consultant, service.id).await?;
    assert_eq!(stored.status, ServiceStatus::Active);
    assert!(stored.rejection_reason.is_none());

    Ok(())
}

#[tokio::test]
async fn test_convert_to_draft_hides_service() -> Result<()> {
    let env = test_env().await?;
    let (consultant_id, _) = new_consultant();
    let service = active_service(&env, consultant_id).await?;

    let public = env.coordinator.list_public_services().await?;
    assert!(public.iter().any(|s| s.id == service.id));
    env.sink.clear();

    let draft = env
        .coordinator
        .convert_service_to_draft(&Actor::Admin, service.id, "seasonal pause")
        .await?;
    assert_eq!(draft.status, ServiceStatus::Draft);

    let reason = draft.rejection_reason.as_deref().unwrap_or_default();
    assert!(reason.starts_with('['));
    assert!(reason.ends_with("] seasonal pause"));

    let public = env.coordinator.list_public_services().await?;
    assert!(public.iter().all(|s| s.id != service.id));

    let sent = env.sink.sent_to(Recipient::Consultant(consultant_id));
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].severity, Severity::Warning);

    Ok(())
}

#[tokio::test]
async fn test_reasons_are_required() -> Result<()> {
    let env = test_env().await?;
    let (consultant_id, consultant) = new_consultant();

    let pending = env
        .coordinator
        .create_service(&consultant, consultant_id, tax_planning())
        .await?;
    let result = env
        .coordinator
        .reject_service(&Actor::Admin, pending.id, "")
        .await;
    assert!(matches!(result, Err(AppError::MissingReason(_))));

    let active = active_service(&env, consultant_id).await?;
    let result = env
        .coordinator
        .convert_service_to_draft(&Actor::Admin, active.id, "  \t")
        .await;
    assert!(matches!(result, Err(AppError::MissingReason(_))));

    let stored = env.coordinator.get_service(&Actor::Admin, active.id).await?;
    assert_eq!(stored.status, ServiceStatus::Active);

    Ok(())
}

#[tokio::test]
async fn test_invalid_edges() -> Result<()> {
    let env = test_env().await?;
    let (consultant_id, consultant) = new_consultant();

    let pending = env
        .coordinator
        .create_service(&consultant, consultant_id, tax_planning())
        .await?;

    // A pending service cannot be drafted or republished
    let result = env
        .coordinator
        .convert_service_to_draft(&Actor::Admin, pending.id, "not yet")
        .await;
    assert!(matches!(
        result,
        Err(AppError::InvalidStateTransition { ref from, .. }) if from == "pending"
    ));
    let result = env
        .coordinator
        .republish_service(&consultant, pending.id)
        .await;
    assert!(matches!(result, Err(AppError::InvalidStateTransition { .. })));

    let active = env
        .coordinator
        .approve_service(&Actor::Admin, pending.id)
        .await?;

    // Approval only applies to pending services
    let result = env
        .coordinator
        .approve_service(&Actor::Admin, active.id)
        .await;
    assert!(matches!(result, Err(AppError::InvalidStateTransition { .. })));
    let result = env
        .coordinator
        .reject_service(&Actor::Admin, active.id, "too late")
        .await;
    assert!(matches!(result, Err(AppError::InvalidStateTransition { .. })));

    Ok(())
}

#[tokio::test]
async fn test_edit_keeps_status() -> Result<()> {
    let env = test_env().await?;
    let (consultant_id, consultant) = new_consultant();
    let service = active_service(&env, consultant_id).await?;

    let edited = env
        .coordinator
        .edit_service(
            &consultant,
            service.id,
            ServiceEdit {
                title: Some("Tax Planning Plus".to_string()),
                price_cents: Some(15_000),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(edited.title, "Tax Planning Plus");
    assert_eq!(edited.price_cents, 15_000);
    assert_eq!(edited.duration_minutes, 60);
    assert_eq!(edited.status, ServiceStatus::Active);

    let result = env
        .coordinator
        .edit_service(
            &consultant,
            service.id,
            ServiceEdit {
                price_cents: Some(0),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::InvalidService(_))));

    let stored = env.coordinator.get_service(&consultant, service.id).await?;
    assert_eq!(stored.price_cents, 15_000);

    Ok(())
}

#[tokio::test]
async fn test_create_validation() -> Result<()> {
    let env = test_env().await?;
    let (consultant_id, consultant) = new_consultant();

    let result = env
        .coordinator
        .create_service(
            &consultant,
            consultant_id,
            NewService {
                title: "   ".to_string(),
                ..tax_planning()
            },
        )
        .await;
    assert!(matches!(
        result,
        Err(AppError::InvalidService(ServiceValidationError::EmptyTitle))
    ));

    let result = env
        .coordinator
        .create_service(
            &consultant,
            consultant_id,
            NewService {
                duration_minutes: 0,
                ..tax_planning()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::InvalidService(_))));

    Ok(())
}

#[tokio::test]
async fn test_delete_service() -> Result<()> {
    let env = test_env().await?;
    let (consultant_id, consultant) = new_consultant();
    let service = active_service(&env, consultant_id).await?;
    env.sink.clear();

    let deleted = env
        .coordinator
        .delete_service(&Actor::Admin, service.id)
        .await?;
    assert_eq!(deleted.id, service.id);

    let result = env.coordinator.get_service(&consultant, service.id).await;
    assert!(matches!(result, Err(AppError::NotFound { .. })));

    assert_eq!(env.sink.sent_to(Recipient::Consultant(consultant_id)).len(), 1);
    assert_eq!(env.sink.sent_to(Recipient::Admin).len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_list_services_by_status() -> Result<()> {
    let env = test_env().await?;
    let (consultant_id, consultant) = new_consultant();

    active_service(&env, consultant_id).await?;
    env.coordinator
        .create_service(&consultant, consultant_id, tax_planning())
        .await?;

    let pending = env
        .coordinator
        .list_services(
            &Actor::Admin,
            ServiceFilter {
                status: Some(ServiceStatus::Pending),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(pending.len(), 1);

    let own = env
        .coordinator
        .list_services(&consultant, ServiceFilter::default())
        .await?;
    assert_eq!(own.len(), 2);

    let public = env.coordinator.list_public_services().await?;
    assert_eq!(public.len(), 1);
    assert!(public.iter().all(|s| s.status == ServiceStatus::Active));

    Ok(())
}

#[tokio::test]
async fn test_moderation_keeps_concurrent_edit() -> Result<()> {
    let env = test_env().await?;
    let (consultant_id, consultant) = new_consultant();
    let service = env
        .coordinator
        .create_service(&consultant, consultant_id, tax_planning())
        .await?;
    assert_eq!(service.price_cents, 12_000);

    let engine = ModerationEngine::new(Arc::new(EditBeforeStatusWrite {
        inner: env.repo.clone(),
        price_cents: 99_900,
    }));

    let approved = engine.approve(service.id).await?;
    assert_eq!(approved.status, ServiceStatus::Active);
    assert_eq!(approved.price_cents, 99_900);

    let drafted = engine.convert_to_draft(service.id, "seasonal pause").await?;
    assert_eq!(drafted.status, ServiceStatus::Draft);

    let stored = env.coordinator.get_service(&consultant, service.id).await?;
    assert_eq!(stored.status, ServiceStatus::Draft);
    assert_eq!(stored.price_cents, 99_900);
    assert_eq!(stored.title, "Tax Planning");

    Ok(())
}
