use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::domain::{
    Cents, ConsultantId, ConsultationService, ModerationAction, ServiceEdit, ServiceId,
    ServiceStatus, TransitionError,
};
use crate::storage::{CasOutcome, ServiceFilter, ServiceStore};

use super::AppError;

const EDIT_ATTEMPTS: u32 = 3;

/// Content of a new consultation service
#[derive(Debug, Clone)]
pub struct NewService {
    pub title: String,
    pub description: String,
    pub price_cents: Cents,
    pub duration_minutes: i64,
}

/// Owns the consultation-service lifecycle.
///
/// `status` is only ever written here, and only along the edges of
/// [`ServiceStatus::next`]. Each write is guarded on the status the
/// transition was computed from.
pub struct ModerationEngine {
    store: Arc<dyn ServiceStore>,
}

impl ModerationEngine {
    pub fn new(store: Arc<dyn ServiceStore>) -> Self {
        Self { store }
    }

    /// Submit a new service for moderation. It always starts out pending.
    pub async fn create(
        &self,
        consultant_id: ConsultantId,
        new: NewService,
    ) -> Result<ConsultationService, AppError> {
        let service = ConsultationService::new(
            consultant_id,
            new.title,
            new.description,
            new.price_cents,
            new.duration_minutes,
        );
        service.validate()?;

        self.store.insert_service(&service).await?;
        info!(
            service_id = %service.id,
            consultant_id = %consultant_id,
            title = %service.title,
            "Service submitted"
        );
        Ok(service)
    }

    pub async fn approve(&self, id: ServiceId) -> Result<ConsultationService, AppError> {
        self.moderate(id, ModerationAction::Approve, None).await
    }

    pub async fn reject(&self, id: ServiceId, reason: &str) -> Result<ConsultationService, AppError> {
        self.moderate(id, ModerationAction::Reject, Some(reason))
            .await
    }

    /// Pull an active service from public listing.
    pub async fn convert_to_draft(
        &self,
        id: ServiceId,
        reason: &str,
    ) -> Result<ConsultationService, AppError> {
        self.moderate(id, ModerationAction::ConvertToDraft, Some(reason))
            .await
    }

    pub async fn republish(&self, id: ServiceId) -> Result<ConsultationService, AppError> {
        self.moderate(id, ModerationAction::Republish, None).await
    }

    async fn moderate(
        &self,
        id: ServiceId,
        action: ModerationAction,
        reason: Option<&str>,
    ) -> Result<ConsultationService, AppError> {
        let current = self.get(id).await?;
        let next = current
            .transition(action, reason, Utc::now())
            .map_err(|e| service_transition_error(&current, action, e))?;

        let outcome = self
            .store
            .update_status(
                id,
                current.status,
                next.status,
                next.rejection_reason.as_deref(),
                next.updated_at,
            )
            .await?;

        match outcome {
            CasOutcome::Committed(stored) => {
                info!(
                    service_id = %id,
                    from = %current.status,
                    to = %stored.status,
                    "Service moderated"
                );
                Ok(stored)
            }
            CasOutcome::Stale => {
                let latest = self.get(id).await?;
                Err(AppError::InvalidStateTransition {
                    entity: "service",
                    id: id.to_string(),
                    from: latest.status.to_string(),
                    action: action.as_str(),
                })
            }
        }
    }

    /// Change content fields. Allowed in every status; never changes status.
    pub async fn edit(
        &self,
        id: ServiceId,
        edit: &ServiceEdit,
    ) -> Result<ConsultationService, AppError> {
        for attempt in 1..=EDIT_ATTEMPTS {
            let current = self.get(id).await?;
            if edit.is_empty() {
                return Ok(current);
            }

            let next = current.edited(edit, Utc::now());
            next.validate()?;

            match self.store.update_content(&next, current.status).await? {
                CasOutcome::Committed(stored) => {
                    info!(service_id = %id, "Service edited");
                    return Ok(stored);
                }
                CasOutcome::Stale => {
                    // Status moved underneath us; edit the fresh copy instead
                    debug!(service_id = %id, attempt, "Service status moved during edit, retrying");
                }
            }
        }

        Err(AppError::Conflict(format!("service {}", id)))
    }

    /// Delete a service in any status, returning what was removed.
    pub async fn delete(&self, id: ServiceId) -> Result<ConsultationService, AppError> {
        let service = self.get(id).await?;
        if !self.store.delete_service(id).await? {
            return Err(AppError::NotFound {
                entity: "Service",
                id: id.to_string(),
            });
        }

        info!(service_id = %id, consultant_id = %service.consultant_id, "Service deleted");
        Ok(service)
    }

    pub async fn get(&self, id: ServiceId) -> Result<ConsultationService, AppError> {
        self.store
            .get_service(id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                entity: "Service",
                id: id.to_string(),
            })
    }

    pub async fn list(&self, filter: &ServiceFilter) -> Result<Vec<ConsultationService>, AppError> {
        Ok(self.store.list_services(filter).await?)
    }

    /// The public catalogue: active services only.
    pub async fn list_public(&self) -> Result<Vec<ConsultationService>, AppError> {
        self.list(&ServiceFilter {
            consultant_id: None,
            status: Some(ServiceStatus::Active),
        })
        .await
    }
}

fn service_transition_error(
    service: &ConsultationService,
    action: ModerationAction,
    err: TransitionError,
) -> AppError {
    match err {
        TransitionError::InvalidEdge { from, action } => AppError::InvalidStateTransition {
            entity: "service",
            id: service.id.to_string(),
            from: from.to_string(),
            action,
        },
        TransitionError::MissingReason => AppError::MissingReason(match action {
            ModerationAction::ConvertToDraft => "convert a service to draft",
            _ => "reject a service",
        }),
    }
}
