use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{ConsultationService, ServiceId, ServiceStatus};

use super::{CasOutcome, Repository, ServiceFilter, ServiceStore, StoreEvent};

const SERVICE_COLUMNS: &str = "id, consultant_id, title, description, price_cents, duration_minutes, status, rejection_reason, created_at, updated_at";

impl Repository {
    /// Re-read a row just written under the write lock and announce it.
    async fn committed_service(&self, id: ServiceId) -> Result<CasOutcome<ConsultationService>> {
        let service = self
            .get_service(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Consultation service {} vanished after update", id))?;

        self.publish(StoreEvent::ServiceChanged {
            id,
            consultant_id: service.consultant_id,
        });
        Ok(CasOutcome::Committed(service))
    }

    fn row_to_service(row: &sqlx::sqlite::SqliteRow) -> Result<ConsultationService> {
        let id_str: String = row.get("id");
        let consultant_str: String = row.get("consultant_id");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(ConsultationService {
            id: Uuid::parse_str(&id_str).context("Invalid service ID")?,
            consultant_id: Uuid::parse_str(&consultant_str).context("Invalid consultant ID")?,
            title: row.get("title"),
            description: row.get("description"),
            price_cents: row.get("price_cents"),
            duration_minutes: row.get("duration_minutes"),
            status: ServiceStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid service status: {}", status_str))?,
            rejection_reason: row.get("rejection_reason"),
            created_at: Self::parse_timestamp(&created_at_str, "created_at")?,
            updated_at: Self::parse_timestamp(&updated_at_str, "updated_at")?,
        })
    }
}

#[async_trait]
impl ServiceStore for Repository {
    async fn insert_service(&self, service: &ConsultationService) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            r#"
            INSERT INTO consultation_services (id, consultant_id, title, description, price_cents, duration_minutes, status, rejection_reason, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(service.id.to_string())
        .bind(service.consultant_id.to_string())
        .bind(&service.title)
        .bind(&service.description)
        .bind(service.price_cents)
        .bind(service.duration_minutes)
        .bind(service.status.as_str())
        .bind(&service.rejection_reason)
        .bind(service.created_at.to_rfc3339())
        .bind(service.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save consultation service")?;

        self.publish(StoreEvent::ServiceChanged {
            id: service.id,
            consultant_id: service.consultant_id,
        });
        Ok(())
    }

    async fn get_service(&self, id: ServiceId) -> Result<Option<ConsultationService>> {
        let query = format!(
            "SELECT {} FROM consultation_services WHERE id = ?",
            SERVICE_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch consultation service")?;

        row.as_ref().map(Self::row_to_service).transpose()
    }

    async fn list_services(&self, filter: &ServiceFilter) -> Result<Vec<ConsultationService>> {
        let mut query = format!(
            "SELECT {} FROM consultation_services WHERE 1=1",
            SERVICE_COLUMNS
        );

        let consultant_str = filter.consultant_id.map(|id| id.to_string());

        if consultant_str.is_some() {
            query.push_str(" AND consultant_id = ?");
        }
        if filter.status.is_some() {
            query.push_str(" AND status = ?");
        }
        query.push_str(" ORDER BY created_at DESC, id");

        let mut sql_query = sqlx::query(&query);
        if let Some(ref consultant) = consultant_str {
            sql_query = sql_query.bind(consultant);
        }
        if let Some(status) = filter.status {
            sql_query = sql_query.bind(status.as_str());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list consultation services")?;

        rows.iter().map(Self::row_to_service).collect()
    }

    async fn update_content(
        &self,
        service: &ConsultationService,
        expected_status: ServiceStatus,
    ) -> Result<CasOutcome<ConsultationService>> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            r#"
            UPDATE consultation_services
            SET title = ?, description = ?, price_cents = ?, duration_minutes = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(&service.title)
        .bind(&service.description)
        .bind(service.price_cents)
        .bind(service.duration_minutes)
        .bind(service.updated_at.to_rfc3339())
        .bind(service.id.to_string())
        .bind(expected_status.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to update consultation service content")?;

        if result.rows_affected() == 0 {
            return Ok(CasOutcome::Stale);
        }
        self.committed_service(service.id).await
    }

    async fn update_status(
        &self,
        id: ServiceId,
        expected_status: ServiceStatus,
        status: ServiceStatus,
        rejection_reason: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<CasOutcome<ConsultationService>> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            r#"
            UPDATE consultation_services
            SET status = ?, rejection_reason = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(status.as_str())
        .bind(rejection_reason)
        .bind(updated_at.to_rfc3339())
        .bind(id.to_string())
        .bind(expected_status.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to update consultation service status")?;

        if result.rows_affected() == 0 {
            return Ok(CasOutcome::Stale);
        }
        self.committed_service(id).await
    }

    async fn delete_service(&self, id: ServiceId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let consultant: Option<String> = sqlx::query_scalar(
            "DELETE FROM consultation_services WHERE id = ? RETURNING consultant_id",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to delete consultation service")?;

        match consultant {
            Some(consultant) => {
                self.publish(StoreEvent::ServiceDeleted {
                    id,
                    consultant_id: Uuid::parse_str(&consultant)
                        .context("Invalid consultant ID")?,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
