use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool};
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use crate::domain::{
    BalanceMutation, BankDetails, ConsultantBalance, ConsultantId, WithdrawalId,
    WithdrawalRequest, WithdrawalStatus,
};

use super::{
    CasOutcome, ChangeFeed, LedgerStore, MIGRATION_001_LEDGER, MIGRATION_002_SERVICES,
    MIGRATION_003_NOTIFICATIONS, StoreEvent, WithdrawalFilter,
};

const EVENT_CAPACITY: usize = 256;

const WITHDRAWAL_COLUMNS: &str = "id, consultant_id, amount_cents, bank_name, bank_account_holder, bank_iban, status, rejection_reason, admin_notes, created_at, processed_at";

/// SQLite-backed store for balances, withdrawal requests, consultation
/// services and the notification inbox.
///
/// Writes go through a single async mutex so that multi-statement
/// transactions in this process never contend for SQLite's write lock.
pub struct Repository {
    pub(super) pool: SqlitePool,
    pub(super) write_lock: Mutex<()>,
    events: broadcast::Sender<StoreEvent>,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            pool,
            write_lock: Mutex::new(()),
            events,
        }
    }

    /// Connect to a SQLite database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run more than once.
    pub async fn migrate(&self) -> Result<()> {
        for (name, sql) in [
            ("001", MIGRATION_001_LEDGER),
            ("002", MIGRATION_002_SERVICES),
            ("003", MIGRATION_003_NOTIFICATIONS),
        ] {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to run migration {}", name))?;
        }
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Broadcast a committed change. Having no subscribers is not an error.
    pub(super) fn publish(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    pub(super) fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339(value)
            .with_context(|| format!("Invalid {} timestamp", field))?
            .with_timezone(&Utc))
    }

    pub(super) fn parse_optional_timestamp(
        value: Option<String>,
        field: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        value
            .map(|s| Self::parse_timestamp(&s, field))
            .transpose()
    }

    // ========================
    // Balance helpers
    // ========================

    async fn fetch_balance<'e, E>(
        executor: E,
        consultant_id: ConsultantId,
    ) -> Result<Option<ConsultantBalance>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query(
            r#"
            SELECT consultant_id, available, pending, withdrawn, version, updated_at
            FROM consultant_balances
            WHERE consultant_id = ?
            "#,
        )
        .bind(consultant_id.to_string())
        .fetch_optional(executor)
        .await
        .context("Failed to fetch balance")?;

        row.as_ref().map(Self::row_to_balance).transpose()
    }

    /// Version-guarded write. Version 0 means the row must not exist yet.
    async fn write_balance<'e, E>(
        executor: E,
        balance: &ConsultantBalance,
    ) -> Result<CasOutcome<ConsultantBalance>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let result = (if balance.is_persisted() {
            sqlx::query(
                r#"
                UPDATE consultant_balances
                SET available = ?, pending = ?, withdrawn = ?, version = version + 1, updated_at = ?
                WHERE consultant_id = ? AND version = ?
                "#,
            )
            .bind(balance.available)
            .bind(balance.pending)
            .bind(balance.withdrawn)
            .bind(balance.updated_at.to_rfc3339())
            .bind(balance.consultant_id.to_string())
            .bind(balance.version)
            .execute(executor)
            .await
        } else {
            sqlx::query(
                r#"
                INSERT INTO consultant_balances (consultant_id, available, pending, withdrawn, version, updated_at)
                VALUES (?, ?, ?, ?, 1, ?)
                ON CONFLICT(consultant_id) DO NOTHING
                "#,
            )
            .bind(balance.consultant_id.to_string())
            .bind(balance.available)
            .bind(balance.pending)
            .bind(balance.withdrawn)
            .bind(balance.updated_at.to_rfc3339())
            .execute(executor)
            .await
        })
        .context("Failed to save balance")?;

        if result.rows_affected() == 0 {
            return Ok(CasOutcome::Stale);
        }

        let mut stored = balance.clone();
        stored.version += 1;
        Ok(CasOutcome::Committed(stored))
    }

    fn row_to_balance(row: &sqlx::sqlite::SqliteRow) -> Result<ConsultantBalance> {
        let id_str: String = row.get("consultant_id");
        let updated_at_str: String = row.get("updated_at");

        Ok(ConsultantBalance {
            consultant_id: Uuid::parse_str(&id_str).context("Invalid consultant ID")?,
            available: row.get("available"),
            pending: row.get("pending"),
            withdrawn: row.get("withdrawn"),
            version: row.get("version"),
            updated_at: Self::parse_timestamp(&updated_at_str, "updated_at")?,
        })
    }

    fn row_to_withdrawal(row: &sqlx::sqlite::SqliteRow) -> Result<WithdrawalRequest> {
        let id_str: String = row.get("id");
        let consultant_str: String = row.get("consultant_id");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");

        Ok(WithdrawalRequest {
            id: Uuid::parse_str(&id_str).context("Invalid withdrawal ID")?,
            consultant_id: Uuid::parse_str(&consultant_str).context("Invalid consultant ID")?,
            amount_cents: row.get("amount_cents"),
            bank: BankDetails {
                bank_name: row.get("bank_name"),
                account_holder: row.get("bank_account_holder"),
                iban: row.get("bank_iban"),
            },
            status: WithdrawalStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid withdrawal status: {}", status_str))?,
            rejection_reason: row.get("rejection_reason"),
            admin_notes: row.get("admin_notes"),
            created_at: Self::parse_timestamp(&created_at_str, "created_at")?,
            processed_at: Self::parse_optional_timestamp(row.get("processed_at"), "processed_at")?,
        })
    }
}

impl ChangeFeed for Repository {
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl LedgerStore for Repository {
    async fn get_balance(&self, consultant_id: ConsultantId) -> Result<Option<ConsultantBalance>> {
        Self::fetch_balance(&self.pool, consultant_id).await
    }

    async fn save_balance(
        &self,
        balance: &ConsultantBalance,
    ) -> Result<CasOutcome<ConsultantBalance>> {
        let _guard = self.write_lock.lock().await;
        let outcome = Self::write_balance(&self.pool, balance).await?;
        if let CasOutcome::Committed(stored) = &outcome {
            self.publish(StoreEvent::BalanceChanged(stored.consultant_id));
        }
        Ok(outcome)
    }

    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            r#"
            INSERT INTO withdrawal_requests (id, consultant_id, amount_cents, bank_name, bank_account_holder, bank_iban, status, rejection_reason, admin_notes, created_at, processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.consultant_id.to_string())
        .bind(request.amount_cents)
        .bind(&request.bank.bank_name)
        .bind(&request.bank.account_holder)
        .bind(&request.bank.iban)
        .bind(request.status.as_str())
        .bind(&request.rejection_reason)
        .bind(&request.admin_notes)
        .bind(request.created_at.to_rfc3339())
        .bind(request.processed_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .context("Failed to save withdrawal request")?;

        self.publish(StoreEvent::WithdrawalChanged {
            id: request.id,
            consultant_id: request.consultant_id,
        });
        Ok(())
    }

    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<WithdrawalRequest>> {
        let query = format!(
            "SELECT {} FROM withdrawal_requests WHERE id = ?",
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch withdrawal request")?;

        row.as_ref().map(Self::row_to_withdrawal).transpose()
    }

    async fn list_withdrawals(&self, filter: &WithdrawalFilter) -> Result<Vec<WithdrawalRequest>> {
        let mut query = format!(
            "SELECT {} FROM withdrawal_requests WHERE 1=1",
            WITHDRAWAL_COLUMNS
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
            .context("Failed to list withdrawal requests")?;

        rows.iter().map(Self::row_to_withdrawal).collect()
    }

    async fn commit_decision(
        &self,
        decided: &WithdrawalRequest,
    ) -> Result<CasOutcome<Option<ConsultantBalance>>> {
        let processed_at = decided
            .processed_at
            .ok_or_else(|| anyhow::anyhow!("Decided withdrawal {} has no processed_at", decided.id))?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin decision transaction")?;

        // Guarded on the prior status: only one decision can ever land
        let result = sqlx::query(
            r#"
            UPDATE withdrawal_requests
            SET status = ?, rejection_reason = ?, admin_notes = ?, processed_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(decided.status.as_str())
        .bind(&decided.rejection_reason)
        .bind(&decided.admin_notes)
        .bind(processed_at.to_rfc3339())
        .bind(decided.id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to update withdrawal status")?;

        if result.rows_affected() == 0 {
            tx.rollback().await.context("Failed to roll back decision")?;
            return Ok(CasOutcome::Stale);
        }

        let settled = if decided.status == WithdrawalStatus::Approved {
            let current = Self::fetch_balance(&mut *tx, decided.consultant_id)
                .await?
                .unwrap_or_else(|| ConsultantBalance::empty(decided.consultant_id));
            let next = current.apply(BalanceMutation::Settle {
                amount: decided.amount_cents,
            })?;

            match Self::write_balance(&mut *tx, &next).await? {
                CasOutcome::Committed(stored) => Some(stored),
                CasOutcome::Stale => {
                    // Dropping the transaction rolls the status change back too
                    anyhow::bail!(
                        "Balance for consultant {} changed during settlement",
                        decided.consultant_id
                    );
                }
            }
        } else {
            None
        };

        tx.commit().await.context("Failed to commit decision")?;

        self.publish(StoreEvent::WithdrawalChanged {
            id: decided.id,
            consultant_id: decided.consultant_id,
        });
        if settled.is_some() {
            self.publish(StoreEvent::BalanceChanged(decided.consultant_id));
        }

        Ok(CasOutcome::Committed(settled))
    }

    async fn update_admin_notes(&self, id: WithdrawalId, notes: Option<&str>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("UPDATE withdrawal_requests SET admin_notes = ? WHERE id = ?")
            .bind(notes)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update admin notes")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Withdrawal request {} does not exist", id);
        }

        let consultant: Option<String> =
            sqlx::query_scalar("SELECT consultant_id FROM withdrawal_requests WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch withdrawal owner")?;
        if let Some(consultant) = consultant {
            self.publish(StoreEvent::WithdrawalChanged {
                id,
                consultant_id: Uuid::parse_str(&consultant).context("Invalid consultant ID")?,
            });
        }
        Ok(())
    }
}
