// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use counsel::application::{Coordinator, NewService};
use counsel::config::SettlementPolicy;
use counsel::domain::{Actor, BankDetails, Cents, ConsultantId, ConsultationService};
use counsel::notify::MemorySink;
use counsel::storage::Repository;
use tempfile::TempDir;
use uuid::Uuid;

/// A coordinator over a temporary database, with notifications captured in memory.
pub struct TestEnv {
    pub coordinator: Coordinator,
    pub repo: Arc<Repository>,
    pub sink: Arc<MemorySink>,
    _temp: TempDir,
}

pub async fn test_env() -> Result<TestEnv> {
    test_env_with_policy(SettlementPolicy::default()).await
}

pub async fn test_env_with_policy(policy: SettlementPolicy) -> Result<TestEnv> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let repo = Arc::new(Repository::init(&format!("sqlite:{}?mode=rwc", db_path.display())).await?);
    let sink = Arc::new(MemorySink::new());
    let coordinator = Coordinator::with_repository(repo.clone(), policy, sink.clone());
    Ok(TestEnv {
        coordinator,
        repo,
        sink,
        _temp: temp_dir,
    })
}

pub fn new_consultant() -> (ConsultantId, Actor) {
    let id = Uuid::new_v4();
    (id, Actor::Consultant(id))
}

pub fn bank() -> BankDetails {
    BankDetails::new("First Bank", "Dana Smith", "DE89370400440532013000")
}

/// Credit cleared earnings so they are immediately available.
pub async fn fund(env: &TestEnv, consultant_id: ConsultantId, amount: Cents) -> Result<()> {
    env.coordinator
        .record_earning(&Actor::System, consultant_id, amount, true)
        .await?;
    Ok(())
}

pub fn tax_planning() -> NewService {
    NewService {
        title: "Tax Planning".to_string(),
        description: "One hour review of your tax situation".to_string(),
        price_cents: 12_000,
        duration_minutes: 60,
    }
}

/// Create a service and approve it, leaving it active.
pub async fn active_service(
    env: &TestEnv,
    consultant_id: ConsultantId,
) -> Result<ConsultationService> {
    let actor = Actor::Consultant(consultant_id);
    let service = env
        .coordinator
        .create_service(&actor, consultant_id, tax_planning())
        .await?;
    Ok(env
        .coordinator
        .approve_service(&Actor::Admin, service.id)
        .await?)
}
