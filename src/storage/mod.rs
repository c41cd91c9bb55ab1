mod inbox;
mod repository;
mod services;
mod store;

pub use inbox::*;
pub use repository::*;
pub use store::*;

/// SQL migration for balances and withdrawal requests
pub const MIGRATION_001_LEDGER: &str = include_str!("migrations/001_ledger.sql");

/// SQL migration for consultation services
pub const MIGRATION_002_SERVICES: &str = include_str!("migrations/002_services.sql");

/// SQL migration for the notification inbox
pub const MIGRATION_003_NOTIFICATIONS: &str = include_str!("migrations/003_notifications.sql");
