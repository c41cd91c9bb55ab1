use thiserror::Error;

use crate::domain::{Actor, Cents, ServiceValidationError, format_cents};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error(
        "Insufficient balance: requested {}, only {} available",
        money(.requested),
        money(.available)
    )]
    InsufficientBalance { available: Cents, requested: Cents },

    #[error("A reason is required to {0}")]
    MissingReason(&'static str),

    #[error("Cannot {action} {entity} {id}: it is '{from}'")]
    InvalidStateTransition {
        entity: &'static str,
        id: String,
        from: String,
        action: &'static str,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{actor} is not allowed to {action}")]
    Unauthorized { actor: Actor, action: &'static str },

    #[error("Invalid bank details: {0} is required")]
    InvalidBankDetails(&'static str),

    #[error("Invalid consultation service: {0}")]
    InvalidService(#[from] ServiceValidationError),

    #[error("Concurrent update to {0}; please retry")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

fn money(cents: &Cents) -> String {
    format_cents(*cents)
}

impl AppError {
    pub(crate) fn unauthorized(actor: &Actor, action: &'static str) -> Self {
        AppError::Unauthorized {
            actor: *actor,
            action,
        }
    }
}
