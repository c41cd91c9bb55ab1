use thiserror::Error;

/// Why a status transition was refused by a domain entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} from status '{from}'")]
    InvalidEdge {
        from: &'static str,
        action: &'static str,
    },

    #[error("a reason is required")]
    MissingReason,
}
