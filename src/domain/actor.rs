use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ConsultantId = Uuid;

/// The party invoking an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "lowercase")]
pub enum Actor {
    /// Marketplace administrator
    Admin,
    /// A consultant, acting on their own entities
    Consultant(ConsultantId),
    /// The upstream payment-event producer
    System,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin)
    }

    /// True if this actor is the given consultant.
    pub fn is_consultant(&self, consultant_id: ConsultantId) -> bool {
        matches!(self, Actor::Consultant(id) if *id == consultant_id)
    }

    /// Admins see everything; consultants only what they own.
    pub fn can_read(&self, owner: ConsultantId) -> bool {
        self.is_admin() || self.is_consultant(owner)
    }

    /// Parse the CLI form: "admin", "system" or a consultant UUID.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Actor::Admin),
            "system" => Some(Actor::System),
            other => Uuid::parse_str(other).ok().map(Actor::Consultant),
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Admin => write!(f, "admin"),
            Actor::Consultant(id) => write!(f, "consultant {}", id),
            Actor::System => write!(f, "system"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_scoping() {
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(Actor::Admin.can_read(owner));
        assert!(Actor::Consultant(owner).can_read(owner));
        assert!(!Actor::Consultant(other).can_read(owner));
        assert!(!Actor::System.can_read(owner));
    }

    #[test]
    fn test_parse_actor() {
        let id = Uuid::new_v4();
        assert_eq!(Actor::from_str("Admin"), Some(Actor::Admin));
        assert_eq!(Actor::from_str("system"), Some(Actor::System));
        assert_eq!(
            Actor::from_str(&id.to_string()),
            Some(Actor::Consultant(id))
        );
        assert_eq!(Actor::from_str("nobody"), None);
    }
}
