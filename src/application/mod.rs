// Application layer: use cases and orchestration.
// The engines own their entities' state machines; the coordinator adds
// authorization and notifications on top.

pub mod coordinator;
pub mod error;
pub mod moderation;
pub mod settlement;

pub use coordinator::*;
pub use error::*;
pub use moderation::*;
pub use settlement::*;
