mod actor;
mod balance;
mod consultation;
mod money;
mod notification;
mod transition;
mod withdrawal;

pub use actor::*;
pub use balance::*;
pub use consultation::*;
pub use money::*;
pub use notification::*;
pub use transition::*;
pub use withdrawal::*;
