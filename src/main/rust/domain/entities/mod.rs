mod session;
mod session_lifecycle;

pub use session::{Session, SessionId};
pub use session_lifecycle::{SessionLifecycle, StateTransition};
