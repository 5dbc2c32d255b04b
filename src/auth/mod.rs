pub mod bridge;
pub mod session;

pub use bridge::{SessionBridge, SessionContext, SessionState};
pub use session::{AuthEvent, CurrentUser, IdentityProvider, Session};
