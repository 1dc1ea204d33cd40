//! # rg-session
//!
//! Session manager. A user opens a session, declares a bounded sequence of
//! off-chain actions against it, and finally settles it with a single state
//! hash. Sessions expire after a period of inactivity; anyone may clean up
//! an expired session.
//!
//! State machine: `Active → Settled` or `Active → Ended`. Both are terminal.

pub mod action;
pub mod event;
pub mod id;
pub mod manager;
pub mod session;

pub use action::{ActionType, SessionAction};
pub use event::{EndCause, SessionEvent};
pub use id::{OsSeedSource, SeedSource};
pub use manager::{SessionError, SessionLimits, SessionManager};
pub use session::{Session, SessionStatus};
