//! Session bookkeeping for streaming relay requests.
//!
//! Provides:
//! - `Session` - One logical streaming connection
//! - `SessionManager` - Create, resume, track and expire sessions

pub mod manager;
pub mod session;

pub use manager::{SessionError, SessionManager};
pub use session::{Session, SessionId, SessionState};
