//! Forward proxy core
//!
//! This module implements the proxy session lifecycle: the per-connection
//! state machine, the registry owning all live sessions, and the driver
//! that pumps bytes between the two legs of a session.

pub mod pipe;
pub mod registry;
pub mod session;

pub use registry::{Admission, ConnId, SessionRegistry};
pub use session::{ProxySession, SessionAction, SessionEvent, SessionState};
