//! Session management core module.
//!
//! A session is the unit of work attached to one reassembled flow. The [`FlowDispatcher`]
//! creates sessions as the reassembler discovers flows, and a [`SessionHandler`] task drains,
//! classifies and reports each of them.
//!
//! [`FlowDispatcher`]: flow_dispatcher::FlowDispatcher
//! [`SessionHandler`]: session_handler::SessionHandler

use serde::{Deserialize, Serialize};

/// Submodule for the per-flow session factory.
pub mod flow_dispatcher;
/// Submodule for session data structures.
pub mod session;
/// Submodule for the task consuming one session.
pub mod session_handler;
/// Submodule for the byte pipe between the reassembler and a session.
pub mod stream;

pub use flow_dispatcher::{FlowDispatcher, SessionCounter};
pub use session::Session;
pub use session_handler::SessionHandler;
pub use stream::{session_stream, SessionInput, SessionReader};

/// Lifecycle of a session. States only move forward.
///
/// Variants:
/// - `Active`: bytes may still arrive.
/// - `Draining`: the stream ended and the content is being classified.
/// - `Closed`: the session is finished, with or without a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SessionState {
    Active,
    Draining,
    Closed,
}
