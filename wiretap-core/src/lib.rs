//! Wiretap Core Library
//!
//! Control plane of an in-process HTTP interception debugger: the live rule
//! configuration pushed by an attached debugger client, the actions that
//! decide whether an exchange is answered, replaced or left alone, and the
//! blocking round trips that wait for the debugger's decision.

pub mod action;
pub mod controller;
pub mod filter;
pub mod reply;
pub mod store;

/// Debugger façade called by the transport and the HTTP integration layer
pub mod engine;

/// Control protocol (inbound) and debug queries (outbound)
pub mod control;
pub mod wire;

/// Configuration types and utilities
pub mod config;

/// Error types for debugger operations
pub mod error;

/// Logging configuration and initialization
pub mod logging;

pub use action::{
    ActionBase, DebugAction, RequestAction, RequestActionKind, RequestOverrideAction, RequestOverrideKind,
    ResponseAction, RoundTrip,
};
pub use config::DebuggerSettings;
pub use control::{ControlCommand, ControlEnvelope};
pub use controller::PendingReplies;
pub use engine::{Debugger, DebuggerState, ServerConnection};
pub use error::DebuggerError;
pub use filter::{Blacklist, UrlPattern};
pub use logging::{init_logging, LoggingConfig};
pub use reply::{reply_channel, ReplySender, ReplySlot};
pub use store::{ConfigSummary, DebuggerConfiguration};

/// Re-export of the exchange model shared with integrations
pub use wiretap_common::{
    DebugReplacementRequest, DebugReplacementResponse, InterceptedRequest, InterceptedResponse,
};

/// Result type alias for debugger operations
pub type Result<T> = std::result::Result<T, DebuggerError>;
