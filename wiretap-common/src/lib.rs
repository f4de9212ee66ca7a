//! Shared records for the wiretap workspace
//!
//! The HTTP integration layer maps its native request/response objects onto
//! these types before handing them to the debugger engine.

pub mod exchange;

pub use exchange::{
    encode_body, DebugReplacementRequest, DebugReplacementResponse, ExchangeError, Headers,
    InterceptedRequest, InterceptedResponse, ResponseTimings,
};
