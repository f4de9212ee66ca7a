//! Inbound control messages from the debugger client
//!
//! Every message is an envelope `{"controlType": .., "payload": {..}}`.
//! Decoding compiles patterns and builds actions up front, so a command that
//! decodes successfully can be applied without further validation.

use crate::action::{RequestAction, RequestOverrideAction, ResponseAction};
use crate::error::DebuggerError;
use crate::filter::UrlPattern;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use wiretap_common::{DebugReplacementRequest, DebugReplacementResponse};

pub const MUTE_ACTIONS: &str = "muteActions";
pub const UNMUTE_ACTIONS: &str = "unmuteActions";
pub const ADD_BLACKLIST: &str = "addBlacklist";
pub const REMOVE_BLACKLIST: &str = "removeBlacklist";
pub const ADD_DEFAULT_RESPONSE: &str = "addDefaultResponse";
pub const DEBUG_REPLY: &str = "debugReply";
pub const ADD_REQUEST: &str = "addRequest";
pub const REMOVE_REQUEST: &str = "removeRequest";
pub const ADD_RESPONSE: &str = "addResponse";
pub const REMOVE_RESPONSE: &str = "removeResponse";
pub const ACTIVATE_ACTION: &str = "activateAction";
pub const DEACTIVATE_ACTION: &str = "deactivateAction";
pub const UPDATE_DELAYS: &str = "updateDelays";
pub const ADD_DEFAULT_REQUEST_OVERRIDE: &str = "addDefaultRequestOverride";
pub const ADD_REQUEST_OVERRIDE: &str = "addRequestOverride";
pub const REMOVE_REQUEST_OVERRIDE: &str = "removeRequestOverride";

/// Raw control message as received from the transport
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEnvelope {
    pub control_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl ControlEnvelope {
    pub fn parse(text: &str) -> Result<Self, DebuggerError> {
        serde_json::from_str(text).map_err(|e| DebuggerError::malformed(format!("invalid envelope: {}", e)))
    }
}

/// Decoded control command
#[derive(Debug)]
pub enum ControlCommand {
    MuteActions(bool),
    AddBlacklist(UrlPattern),
    RemoveBlacklist(String),
    AddRequestAction(RequestAction),
    RemoveRequestAction(String),
    AddResponseAction(ResponseAction),
    RemoveResponseAction(String),
    AddRequestOverrideAction(RequestOverrideAction),
    RemoveRequestOverrideAction(String),
    SetActionActive { id: String, active: bool },
    UpdateDelays {
        pre_blacklist_ms: Option<u64>,
        post_blacklist_ms: Option<u64>,
        time_per_call_us: Option<u64>,
    },
    /// Decision for a pending round trip. The body is interpreted once the
    /// engine knows which kind of round trip `message_id` belongs to.
    DebugReply { message_id: String, payload: Value },
}

#[derive(Deserialize)]
struct RegexPayload {
    regex: String,
}

#[derive(Deserialize)]
struct IdPayload {
    id: String,
}

#[derive(Deserialize)]
struct ActionPayload {
    id: String,
    regex: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DelaysPayload {
    pre_blacklist: Option<i64>,
    post_blacklist: Option<i64>,
    time_per_call: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyPayload {
    message_id: String,
}

impl ControlCommand {
    /// Decode an envelope. Unknown control types decode to `None`.
    pub fn decode(envelope: &ControlEnvelope) -> Result<Option<Self>, DebuggerError> {
        let payload = &envelope.payload;
        let command = match envelope.control_type.as_str() {
            MUTE_ACTIONS => Self::MuteActions(true),
            UNMUTE_ACTIONS => Self::MuteActions(false),
            ADD_BLACKLIST => {
                let p: RegexPayload = parse_payload(payload)?;
                Self::AddBlacklist(UrlPattern::new(&p.regex)?)
            }
            REMOVE_BLACKLIST => {
                let p: RegexPayload = parse_payload(payload)?;
                Self::RemoveBlacklist(p.regex)
            }
            ADD_DEFAULT_RESPONSE => {
                let p: ActionPayload = parse_payload(payload)?;
                let response: DebugReplacementResponse = parse_payload(payload)?;
                Self::AddRequestAction(RequestAction::default_response(p.id, &p.regex, response)?)
            }
            ADD_REQUEST => {
                let p: ActionPayload = parse_payload(payload)?;
                Self::AddRequestAction(RequestAction::debug(p.id, &p.regex)?)
            }
            REMOVE_REQUEST => Self::RemoveRequestAction(parse_payload::<IdPayload>(payload)?.id),
            ADD_RESPONSE => {
                let p: ActionPayload = parse_payload(payload)?;
                Self::AddResponseAction(ResponseAction::debug(p.id, &p.regex)?)
            }
            REMOVE_RESPONSE => Self::RemoveResponseAction(parse_payload::<IdPayload>(payload)?.id),
            ADD_DEFAULT_REQUEST_OVERRIDE => {
                let p: ActionPayload = parse_payload(payload)?;
                let request: DebugReplacementRequest = parse_payload(payload)?;
                Self::AddRequestOverrideAction(RequestOverrideAction::default_override(p.id, &p.regex, request)?)
            }
            ADD_REQUEST_OVERRIDE => {
                let p: ActionPayload = parse_payload(payload)?;
                Self::AddRequestOverrideAction(RequestOverrideAction::debug(p.id, &p.regex)?)
            }
            REMOVE_REQUEST_OVERRIDE => Self::RemoveRequestOverrideAction(parse_payload::<IdPayload>(payload)?.id),
            ACTIVATE_ACTION => Self::SetActionActive {
                id: parse_payload::<IdPayload>(payload)?.id,
                active: true,
            },
            DEACTIVATE_ACTION => Self::SetActionActive {
                id: parse_payload::<IdPayload>(payload)?.id,
                active: false,
            },
            UPDATE_DELAYS => {
                let p: DelaysPayload = parse_payload_or_empty(payload)?;
                Self::UpdateDelays {
                    pre_blacklist_ms: non_negative(p.pre_blacklist),
                    post_blacklist_ms: non_negative(p.post_blacklist),
                    time_per_call_us: non_negative(p.time_per_call),
                }
            }
            DEBUG_REPLY => Self::DebugReply {
                message_id: parse_payload::<ReplyPayload>(payload)?.message_id,
                payload: payload.clone(),
            },
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}

/// Interpret a `debugReply` body as a replacement response
pub fn parse_reply_response(payload: &Value) -> Result<DebugReplacementResponse, DebuggerError> {
    parse_payload(payload)
}

/// Interpret a `debugReply` body as a replacement request
pub fn parse_reply_request(payload: &Value) -> Result<DebugReplacementRequest, DebuggerError> {
    parse_payload(payload)
}

fn parse_payload<T: DeserializeOwned>(payload: &Value) -> Result<T, DebuggerError> {
    T::deserialize(payload).map_err(|e| DebuggerError::malformed(e.to_string()))
}

fn parse_payload_or_empty<T: DeserializeOwned>(payload: &Value) -> Result<T, DebuggerError> {
    if payload.is_null() {
        parse_payload(&Value::Object(Default::default()))
    } else {
        parse_payload(payload)
    }
}

fn non_negative(value: Option<i64>) -> Option<u64> {
    value.map(|v| v.max(0) as u64)
}
