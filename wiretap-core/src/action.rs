//! Debugger actions
//!
//! Actions are registered by the debugger client and evaluated for every
//! intercepted exchange. Three capability families exist:
//! - [`RequestAction`]: may answer a request before it is sent
//! - [`ResponseAction`]: may replace a response after it arrived
//! - [`RequestOverrideAction`]: may replace the request itself
//!
//! Each family has a `Default` kind that answers immediately and a `Debug`
//! kind that asks the attached debugger through a [`RoundTrip`].

use crate::error::DebuggerError;
use crate::filter::UrlPattern;
use crate::reply::ReplySlot;
use wiretap_common::{
    DebugReplacementRequest, DebugReplacementResponse, InterceptedRequest, InterceptedResponse,
};

/// Asks the attached debugger for a live decision. Implemented by the engine.
pub trait RoundTrip {
    /// Query a replacement response for `request` (and `response`, once it
    /// arrived). `None` when no query could be started.
    fn request_decision(
        &self,
        request: &InterceptedRequest,
        response: Option<&InterceptedResponse>,
    ) -> Option<ReplySlot<DebugReplacementResponse>>;

    /// Query a replacement request for `request`
    fn override_decision(&self, request: &InterceptedRequest) -> Option<ReplySlot<DebugReplacementRequest>>;
}

/// Fields shared by every action
#[derive(Debug, Clone)]
pub struct ActionBase {
    id: String,
    active: bool,
    pattern: UrlPattern,
}

impl ActionBase {
    pub fn new(id: impl Into<String>, regex: &str) -> Result<Self, DebuggerError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DebuggerError::malformed("action id must not be empty"));
        }
        Ok(Self {
            id,
            active: true,
            pattern: UrlPattern::new(regex)?,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    fn applies_to(&self, url: &str) -> bool {
        self.active && self.pattern.matches(url)
    }
}

/// Access to the shared base, used by the store for id based bookkeeping
pub trait DebugAction {
    fn base(&self) -> &ActionBase;
    fn base_mut(&mut self) -> &mut ActionBase;

    fn id(&self) -> &str {
        self.base().id()
    }
}

#[derive(Debug, Clone)]
pub enum RequestActionKind {
    /// Answer with a canned response
    DefaultResponse(DebugReplacementResponse),
    /// Suspend the caller until the debugger answers
    Debug,
}

#[derive(Debug, Clone)]
pub struct RequestAction {
    base: ActionBase,
    kind: RequestActionKind,
}

impl RequestAction {
    pub fn default_response(
        id: impl Into<String>,
        regex: &str,
        response: DebugReplacementResponse,
    ) -> Result<Self, DebuggerError> {
        Ok(Self {
            base: ActionBase::new(id, regex)?,
            kind: RequestActionKind::DefaultResponse(response),
        })
    }

    pub fn debug(id: impl Into<String>, regex: &str) -> Result<Self, DebuggerError> {
        Ok(Self {
            base: ActionBase::new(id, regex)?,
            kind: RequestActionKind::Debug,
        })
    }

    pub fn kind(&self) -> &RequestActionKind {
        &self.kind
    }

    pub fn handle_request(
        &self,
        request: &InterceptedRequest,
        round_trip: &dyn RoundTrip,
    ) -> Option<ReplySlot<DebugReplacementResponse>> {
        if !self.base.applies_to(request.url()) {
            return None;
        }
        match &self.kind {
            RequestActionKind::DefaultResponse(response) => Some(ReplySlot::ready(response.clone())),
            RequestActionKind::Debug => round_trip.request_decision(request, None),
        }
    }
}

impl DebugAction for RequestAction {
    fn base(&self) -> &ActionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ActionBase {
        &mut self.base
    }
}

/// Offers the debugger every matching response after it arrived
#[derive(Debug, Clone)]
pub struct ResponseAction {
    base: ActionBase,
}

impl ResponseAction {
    pub fn debug(id: impl Into<String>, regex: &str) -> Result<Self, DebuggerError> {
        Ok(Self {
            base: ActionBase::new(id, regex)?,
        })
    }

    pub fn handle_response(
        &self,
        request: &InterceptedRequest,
        response: &InterceptedResponse,
        round_trip: &dyn RoundTrip,
    ) -> Option<ReplySlot<DebugReplacementResponse>> {
        if !self.base.applies_to(request.url()) {
            return None;
        }
        round_trip.request_decision(request, Some(response))
    }
}

impl DebugAction for ResponseAction {
    fn base(&self) -> &ActionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ActionBase {
        &mut self.base
    }
}

#[derive(Debug, Clone)]
pub enum RequestOverrideKind {
    /// Rewrite with a canned request
    DefaultOverride(DebugReplacementRequest),
    /// Suspend the caller until the debugger supplies a request
    Debug,
}

#[derive(Debug, Clone)]
pub struct RequestOverrideAction {
    base: ActionBase,
    kind: RequestOverrideKind,
}

impl RequestOverrideAction {
    pub fn default_override(
        id: impl Into<String>,
        regex: &str,
        request: DebugReplacementRequest,
    ) -> Result<Self, DebuggerError> {
        Ok(Self {
            base: ActionBase::new(id, regex)?,
            kind: RequestOverrideKind::DefaultOverride(request),
        })
    }

    pub fn debug(id: impl Into<String>, regex: &str) -> Result<Self, DebuggerError> {
        Ok(Self {
            base: ActionBase::new(id, regex)?,
            kind: RequestOverrideKind::Debug,
        })
    }

    pub fn kind(&self) -> &RequestOverrideKind {
        &self.kind
    }

    pub fn handle_request_override(
        &self,
        request: &InterceptedRequest,
        round_trip: &dyn RoundTrip,
    ) -> Option<ReplySlot<DebugReplacementRequest>> {
        if !self.base.applies_to(request.url()) {
            return None;
        }
        match &self.kind {
            RequestOverrideKind::DefaultOverride(replacement) => Some(ReplySlot::ready(replacement.clone())),
            RequestOverrideKind::Debug => round_trip.override_decision(request),
        }
    }
}

impl DebugAction for RequestOverrideAction {
    fn base(&self) -> &ActionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ActionBase {
        &mut self.base
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Round trip that answers immediately and counts queries
    #[derive(Default)]
    pub(crate) struct CountingRoundTrip {
        pub(crate) requests: AtomicUsize,
        pub(crate) overrides: AtomicUsize,
    }

    impl RoundTrip for CountingRoundTrip {
        fn request_decision(
            &self,
            _request: &InterceptedRequest,
            response: Option<&InterceptedResponse>,
        ) -> Option<ReplySlot<DebugReplacementResponse>> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let code = response.map(|r| r.status_code() as i32).unwrap_or(299);
            Some(ReplySlot::ready(DebugReplacementResponse::new(code, "from debugger")))
        }

        fn override_decision(&self, _request: &InterceptedRequest) -> Option<ReplySlot<DebugReplacementRequest>> {
            self.overrides.fetch_add(1, Ordering::SeqCst);
            Some(ReplySlot::ready(DebugReplacementRequest::new("https://debugger/", "PUT")))
        }
    }

    fn request(url: &str) -> InterceptedRequest {
        InterceptedRequest::new("req-1", url, "GET")
    }

    #[test]
    fn test_default_response_matches_without_round_trip() {
        let rt = CountingRoundTrip::default();
        let action = RequestAction::default_response(
            "a1",
            r"^https://api\.test/.*$",
            DebugReplacementResponse::new(503, "Service Unavailable"),
        )
        .unwrap();

        let slot = action.handle_request(&request("https://api.test/users"), &rt).unwrap();
        assert_eq!(slot.get().unwrap().code, 503);
        assert!(action.handle_request(&request("https://other.test/x"), &rt).is_none());
        assert_eq!(rt.requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_debug_request_uses_round_trip() {
        let rt = CountingRoundTrip::default();
        let action = RequestAction::debug("a2", ".*").unwrap();
        let slot = action.handle_request(&request("https://x/y"), &rt).unwrap();
        assert_eq!(slot.get().unwrap().code, 299);
        assert_eq!(rt.requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inactive_action_is_skipped() {
        let rt = CountingRoundTrip::default();
        let mut action = RequestAction::debug("a3", ".*").unwrap();
        action.base_mut().set_active(false);
        assert!(action.handle_request(&request("https://x/y"), &rt).is_none());
        assert_eq!(rt.requests.load(Ordering::SeqCst), 0);

        action.base_mut().set_active(true);
        assert!(action.handle_request(&request("https://x/y"), &rt).is_some());
    }

    #[test]
    fn test_response_action_passes_response() {
        let rt = CountingRoundTrip::default();
        let action = ResponseAction::debug("r1", ".*/users").unwrap();
        let response = InterceptedResponse::new("req-1", 404, "Not Found");

        let slot = action
            .handle_response(&request("https://api.test/users"), &response, &rt)
            .unwrap();
        assert_eq!(slot.get().unwrap().code, 404);
        assert!(action
            .handle_response(&request("https://api.test/posts"), &response, &rt)
            .is_none());
    }

    #[test]
    fn test_override_kinds() {
        let rt = CountingRoundTrip::default();
        let canned = RequestOverrideAction::default_override(
            "o1",
            ".*/v1/.*",
            DebugReplacementRequest::new("https://api.test/v2/users", "GET"),
        )
        .unwrap();
        let slot = canned
            .handle_request_override(&request("https://api.test/v1/users"), &rt)
            .unwrap();
        assert_eq!(slot.get().unwrap().url, "https://api.test/v2/users");
        assert_eq!(rt.overrides.load(Ordering::SeqCst), 0);

        let live = RequestOverrideAction::debug("o2", ".*").unwrap();
        let slot = live.handle_request_override(&request("https://x"), &rt).unwrap();
        assert_eq!(slot.get().unwrap().method, "PUT");
        assert_eq!(rt.overrides.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_construction_failures() {
        assert!(RequestAction::debug("bad", "([a-z]").unwrap_err().is_malformed_rule());
        assert!(ResponseAction::debug("", ".*").unwrap_err().is_malformed_rule());
    }
}
