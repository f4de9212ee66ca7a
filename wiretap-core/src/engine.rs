//! Debugger engine façade
//!
//! The transport hands control messages and connection lifecycle events to
//! [`Debugger`]; the HTTP integration layer calls its query methods once per
//! intercepted request/response, from any number of threads.
//!
//! Query methods never fail: a missing connection, an unmatched rule, a
//! dropped connection or a timed out wait all mean "proceed unchanged". Only
//! the delay methods report an error, when their sleep is interrupted by
//! [`Debugger::shutdown`].

use crate::action::RoundTrip;
use crate::config::DebuggerSettings;
use crate::control::{self, ControlCommand, ControlEnvelope};
use crate::controller::PendingReplies;
use crate::error::DebuggerError;
use crate::reply::ReplySlot;
use crate::store::{ConfigSummary, DebuggerConfiguration};
use crate::wire;
use serde_json::Value;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wiretap_common::{
    DebugReplacementRequest, DebugReplacementResponse, InterceptedRequest, InterceptedResponse,
};

/// Control connection to an attached debugger client, provided by the
/// transport. Connections are compared by identity only.
pub trait ServerConnection: Send + Sync {
    fn send(&self, text: &str) -> Result<(), DebuggerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerState {
    Detached,
    Attached,
}

pub struct Debugger {
    settings: DebuggerSettings,
    configuration: DebuggerConfiguration,
    connection: RwLock<Option<Weak<dyn ServerConnection>>>,
    waiting_responses: PendingReplies<DebugReplacementResponse>,
    waiting_requests: PendingReplies<DebugReplacementRequest>,
    stopped: Mutex<bool>,
    wakeup: Condvar,
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new(DebuggerSettings::default())
    }
}

impl Debugger {
    pub fn new(settings: DebuggerSettings) -> Self {
        Self {
            settings,
            configuration: DebuggerConfiguration::new(),
            connection: RwLock::new(None),
            waiting_responses: PendingReplies::new(),
            waiting_requests: PendingReplies::new(),
            stopped: Mutex::new(false),
            wakeup: Condvar::new(),
        }
    }

    pub fn settings(&self) -> &DebuggerSettings {
        &self.settings
    }

    pub fn state(&self) -> DebuggerState {
        match self.current_connection() {
            Some(_) => DebuggerState::Attached,
            None => DebuggerState::Detached,
        }
    }

    pub fn configuration_summary(&self) -> ConfigSummary {
        self.configuration.summary()
    }

    /// Number of round trips still waiting for the debugger
    pub fn pending_replies(&self) -> usize {
        self.waiting_responses.len() + self.waiting_requests.len()
    }

    /// A debugger client attached. Whatever the previous session configured
    /// is discarded; the new client is expected to resend its rules.
    pub fn on_attached(&self, connection: &Arc<dyn ServerConnection>) {
        if self.is_stopped() {
            warn!("Debugger is shut down, refusing attach");
            return;
        }
        self.release_session();
        *self.connection.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::downgrade(connection));
        info!("Debugger attached");
    }

    /// The control connection is gone
    pub fn on_connection_closed(&self) {
        self.release_session();
        info!("Debugger detached");
    }

    /// Entry point for raw control messages from the transport
    pub fn on_control_message(&self, text: &str, origin: &Arc<dyn ServerConnection>) {
        match ControlEnvelope::parse(text) {
            Ok(envelope) => self.on_control_envelope(envelope, origin),
            Err(e) => warn!("Invalid debugger control message: {}", e),
        }
    }

    /// Entry point for control messages already parsed by the transport
    pub fn on_control_envelope(&self, envelope: ControlEnvelope, origin: &Arc<dyn ServerConnection>) {
        if !self.is_current(origin) {
            debug!(control_type = %envelope.control_type, "Ignoring control message from stale connection");
            return;
        }

        let command = match ControlCommand::decode(&envelope) {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!(control_type = %envelope.control_type, "Ignoring unknown control message");
                return;
            }
            Err(e) => {
                warn!(control_type = %envelope.control_type, error = %e, "Invalid debugger control message");
                return;
            }
        };

        if !self.configuration.active() {
            self.configuration.set_active(true);
            info!("Debugger configuration activated");
        }
        self.apply(command);
    }

    pub fn is_active(&self) -> bool {
        self.configuration.active()
    }

    pub fn is_blacklisted(&self, url: &str) -> bool {
        self.configuration.is_blacklisted(url)
    }

    /// Replacement for `request` before it is sent, if a rule asks for one
    pub fn override_request(&self, request: &InterceptedRequest) -> Option<DebugReplacementRequest> {
        self.current_connection()?;
        let slot = self.configuration.handle_request_override(request, self)?;
        self.await_decision(&slot, &self.waiting_requests, request.message_id())
    }

    /// Response to use instead of performing `request`, if a rule asks for one
    pub fn handle_request(&self, request: &InterceptedRequest) -> Option<DebugReplacementResponse> {
        self.current_connection()?;
        let slot = self.configuration.handle_request(request, self)?;
        self.await_decision(&slot, &self.waiting_responses, request.message_id())
    }

    /// Response to use instead of `response`, if a rule asks for one
    pub fn handle_response(
        &self,
        request: &InterceptedRequest,
        response: &InterceptedResponse,
    ) -> Option<DebugReplacementResponse> {
        self.current_connection()?;
        let slot = self.configuration.handle_response(request, response, self)?;
        self.await_decision(&slot, &self.waiting_responses, request.message_id())
    }

    /// Sleep for the configured pre-blacklist delay. Returns whether a sleep happened.
    pub fn apply_delay_before_blacklist(&self) -> Result<bool, DebuggerError> {
        self.delay(self.configuration.pre_blacklist_delay())
    }

    /// Sleep for the configured post-blacklist delay. Returns whether a sleep happened.
    pub fn apply_delay_after_blacklist(&self) -> Result<bool, DebuggerError> {
        self.delay(self.configuration.post_blacklist_delay())
    }

    /// Stretch a call that started at `started` to the configured minimum
    /// duration. Only the remaining deficit is slept.
    pub fn ensure_minimum_call_duration(&self, started: Instant) -> Result<bool, DebuggerError> {
        let minimum = self.configuration.min_call_duration();
        match minimum.checked_sub(started.elapsed()) {
            Some(deficit) => self.delay(deficit),
            None => Ok(false),
        }
    }

    /// Tear the engine down: release every blocked caller, interrupt running
    /// delays and refuse further attaches.
    pub fn shutdown(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wakeup.notify_all();
        self.release_session();
        info!("Debugger shut down");
    }

    /// [`Debugger::override_request`] for async callers, run off the runtime's worker threads
    pub async fn override_request_async(self: &Arc<Self>, request: InterceptedRequest) -> Option<DebugReplacementRequest> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.override_request(&request))
            .await
            .unwrap_or_else(|e| {
                warn!("Request override task failed: {}", e);
                None
            })
    }

    /// [`Debugger::handle_request`] for async callers
    pub async fn handle_request_async(self: &Arc<Self>, request: InterceptedRequest) -> Option<DebugReplacementResponse> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.handle_request(&request))
            .await
            .unwrap_or_else(|e| {
                warn!("Request handling task failed: {}", e);
                None
            })
    }

    /// [`Debugger::handle_response`] for async callers
    pub async fn handle_response_async(
        self: &Arc<Self>,
        request: InterceptedRequest,
        response: InterceptedResponse,
    ) -> Option<DebugReplacementResponse> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.handle_response(&request, &response))
            .await
            .unwrap_or_else(|e| {
                warn!("Response handling task failed: {}", e);
                None
            })
    }

    fn apply(&self, command: ControlCommand) {
        let config = &self.configuration;
        match command {
            ControlCommand::MuteActions(muted) => config.mute_actions(muted),
            ControlCommand::AddBlacklist(pattern) => {
                config.add_blacklist(pattern);
            }
            ControlCommand::RemoveBlacklist(source) => {
                config.remove_blacklist(&source);
            }
            ControlCommand::AddRequestAction(action) => {
                config.add_request_action(action);
            }
            ControlCommand::RemoveRequestAction(id) => {
                config.remove_request_action(&id);
            }
            ControlCommand::AddResponseAction(action) => {
                config.add_response_action(action);
            }
            ControlCommand::RemoveResponseAction(id) => {
                config.remove_response_action(&id);
            }
            ControlCommand::AddRequestOverrideAction(action) => {
                config.add_request_override_action(action);
            }
            ControlCommand::RemoveRequestOverrideAction(id) => {
                config.remove_request_override_action(&id);
            }
            ControlCommand::SetActionActive { id, active } => {
                if config.set_action_active(&id, active) == 0 {
                    debug!("No action with id {} to toggle", id);
                }
            }
            ControlCommand::UpdateDelays {
                pre_blacklist_ms,
                post_blacklist_ms,
                time_per_call_us,
            } => config.update_delays(pre_blacklist_ms, post_blacklist_ms, time_per_call_us),
            ControlCommand::DebugReply { message_id, payload } => self.on_debug_reply(&message_id, &payload),
        }
    }

    fn on_debug_reply(&self, message_id: &str, payload: &Value) {
        if self.waiting_requests.contains(message_id) {
            match control::parse_reply_request(payload) {
                Ok(request) => {
                    self.waiting_requests.fulfill(message_id, Some(request));
                }
                Err(e) => warn!("Invalid request override reply for {}: {}", message_id, e),
            }
        } else if self.waiting_responses.contains(message_id) {
            match control::parse_reply_response(payload) {
                Ok(response) => {
                    self.waiting_responses.fulfill(message_id, Some(response));
                }
                Err(e) => warn!("Invalid debug reply for {}: {}", message_id, e),
            }
        } else {
            debug!("Discarding reply for unknown message {}", message_id);
        }
    }

    /// Forget the connection, reset the configuration and release waiters.
    /// The write lock taken by `connection_lost` waits for evaluations still
    /// holding the read lock, so their round trips are registered before
    /// the drain runs.
    fn release_session(&self) {
        *self.connection.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.configuration.connection_lost();
        self.waiting_responses.drain();
        self.waiting_requests.drain();
    }

    fn current_connection(&self) -> Option<Arc<dyn ServerConnection>> {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn is_current(&self, origin: &Arc<dyn ServerConnection>) -> bool {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |current| {
                Weak::as_ptr(current) as *const () == Arc::as_ptr(origin) as *const ()
            })
    }

    fn await_decision<T: Clone>(&self, slot: &ReplySlot<T>, pending: &PendingReplies<T>, message_id: &str) -> Option<T> {
        let Some(timeout) = self.settings.reply_timeout() else {
            return slot.get();
        };
        match slot.get_timeout(timeout) {
            Ok(decision) => decision,
            Err(e) => {
                if pending.fulfill(message_id, None) {
                    warn!("Giving up on debugger decision for {}: {}", message_id, e);
                    return None;
                }
                // Entry already taken by a reply or a drain, which fills the slot next
                slot.get()
            }
        }
    }

    fn delay(&self, duration: Duration) -> Result<bool, DebuggerError> {
        let duration = duration.min(self.settings.max_delay());
        if duration.is_zero() {
            return Ok(false);
        }
        self.sleep(duration)?;
        Ok(true)
    }

    fn sleep(&self, duration: Duration) -> Result<(), DebuggerError> {
        let stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (stopped, _) = self
            .wakeup
            .wait_timeout_while(stopped, duration, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        if *stopped {
            Err(DebuggerError::Interrupted)
        } else {
            Ok(())
        }
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RoundTrip for Debugger {
    fn request_decision(
        &self,
        request: &InterceptedRequest,
        response: Option<&InterceptedResponse>,
    ) -> Option<ReplySlot<DebugReplacementResponse>> {
        let connection = self.current_connection()?;
        let message_id = request.message_id();
        let slot = self.waiting_responses.register(message_id);

        debug!(message_id, url = request.url(), "Asking debugger for a response");
        if let Err(e) = connection.send(&wire::debug_request_message(message_id, response)) {
            warn!("Failed to send debug request {}: {}", message_id, e);
            self.waiting_responses.fulfill(message_id, None);
        }
        Some(slot)
    }

    fn override_decision(&self, request: &InterceptedRequest) -> Option<ReplySlot<DebugReplacementRequest>> {
        let connection = self.current_connection()?;
        let message_id = request.message_id();
        let slot = self.waiting_requests.register(message_id);

        debug!(message_id, url = request.url(), "Asking debugger for a request override");
        if let Err(e) = connection.send(&wire::debug_request_override_message(message_id, request)) {
            warn!("Failed to send request override query {}: {}", message_id, e);
            self.waiting_requests.fulfill(message_id, None);
        }
        Some(slot)
    }
}

impl std::fmt::Debug for Debugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debugger")
            .field("state", &self.state())
            .field("configuration", &self.configuration.summary())
            .field("pending_replies", &self.pending_replies())
            .finish()
    }
}
