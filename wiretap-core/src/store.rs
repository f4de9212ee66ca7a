//! Live debugger configuration
//!
//! One writer (the control channel) and many readers (request threads) share
//! a [`DebuggerConfiguration`]. Every accessor goes through
//! [`DebuggerConfiguration::with_read`] or [`DebuggerConfiguration::with_write`]
//! so no path can touch the state outside the lock.

use crate::action::{DebugAction, RequestAction, RequestOverrideAction, ResponseAction, RoundTrip};
use crate::filter::{Blacklist, UrlPattern};
use crate::reply::ReplySlot;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;
use wiretap_common::{
    DebugReplacementRequest, DebugReplacementResponse, InterceptedRequest, InterceptedResponse,
};

#[derive(Debug, Default)]
struct ConfigState {
    active: bool,
    actions_muted: bool,
    blacklist: Blacklist,
    request_actions: Vec<RequestAction>,
    response_actions: Vec<ResponseAction>,
    request_override_actions: Vec<RequestOverrideAction>,
    pre_blacklist_delay_ms: u64,
    post_blacklist_delay_ms: u64,
    min_call_duration_us: u64,
}

impl ConfigState {
    fn evaluates_actions(&self) -> bool {
        self.active && !self.actions_muted
    }
}

/// Point-in-time view of the configuration, for inspection and logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigSummary {
    pub active: bool,
    pub actions_muted: bool,
    pub blacklist_patterns: usize,
    pub request_actions: usize,
    pub response_actions: usize,
    pub request_override_actions: usize,
    pub pre_blacklist_delay_ms: u64,
    pub post_blacklist_delay_ms: u64,
    pub min_call_duration_us: u64,
}

impl ConfigSummary {
    /// No rules of any kind are registered
    pub fn is_empty(&self) -> bool {
        self.blacklist_patterns == 0
            && self.request_actions == 0
            && self.response_actions == 0
            && self.request_override_actions == 0
    }
}

#[derive(Debug, Default)]
pub struct DebuggerConfiguration {
    state: RwLock<ConfigState>,
}

impl DebuggerConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_read<R>(&self, f: impl FnOnce(&ConfigState) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn with_write<R>(&self, f: impl FnOnce(&mut ConfigState) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn active(&self) -> bool {
        self.with_read(|s| s.active)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.with_write(|s| s.active = active);
    }

    pub fn actions_muted(&self) -> bool {
        self.with_read(|s| s.actions_muted)
    }

    pub fn mute_actions(&self, muted: bool) {
        self.with_write(|s| s.actions_muted = muted);
    }

    /// Forget everything the debugger configured and become inactive
    pub fn connection_lost(&self) {
        self.with_write(|s| *s = ConfigState::default());
    }

    /// Returns whether the pattern was added (ignored while inactive)
    pub fn add_blacklist(&self, pattern: UrlPattern) -> bool {
        self.with_write(|s| {
            if s.active {
                s.blacklist.add(pattern);
            }
            s.active
        })
    }

    pub fn remove_blacklist(&self, source: &str) -> bool {
        self.with_write(|s| s.blacklist.remove(source))
    }

    pub fn is_blacklisted(&self, url: &str) -> bool {
        self.with_read(|s| s.active && s.blacklist.matches(url))
    }

    pub fn add_request_action(&self, action: RequestAction) -> bool {
        self.with_write(|s| push_if_active(s.active, &mut s.request_actions, action))
    }

    pub fn remove_request_action(&self, id: &str) -> usize {
        self.with_write(|s| remove_by_id(&mut s.request_actions, id))
    }

    pub fn add_response_action(&self, action: ResponseAction) -> bool {
        self.with_write(|s| push_if_active(s.active, &mut s.response_actions, action))
    }

    pub fn remove_response_action(&self, id: &str) -> usize {
        self.with_write(|s| remove_by_id(&mut s.response_actions, id))
    }

    pub fn add_request_override_action(&self, action: RequestOverrideAction) -> bool {
        self.with_write(|s| push_if_active(s.active, &mut s.request_override_actions, action))
    }

    pub fn remove_request_override_action(&self, id: &str) -> usize {
        self.with_write(|s| remove_by_id(&mut s.request_override_actions, id))
    }

    /// Flip the active flag of every action with `id`, in all three lists.
    /// Returns how many actions were touched.
    pub fn set_action_active(&self, id: &str, active: bool) -> usize {
        self.with_write(|s| {
            set_active_by_id(&mut s.request_actions, id, active)
                + set_active_by_id(&mut s.response_actions, id, active)
                + set_active_by_id(&mut s.request_override_actions, id, active)
        })
    }

    pub fn handle_request_override(
        &self,
        request: &InterceptedRequest,
        round_trip: &dyn RoundTrip,
    ) -> Option<ReplySlot<DebugReplacementRequest>> {
        self.with_read(|s| {
            if !s.evaluates_actions() {
                return None;
            }
            s.request_override_actions
                .iter()
                .find_map(|action| action.handle_request_override(request, round_trip))
        })
    }

    pub fn handle_request(
        &self,
        request: &InterceptedRequest,
        round_trip: &dyn RoundTrip,
    ) -> Option<ReplySlot<DebugReplacementResponse>> {
        self.with_read(|s| {
            if !s.evaluates_actions() {
                return None;
            }
            s.request_actions
                .iter()
                .find_map(|action| action.handle_request(request, round_trip))
        })
    }

    pub fn handle_response(
        &self,
        request: &InterceptedRequest,
        response: &InterceptedResponse,
        round_trip: &dyn RoundTrip,
    ) -> Option<ReplySlot<DebugReplacementResponse>> {
        self.with_read(|s| {
            if !s.evaluates_actions() {
                return None;
            }
            s.response_actions
                .iter()
                .find_map(|action| action.handle_response(request, response, round_trip))
        })
    }

    pub fn pre_blacklist_delay(&self) -> Duration {
        self.with_read(|s| {
            if s.active {
                Duration::from_millis(s.pre_blacklist_delay_ms)
            } else {
                Duration::ZERO
            }
        })
    }

    pub fn post_blacklist_delay(&self) -> Duration {
        self.with_read(|s| {
            if s.active {
                Duration::from_millis(s.post_blacklist_delay_ms)
            } else {
                Duration::ZERO
            }
        })
    }

    pub fn min_call_duration(&self) -> Duration {
        self.with_read(|s| {
            if s.active {
                Duration::from_micros(s.min_call_duration_us)
            } else {
                Duration::ZERO
            }
        })
    }

    /// Replace the whole delay policy. A missing value resets to zero.
    pub fn update_delays(&self, pre_ms: Option<u64>, post_ms: Option<u64>, per_call_us: Option<u64>) {
        self.with_write(|s| {
            s.pre_blacklist_delay_ms = pre_ms.unwrap_or(0);
            s.post_blacklist_delay_ms = post_ms.unwrap_or(0);
            s.min_call_duration_us = per_call_us.unwrap_or(0);
        });
    }

    pub fn summary(&self) -> ConfigSummary {
        self.with_read(|s| ConfigSummary {
            active: s.active,
            actions_muted: s.actions_muted,
            blacklist_patterns: s.blacklist.len(),
            request_actions: s.request_actions.len(),
            response_actions: s.response_actions.len(),
            request_override_actions: s.request_override_actions.len(),
            pre_blacklist_delay_ms: s.pre_blacklist_delay_ms,
            post_blacklist_delay_ms: s.post_blacklist_delay_ms,
            min_call_duration_us: s.min_call_duration_us,
        })
    }
}

fn push_if_active<A: DebugAction>(active: bool, list: &mut Vec<A>, action: A) -> bool {
    if active {
        debug!("Registering action {}", action.id());
        list.push(action);
    }
    active
}

fn remove_by_id<A: DebugAction>(list: &mut Vec<A>, id: &str) -> usize {
    let before = list.len();
    list.retain(|a| a.id() != id);
    before - list.len()
}

fn set_active_by_id<A: DebugAction>(list: &mut [A], id: &str, active: bool) -> usize {
    let mut touched = 0;
    for action in list.iter_mut().filter(|a| a.id() == id) {
        action.base_mut().set_active(active);
        touched += 1;
    }
    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::tests::CountingRoundTrip;
    use std::sync::atomic::Ordering;

    fn active_config() -> DebuggerConfiguration {
        let config = DebuggerConfiguration::new();
        config.set_active(true);
        config
    }

    fn request(url: &str) -> InterceptedRequest {
        InterceptedRequest::new("req", url, "GET")
    }

    fn canned(id: &str, regex: &str, code: i32) -> RequestAction {
        RequestAction::default_response(id, regex, DebugReplacementResponse::new(code, "canned")).unwrap()
    }

    #[test]
    fn test_inactive_store_ignores_adds() {
        let config = DebuggerConfiguration::new();
        assert!(!config.add_blacklist(UrlPattern::new(".*").unwrap()));
        assert!(!config.add_request_action(canned("a", ".*", 200)));
        assert!(config.summary().is_empty());
        assert!(!config.is_blacklisted("https://x"));
    }

    #[test]
    fn test_blacklist_requires_active() {
        let config = active_config();
        assert!(config.add_blacklist(UrlPattern::new(".*/health$").unwrap()));
        assert!(config.is_blacklisted("https://x/health"));
        assert!(!config.is_blacklisted("https://x/users"));

        config.set_active(false);
        assert!(!config.is_blacklisted("https://x/health"));
    }

    #[test]
    fn test_connection_lost_resets_everything() {
        let config = active_config();
        config.add_blacklist(UrlPattern::new(".*").unwrap());
        config.add_request_action(canned("a", ".*", 200));
        config.add_response_action(ResponseAction::debug("b", ".*").unwrap());
        config.add_request_override_action(RequestOverrideAction::debug("c", ".*").unwrap());
        config.mute_actions(true);
        config.update_delays(Some(10), Some(20), Some(30));

        config.connection_lost();
        let summary = config.summary();
        assert_eq!(summary, ConfigSummary::default());

        config.connection_lost();
        assert_eq!(config.summary(), ConfigSummary::default());
    }

    #[test]
    fn test_first_matching_action_wins() {
        let rt = CountingRoundTrip::default();
        let config = active_config();
        config.add_request_action(canned("first", ".*/users", 401));
        config.add_request_action(canned("second", ".*", 500));

        let slot = config.handle_request(&request("https://api.test/users"), &rt).unwrap();
        assert_eq!(slot.get().unwrap().code, 401);

        let slot = config.handle_request(&request("https://api.test/posts"), &rt).unwrap();
        assert_eq!(slot.get().unwrap().code, 500);
    }

    #[test]
    fn test_deactivated_action_falls_through() {
        let rt = CountingRoundTrip::default();
        let config = active_config();
        config.add_request_action(canned("first", ".*", 401));
        config.add_request_action(canned("second", ".*", 500));

        assert_eq!(config.set_action_active("first", false), 1);
        let slot = config.handle_request(&request("https://x"), &rt).unwrap();
        assert_eq!(slot.get().unwrap().code, 500);

        assert_eq!(config.set_action_active("missing", false), 0);
        config.set_action_active("first", true);
        let slot = config.handle_request(&request("https://x"), &rt).unwrap();
        assert_eq!(slot.get().unwrap().code, 401);
    }

    #[test]
    fn test_set_action_active_covers_override_list() {
        let rt = CountingRoundTrip::default();
        let config = active_config();
        config.add_request_override_action(RequestOverrideAction::debug("o", ".*").unwrap());
        config.set_action_active("o", false);
        assert!(config.handle_request_override(&request("https://x"), &rt).is_none());
        assert_eq!(rt.overrides.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_by_id_removes_all_matches() {
        let config = active_config();
        config.add_request_action(canned("dup", ".*", 1));
        config.add_request_action(canned("dup", ".*", 2));
        config.add_request_action(canned("keep", ".*", 3));
        assert_eq!(config.remove_request_action("dup"), 2);
        assert_eq!(config.summary().request_actions, 1);
        assert_eq!(config.remove_request_action("dup"), 0);
    }

    #[test]
    fn test_mute_suppresses_without_clearing() {
        let rt = CountingRoundTrip::default();
        let config = active_config();
        config.add_request_action(canned("a", ".*", 418));
        config.add_response_action(ResponseAction::debug("b", ".*").unwrap());

        config.mute_actions(true);
        let response = InterceptedResponse::new("req", 200, "OK");
        assert!(config.handle_request(&request("https://x"), &rt).is_none());
        assert!(config.handle_response(&request("https://x"), &response, &rt).is_none());
        assert_eq!(config.summary().request_actions, 1);

        config.mute_actions(false);
        assert!(config.handle_request(&request("https://x"), &rt).is_some());
        assert!(config.handle_response(&request("https://x"), &response, &rt).is_some());
    }

    #[test]
    fn test_delays_reset_when_missing_and_zero_when_inactive() {
        let config = active_config();
        config.update_delays(Some(100), Some(200), Some(300));
        assert_eq!(config.pre_blacklist_delay(), Duration::from_millis(100));
        assert_eq!(config.post_blacklist_delay(), Duration::from_millis(200));
        assert_eq!(config.min_call_duration(), Duration::from_micros(300));

        config.update_delays(Some(5), None, None);
        assert_eq!(config.pre_blacklist_delay(), Duration::from_millis(5));
        assert_eq!(config.post_blacklist_delay(), Duration::ZERO);
        assert_eq!(config.min_call_duration(), Duration::ZERO);

        config.set_active(false);
        assert_eq!(config.pre_blacklist_delay(), Duration::ZERO);
    }
}
