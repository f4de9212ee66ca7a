//! Single-assignment rendezvous between the control channel and a blocked
//! request thread
//!
//! [`reply_channel`] hands out a [`ReplySender`] (kept by whoever will
//! produce the decision) and a [`ReplySlot`] (returned to the caller that
//! waits for it). The sender is consumed on use, so a slot can be filled at
//! most once. A fill of `None` means "no decision was made".

use crate::error::DebuggerError;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Create a connected sender/slot pair
pub fn reply_channel<T>() -> (ReplySender<T>, ReplySlot<T>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (
        ReplySender { tx },
        ReplySlot {
            state: Mutex::new(SlotState::Waiting(rx)),
        },
    )
}

/// Producing half of a reply slot
#[derive(Debug)]
pub struct ReplySender<T> {
    tx: SyncSender<Option<T>>,
}

impl<T> ReplySender<T> {
    /// Fill the slot. Never blocks: the channel has room for exactly the one
    /// value this sender can ever send. A slot whose waiter is gone is ignored.
    pub fn offer(self, value: Option<T>) {
        match self.tx.try_send(value) {
            Ok(()) => {}
            Err(TrySendError::Disconnected(_)) => debug!("Reply slot dropped before it was filled"),
            Err(TrySendError::Full(_)) => debug!("Reply slot already filled"),
        }
    }
}

enum SlotState<T> {
    Waiting(Receiver<Option<T>>),
    Filled(Option<T>),
}

/// Consuming half: holds at most one value, readable any number of times
pub struct ReplySlot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T: Clone> ReplySlot<T> {
    /// A slot that is already filled with `value`
    pub fn ready(value: T) -> Self {
        Self {
            state: Mutex::new(SlotState::Filled(Some(value))),
        }
    }

    /// Block until the slot is filled and return its value. A sender dropped
    /// without offering counts as a `None` fill.
    pub fn get(&self) -> Option<T> {
        let mut state = self.lock();
        if let SlotState::Waiting(rx) = &*state {
            let value = rx.recv().unwrap_or(None);
            *state = SlotState::Filled(value);
        }
        match &*state {
            SlotState::Filled(value) => value.clone(),
            SlotState::Waiting(_) => None,
        }
    }

    /// Like [`ReplySlot::get`] but gives up after `timeout`. A timed out slot
    /// can still be waited on again.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Option<T>, DebuggerError> {
        let mut state = self.lock();
        if let SlotState::Waiting(rx) = &*state {
            let value = match rx.recv_timeout(timeout) {
                Ok(value) => value,
                Err(RecvTimeoutError::Disconnected) => None,
                Err(RecvTimeoutError::Timeout) => return Err(DebuggerError::Timeout(timeout)),
            };
            *state = SlotState::Filled(value);
        }
        match &*state {
            SlotState::Filled(value) => Ok(value.clone()),
            SlotState::Waiting(_) => Ok(None),
        }
    }

    /// Whether a value (or an explicit `None`) has been observed
    pub fn is_filled(&self) -> bool {
        let mut state = self.lock();
        if let SlotState::Waiting(rx) = &*state {
            match rx.try_recv() {
                Ok(value) => *state = SlotState::Filled(value),
                Err(mpsc::TryRecvError::Disconnected) => *state = SlotState::Filled(None),
                Err(mpsc::TryRecvError::Empty) => return false,
            }
        }
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> std::fmt::Debug for ReplySlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplySlot").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_ready_slot() {
        let slot = ReplySlot::ready(7);
        assert!(slot.is_filled());
        assert_eq!(slot.get(), Some(7));
        assert_eq!(slot.get(), Some(7));
    }

    #[test]
    fn test_offer_from_other_thread() {
        let (tx, slot) = reply_channel::<String>();
        assert!(!slot.is_filled());

        let handle = thread::spawn(move || tx.offer(Some("decision".to_string())));
        assert_eq!(slot.get(), Some("decision".to_string()));
        // idempotent
        assert_eq!(slot.get(), Some("decision".to_string()));
        handle.join().unwrap();
    }

    #[test]
    fn test_none_fill() {
        let (tx, slot) = reply_channel::<u32>();
        tx.offer(None);
        assert!(slot.is_filled());
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn test_dropped_sender_reads_as_none() {
        let (tx, slot) = reply_channel::<u32>();
        drop(tx);
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn test_offer_after_slot_dropped_does_not_block() {
        let (tx, slot) = reply_channel::<u32>();
        drop(slot);
        tx.offer(Some(1));
    }

    #[test]
    fn test_timeout_then_fill() {
        let (tx, slot) = reply_channel::<u32>();
        let err = slot.get_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, DebuggerError::Timeout(_)));

        tx.offer(Some(3));
        assert_eq!(slot.get_timeout(Duration::from_millis(20)).unwrap(), Some(3));
        assert_eq!(slot.get(), Some(3));
    }
}
