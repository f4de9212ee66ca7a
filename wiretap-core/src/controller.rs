use crate::reply::{reply_channel, ReplySender, ReplySlot};
use dashmap::DashMap;
use tracing::{debug, info};

/// In-flight debugger round trips of one reply kind
#[derive(Debug)]
pub struct PendingReplies<T> {
    /// Maps message id -> sender that will fill the caller's slot
    waiting: DashMap<String, ReplySender<T>>,
}

impl<T> Default for PendingReplies<T> {
    fn default() -> Self {
        Self {
            waiting: DashMap::new(),
        }
    }
}

impl<T: Clone> PendingReplies<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a new round trip under `message_id` and return the slot the
    /// caller will wait on. A previous entry under the same id is released
    /// with a `None` fill.
    pub fn register(&self, message_id: &str) -> ReplySlot<T> {
        let (tx, slot) = reply_channel();
        if let Some(previous) = self.waiting.insert(message_id.to_string(), tx) {
            debug!("Replacing pending reply {}", message_id);
            previous.offer(None);
        }
        slot
    }

    /// Remove and fill the entry for `message_id`. Removal and fulfilment
    /// happen together so an entry is answered at most once.
    pub fn fulfill(&self, message_id: &str, value: Option<T>) -> bool {
        if let Some((_, tx)) = self.waiting.remove(message_id) {
            debug!("Resuming round trip {}", message_id);
            tx.offer(value);
            true
        } else {
            false
        }
    }

    /// Release every waiting caller with a `None` fill and empty the table
    pub fn drain(&self) -> usize {
        let ids: Vec<String> = self.waiting.iter().map(|entry| entry.key().clone()).collect();
        let mut released = 0;
        for id in ids {
            if self.fulfill(&id, None) {
                released += 1;
            }
        }
        if released > 0 {
            info!("Released {} pending round trips", released);
        }
        released
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.waiting.contains_key(message_id)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
