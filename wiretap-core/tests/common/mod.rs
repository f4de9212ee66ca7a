#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use wiretap_core::{Debugger, DebuggerError, ServerConnection};

/// Connection double that keeps every outbound message
#[derive(Default)]
pub struct RecordingConnection {
    sent: Mutex<Vec<String>>,
    signal: Condvar,
    refuse_sends: bool,
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            refuse_sends: true,
            ..Default::default()
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Block until message number `index` was sent, parsed as JSON
    pub fn wait_for_message(&self, index: usize, timeout: Duration) -> Option<Value> {
        let deadline = Instant::now() + timeout;
        let mut sent = self.sent.lock().unwrap();
        while sent.len() <= index {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            sent = self.signal.wait_timeout(sent, remaining).unwrap().0;
        }
        serde_json::from_str(&sent[index]).ok()
    }
}

impl ServerConnection for RecordingConnection {
    fn send(&self, text: &str) -> Result<(), DebuggerError> {
        if self.refuse_sends {
            return Err(DebuggerError::TransportSend("connection reset".to_string()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        self.signal.notify_all();
        Ok(())
    }
}

pub struct Session {
    pub recorder: Arc<RecordingConnection>,
    pub connection: Arc<dyn ServerConnection>,
}

impl Session {
    pub fn control(&self, debugger: &Debugger, control_type: &str, payload: Value) {
        let text = json!({ "controlType": control_type, "payload": payload }).to_string();
        debugger.on_control_message(&text, &self.connection);
    }

    pub fn reply(&self, debugger: &Debugger, message_id: &str, mut decision: Value) {
        decision["messageId"] = Value::from(message_id);
        self.control(debugger, "debugReply", decision);
    }
}

pub fn attach(debugger: &Debugger) -> Session {
    attach_with(debugger, RecordingConnection::new())
}

pub fn attach_with(debugger: &Debugger, recorder: Arc<RecordingConnection>) -> Session {
    let connection: Arc<dyn ServerConnection> = recorder.clone();
    debugger.on_attached(&connection);
    Session { recorder, connection }
}

pub const WAIT: Duration = Duration::from_secs(5);
