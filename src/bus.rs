use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Where pub/sub notifications leave the client. Channel messages are
/// published to `"{address}.{channel}"`, pattern messages to
/// `"{address}.{pattern}"`, with `address` taken from [`Config::address`](crate::Config).
pub trait NotificationSink: Send + Sync {
    fn publish(&self, address: &str, payload: Value);
}

/// In-process notification sink: an address-keyed registry of unbounded
/// channels. Receivers obtained from [`EventBus::subscribe`] observe every
/// payload published to their address, in publish order.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
}

impl EventBus {
    pub fn new() -> EventBus {
        EventBus::default()
    }

    pub fn subscribe(&self, address: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push(tx);
        rx
    }
}

impl NotificationSink for EventBus {
    fn publish(&self, address: &str, payload: Value) {
        let mut subscribers = self.subscribers.lock().unwrap();
        match subscribers.get_mut(address) {
            Some(listeners) => {
                // Deliver to everyone still listening, dropping the rest.
                listeners.retain(|listener| listener.send(payload.clone()).is_ok());
            }
            None => debug!(%address, "notification without listeners"),
        }
    }
}
