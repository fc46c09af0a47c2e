use std::collections::HashMap;
use std::sync::Mutex;

use crate::reply::Reply;

/// Callback invoked with the raw elements of a pub/sub push:
/// `["message", channel, payload]` or `["pmessage", pattern, channel, payload]`.
pub type PushHandler = Box<dyn Fn(&[Reply]) + Send + Sync>;

/// Maps channel names and glob patterns to push handlers. Entries are added
/// when a subscribe is issued, before its confirmation arrives, so the
/// first server push can never race past registration.
#[derive(Default)]
pub struct Subscriptions {
    channels: Mutex<HashMap<String, Vec<PushHandler>>>,
    patterns: Mutex<HashMap<String, Vec<PushHandler>>>,
}

impl Subscriptions {
    pub fn new() -> Subscriptions {
        Subscriptions::default()
    }

    pub fn register_channel(&self, channel: &str, handler: PushHandler) {
        self.channels
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push(handler);
    }

    pub fn register_pattern(&self, pattern: &str, handler: PushHandler) {
        self.patterns
            .lock()
            .unwrap()
            .entry(pattern.to_string())
            .or_default()
            .push(handler);
    }

    /// Remove one channel's handlers, or every channel when `None`.
    pub fn unregister_channel(&self, channel: Option<&str>) {
        let mut channels = self.channels.lock().unwrap();
        match channel {
            Some(channel) => {
                channels.remove(channel);
            }
            None => channels.clear(),
        }
    }

    /// Remove one pattern's handlers, or every pattern when `None`.
    pub fn unregister_pattern(&self, pattern: Option<&str>) {
        let mut patterns = self.patterns.lock().unwrap();
        match pattern {
            Some(pattern) => {
                patterns.remove(pattern);
            }
            None => patterns.clear(),
        }
    }

    /// Number of subscribed channels. Feeds the expected-reply count for a
    /// bare UNSUBSCRIBE.
    pub fn channel_size(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    /// Number of subscribed patterns. Feeds the expected-reply count for a
    /// bare PUNSUBSCRIBE.
    pub fn pattern_size(&self) -> usize {
        self.patterns.lock().unwrap().len()
    }

    /// Forward a `message` push to every handler registered for `channel`.
    /// Returns false when nobody is listening.
    pub fn dispatch_channel(&self, channel: &str, parts: &[Reply]) -> bool {
        let channels = self.channels.lock().unwrap();
        match channels.get(channel) {
            Some(handlers) => {
                for handler in handlers {
                    handler(parts);
                }
                true
            }
            None => false,
        }
    }

    /// Forward a `pmessage` push to every handler registered for `pattern`.
    pub fn dispatch_pattern(&self, pattern: &str, parts: &[Reply]) -> bool {
        let patterns = self.patterns.lock().unwrap();
        match patterns.get(pattern) {
            Some(handlers) => {
                for handler in handlers {
                    handler(parts);
                }
                true
            }
            None => false,
        }
    }
}
