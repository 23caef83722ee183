//! Reaction callback registry
//!
//! Correlates `(conversation, message ts)` with a callback that fires when a
//! reaction to that message arrives. Registrations survive reconnects and
//! are only removed explicitly.

use crate::model::Event;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Callback invoked with the normalized reaction event
pub type ReactionCallback = Arc<dyn Fn(&Event) + Send + Sync>;

type ReactionKey = (String, String);

#[derive(Default)]
pub struct ReactionRegistry {
    callbacks: Mutex<HashMap<ReactionKey, ReactionCallback>>,
}

impl ReactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback, replacing any existing one for the same message
    pub fn register<F>(&self, channel: impl Into<String>, ts: impl Into<String>, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.callbacks
            .lock()
            .insert((channel.into(), ts.into()), Arc::new(callback));
    }

    /// Remove a registration; no-op if there is none
    pub fn unregister(&self, channel: &str, ts: &str) {
        self.callbacks
            .lock()
            .remove(&(channel.to_string(), ts.to_string()));
    }

    pub fn fetch(&self, channel: &str, ts: &str) -> Option<ReactionCallback> {
        self.callbacks
            .lock()
            .get(&(channel.to_string(), ts.to_string()))
            .cloned()
    }

    /// Run the callback registered for a reaction event, if any
    ///
    /// Non-reaction events and unmatched keys do nothing. The registration is
    /// left in place. Returns whether a callback ran.
    pub fn trigger(&self, event: &Event) -> bool {
        if !event.is_reaction() {
            return false;
        }
        let (Some(channel), Some(ts)) = (event.channel.as_deref(), event.ts.as_deref()) else {
            return false;
        };

        // Clone out of the lock so the callback may (un)register freely
        let callback = self.fetch(channel, ts);
        match callback {
            Some(callback) => {
                callback(event);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }
}
