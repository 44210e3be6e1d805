use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

/// Observer event: a permission request started.
pub const PERMISSION_REQUESTED: &str = "permission:requested";
/// Observer event: a permission request was granted.
pub const PERMISSION_GRANTED: &str = "permission:granted";
/// Observer event: a permission request was denied.
pub const PERMISSION_DENIED: &str = "permission:denied";
/// Observer event: the application showed its permission prompt.
pub const PERMISSION_PROMPT_SHOWN: &str = "permission:prompt-shown";
/// Observer event: the application hid its permission prompt.
pub const PERMISSION_PROMPT_HIDDEN: &str = "permission:prompt-hidden";

/// Observer function. Receives the event's argument list as delivered.
pub type Callback = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Named, append-only lists of observers.
///
/// Keys are protocol events (`permission:granted`, ...) or sensor event
/// types (`deviceorientation`, ...). Observers run in registration order.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: Mutex<HashMap<String, Vec<Callback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to the observers of `name`.
    pub fn register(&self, name: &str, callback: Callback) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .push(callback);
    }

    /// Remove `callback` from the observers of `name`. Returns whether it was
    /// registered.
    pub fn unregister(&self, name: &str, callback: &Callback) -> bool {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(observers) = callbacks.get_mut(name) else {
            return false;
        };
        let Some(index) = observers.iter().position(|o| Arc::ptr_eq(o, callback)) else {
            return false;
        };
        observers.remove(index);
        true
    }

    /// Invoke every observer of `name` with `args`. Returns how many ran.
    pub fn trigger(&self, name: &str, args: &[Value]) -> usize {
        // Snapshot so observers may register more observers without deadlocking.
        let observers: Vec<Callback> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default();

        for observer in &observers {
            observer(args);
        }
        tracing::trace!(event = name, observers = observers.len(), "callbacks triggered");
        observers.len()
    }

    /// Number of observers registered for `name`.
    pub fn count(&self, name: &str) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(0, Vec::len)
    }
}
