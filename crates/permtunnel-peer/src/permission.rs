use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::platform::PermissionDecision;
use crate::registry::{
    CallbackRegistry, PERMISSION_DENIED, PERMISSION_GRANTED, PERMISSION_REQUESTED,
};

/// Lifecycle of a permission for one event type.
///
/// `Unknown → Requested → Granted | Denied`. The decided states are terminal
/// for the life of the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Unknown,
    Requested,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn decision(self) -> Option<PermissionDecision> {
        match self {
            PermissionState::Granted => Some(PermissionDecision::Granted),
            PermissionState::Denied => Some(PermissionDecision::Denied),
            PermissionState::Unknown | PermissionState::Requested => None,
        }
    }
}

impl From<PermissionDecision> for PermissionState {
    fn from(decision: PermissionDecision) -> Self {
        match decision {
            PermissionDecision::Granted => PermissionState::Granted,
            PermissionDecision::Denied => PermissionState::Denied,
        }
    }
}

#[derive(Debug)]
enum Entry {
    /// A prompt is in flight; its decision is published here.
    Requested(watch::Receiver<Option<PermissionDecision>>),
    Decided(PermissionDecision),
}

impl Entry {
    /// Whether a `Requested` entry was abandoned by the party prompting.
    fn is_stale(&self) -> bool {
        match self {
            Entry::Requested(decided) => decided.has_changed().is_err(),
            Entry::Decided(_) => false,
        }
    }
}

/// What a caller of [`PermissionTracker::begin_request`] must do next.
#[derive(Debug)]
pub enum RequestTicket {
    /// The decision already exists; do not prompt.
    Decided(PermissionDecision),
    /// Another caller is prompting; wait for its decision.
    InFlight(watch::Receiver<Option<PermissionDecision>>),
    /// This caller prompts and must publish the outcome with
    /// [`PermissionTracker::finish`] or [`PermissionTracker::abandon`].
    Prompt(watch::Sender<Option<PermissionDecision>>),
}

/// Per-event-type permission states of one tunnel.
#[derive(Debug, Default)]
pub struct PermissionTracker {
    states: Mutex<HashMap<String, Entry>>,
}

impl PermissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, event_type: &str) -> PermissionState {
        match self
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
        {
            Some(Entry::Decided(decision)) => (*decision).into(),
            Some(entry) if entry.is_stale() => PermissionState::Unknown,
            Some(Entry::Requested(_)) => PermissionState::Requested,
            None => PermissionState::Unknown,
        }
    }

    /// Enter `Requested` unless a decision exists or a prompt is in flight.
    ///
    /// At most one caller per event type is handed [`RequestTicket::Prompt`]
    /// at a time; concurrent callers share its decision.
    pub fn begin_request(&self, event_type: &str) -> RequestTicket {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        match states.get(event_type) {
            Some(Entry::Decided(decision)) => return RequestTicket::Decided(*decision),
            Some(Entry::Requested(decided)) if decided.has_changed().is_ok() => {
                return RequestTicket::InFlight(decided.clone());
            }
            _ => {}
        }
        let (tx, rx) = watch::channel(None);
        states.insert(event_type.to_string(), Entry::Requested(rx));
        RequestTicket::Prompt(tx)
    }

    /// Record the outcome of a request and wake everyone waiting on it.
    pub fn finish(
        &self,
        event_type: &str,
        decision: PermissionDecision,
        ticket: watch::Sender<Option<PermissionDecision>>,
    ) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event_type.to_string(), Entry::Decided(decision));
        // Waiters may all have gone away.
        let _ = ticket.send(Some(decision));
    }

    /// Drop an in-flight request without a decision. The type becomes
    /// requestable again and waiters retry.
    pub fn abandon(&self, event_type: &str, ticket: watch::Sender<Option<PermissionDecision>>) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(states.get(event_type), Some(Entry::Requested(_))) {
            states.remove(event_type);
        }
        drop(ticket);
    }
}

/// Run a permission request through the tracker and notify observers.
///
/// Observers fire `permission:requested`, then `permission:granted` or
/// `permission:denied`, each with the event type as the only argument. A
/// decision that already exists is returned without prompting or firing, and
/// a request made while another is in flight waits for that one's decision.
pub(crate) async fn run_request<F, Fut>(
    tracker: &PermissionTracker,
    registry: &CallbackRegistry,
    event_type: &str,
    prompt: F,
) -> crate::Result<PermissionDecision>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = crate::Result<PermissionDecision>>,
{
    let ticket = loop {
        match tracker.begin_request(event_type) {
            RequestTicket::Decided(decision) => {
                tracing::debug!(event_type, ?decision, "permission already decided");
                return Ok(decision);
            }
            RequestTicket::InFlight(mut decided) => {
                tracing::debug!(event_type, "permission request in flight; waiting");
                let decision = decided.wait_for(Option::is_some).await.ok().and_then(|d| *d);
                if let Some(decision) = decision {
                    return Ok(decision);
                }
                // The prompting caller gave up; try again.
            }
            RequestTicket::Prompt(ticket) => break ticket,
        }
    };

    let args = [Value::String(event_type.to_string())];
    registry.trigger(PERMISSION_REQUESTED, &args);

    let decision = match prompt().await {
        Ok(decision) => decision,
        Err(err) => {
            tracker.abandon(event_type, ticket);
            return Err(err);
        }
    };
    tracker.finish(event_type, decision, ticket);

    match decision {
        PermissionDecision::Granted => registry.trigger(PERMISSION_GRANTED, &args),
        PermissionDecision::Denied => registry.trigger(PERMISSION_DENIED, &args),
    };
    tracing::info!(event_type, ?decision, "permission decided");
    Ok(decision)
}
