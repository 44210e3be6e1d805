//! Platform capabilities the tunnel consumes but does not implement:
//! permission prompts and native sensor event sources.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::events::{EventSerializer, EventSerializers};

/// Outcome of a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionDecision {
    Granted,
    Denied,
}

impl PermissionDecision {
    pub fn is_granted(self) -> bool {
        self == PermissionDecision::Granted
    }
}

/// A permission gate for one or more sensor event types.
#[async_trait]
pub trait PermissionGranter: Send + Sync {
    /// Whether the platform actually gates the event type behind a prompt.
    fn requires_prompt(&self) -> bool {
        true
    }

    /// Ask the user (or platform) for permission.
    async fn request(&self, event_type: &str) -> PermissionDecision;
}

/// Granter used when the platform exposes no explicit permission gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPermissionGranter;

#[async_trait]
impl PermissionGranter for NullPermissionGranter {
    fn requires_prompt(&self) -> bool {
        false
    }

    async fn request(&self, _event_type: &str) -> PermissionDecision {
        PermissionDecision::Granted
    }
}

/// Prompt-gated granter that always answers with the same decision.
///
/// Stands in for a user who always clicks the same button.
#[derive(Debug)]
pub struct FixedGranter {
    decision: PermissionDecision,
    requests: AtomicUsize,
}

impl FixedGranter {
    pub fn new(decision: PermissionDecision) -> Self {
        Self {
            decision,
            requests: AtomicUsize::new(0),
        }
    }

    /// How many times the prompt was shown.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionGranter for FixedGranter {
    async fn request(&self, event_type: &str) -> PermissionDecision {
        self.requests.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(event_type, decision = ?self.decision, "permission prompt answered");
        self.decision
    }
}

/// Source of native sensor events, keyed by event type.
pub trait SensorSource: Send + Sync {
    /// Start receiving events of `event_type`. Events fired before this call
    /// are not observed.
    fn subscribe(&self, event_type: &str) -> broadcast::Receiver<Value>;
}

/// Sensor source driven by explicit [`SimulatedSensors::emit`] calls.
#[derive(Default)]
pub struct SimulatedSensors {
    channels: Mutex<HashMap<String, broadcast::Sender<Value>>>,
}

const SENSOR_CAPACITY: usize = 64;

impl SimulatedSensors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire one native event. Returns how many subscribers observed it.
    pub fn emit(&self, event_type: &str, event: Value) -> usize {
        self.sender(event_type).send(event).unwrap_or(0)
    }

    fn sender(&self, event_type: &str) -> broadcast::Sender<Value> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.to_string())
            .or_insert_with(|| broadcast::channel(SENSOR_CAPACITY).0)
            .clone()
    }
}

impl SensorSource for SimulatedSensors {
    fn subscribe(&self, event_type: &str) -> broadcast::Receiver<Value> {
        self.sender(event_type).subscribe()
    }
}

/// Wait for the next native event, skipping over any the receiver missed.
pub(crate) async fn next_event(events: &mut broadcast::Receiver<Value>) -> Option<Value> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "sensor events dropped");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// The embedder's platform capabilities.
pub struct Platform {
    granters: HashMap<String, Arc<dyn PermissionGranter>>,
    sensors: Arc<dyn SensorSource>,
    serializers: EventSerializers,
}

impl Platform {
    /// Platform with no permission gates and the default serializers.
    pub fn new(sensors: Arc<dyn SensorSource>) -> Self {
        Self {
            granters: HashMap::new(),
            sensors,
            serializers: EventSerializers::default(),
        }
    }

    /// Gate `event_type` behind `granter`.
    pub fn with_granter(mut self, event_type: &str, granter: Arc<dyn PermissionGranter>) -> Self {
        self.granters.insert(event_type.to_string(), granter);
        self
    }

    /// Override how events of `event_type` are reduced before forwarding.
    pub fn with_serializer(mut self, event_type: &str, serializer: EventSerializer) -> Self {
        self.serializers.register(event_type, serializer);
        self
    }

    /// Granter for `event_type`, falling back to [`NullPermissionGranter`].
    pub fn granter_for(&self, event_type: &str) -> Arc<dyn PermissionGranter> {
        self.granters
            .get(event_type)
            .cloned()
            .unwrap_or_else(|| Arc::new(NullPermissionGranter))
    }

    pub fn sensors(&self) -> &Arc<dyn SensorSource> {
        &self.sensors
    }

    pub fn serializers(&self) -> &EventSerializers {
        &self.serializers
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut gated: Vec<&str> = self.granters.keys().map(String::as_str).collect();
        gated.sort_unstable();
        f.debug_struct("Platform")
            .field("gated_event_types", &gated)
            .field("serializers", &self.serializers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn ungated_event_types_fall_back_to_null_granter() {
        let platform = Platform::new(Arc::new(SimulatedSensors::new()));
        let granter = platform.granter_for("deviceorientation");

        assert!(!granter.requires_prompt());
        assert_eq!(
            granter.request("deviceorientation").await,
            PermissionDecision::Granted
        );
    }

    #[tokio::test]
    async fn gated_event_type_uses_registered_granter() {
        let denier = Arc::new(FixedGranter::new(PermissionDecision::Denied));
        let platform = Platform::new(Arc::new(SimulatedSensors::new()))
            .with_granter("devicemotion", denier.clone());

        let granter = platform.granter_for("devicemotion");
        assert!(granter.requires_prompt());
        assert_eq!(granter.request("devicemotion").await, PermissionDecision::Denied);
        assert_eq!(denier.requests(), 1);
        assert!(!platform.granter_for("deviceorientation").requires_prompt());
    }

    #[tokio::test]
    async fn simulated_sensors_reach_subscribers_only() {
        let sensors = SimulatedSensors::new();
        assert_eq!(sensors.emit("deviceorientation", json!({"alpha": 0})), 0);

        let mut events = sensors.subscribe("deviceorientation");
        assert_eq!(sensors.emit("deviceorientation", json!({"alpha": 1})), 1);
        assert_eq!(sensors.emit("devicemotion", json!({"interval": 16})), 0);

        assert_eq!(next_event(&mut events).await, Some(json!({"alpha": 1})));
    }

    #[test]
    fn decision_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(PermissionDecision::Granted).unwrap(),
            json!("granted")
        );
        assert_eq!(
            serde_json::from_value::<PermissionDecision>(json!("denied")).unwrap(),
            PermissionDecision::Denied
        );
    }
}
