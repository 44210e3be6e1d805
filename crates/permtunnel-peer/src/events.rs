//! Per-event-type reduction of native events to their forwarded fields.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

/// Orientation sensor event type.
pub const DEVICE_ORIENTATION: &str = "deviceorientation";
/// Motion sensor event type.
pub const DEVICE_MOTION: &str = "devicemotion";

const ORIENTATION_FIELDS: &[&str] = &["alpha", "beta", "gamma"];
const MOTION_FIELDS: &[&str] = &[
    "acceleration",
    "accelerationIncludingGravity",
    "rotationRate",
    "interval",
];

/// Reduces a native event to what crosses the boundary.
pub type EventSerializer = fn(&Value) -> Value;

/// Serializer table. Event types without an entry pass through unchanged.
#[derive(Clone)]
pub struct EventSerializers {
    by_type: HashMap<String, EventSerializer>,
}

impl EventSerializers {
    /// Empty table: every event passes through unchanged.
    pub fn identity() -> Self {
        Self {
            by_type: HashMap::new(),
        }
    }

    pub fn register(&mut self, event_type: &str, serializer: EventSerializer) {
        self.by_type.insert(event_type.to_string(), serializer);
    }

    pub fn serialize(&self, event_type: &str, event: &Value) -> Value {
        match self.by_type.get(event_type) {
            Some(serializer) => serializer(event),
            None => event.clone(),
        }
    }
}

impl Default for EventSerializers {
    fn default() -> Self {
        let mut serializers = Self::identity();
        serializers.register(DEVICE_ORIENTATION, serialize_orientation);
        serializers.register(DEVICE_MOTION, serialize_motion);
        serializers
    }
}

impl fmt::Debug for EventSerializers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.by_type.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_set().entries(types).finish()
    }
}

/// `{alpha, beta, gamma}` of an orientation event.
pub fn serialize_orientation(event: &Value) -> Value {
    pick_fields(event, ORIENTATION_FIELDS)
}

/// Acceleration, rotation rate and interval of a motion event.
pub fn serialize_motion(event: &Value) -> Value {
    pick_fields(event, MOTION_FIELDS)
}

/// Copy the whitelisted `fields` present in `event` into a new object.
pub fn pick_fields(event: &Value, fields: &[&str]) -> Value {
    let mut picked = Map::new();
    if let Value::Object(source) = event {
        for &field in fields {
            if let Some(value) = source.get(field) {
                picked.insert(field.to_string(), value.clone());
            }
        }
    }
    Value::Object(picked)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn orientation_keeps_only_angles() {
        let serializers = EventSerializers::default();
        let event = json!({
            "alpha": 10.5,
            "beta": -3,
            "gamma": 45,
            "absolute": true,
            "timeStamp": 1234
        });

        assert_eq!(
            serializers.serialize(DEVICE_ORIENTATION, &event),
            json!({"alpha": 10.5, "beta": -3, "gamma": 45})
        );
    }

    #[test]
    fn missing_fields_are_omitted() {
        let event = json!({"acceleration": {"x": 1}, "interval": 16});
        assert_eq!(
            serialize_motion(&event),
            json!({"acceleration": {"x": 1}, "interval": 16})
        );
    }

    #[test]
    fn unknown_event_types_pass_through() {
        let serializers = EventSerializers::default();
        let event = json!({"level": 0.4, "charging": false});
        assert_eq!(serializers.serialize("battery", &event), event);
    }

    #[test]
    fn registered_serializer_overrides_default() {
        fn alpha_only(event: &Value) -> Value {
            pick_fields(event, &["alpha"])
        }

        let mut serializers = EventSerializers::default();
        serializers.register(DEVICE_ORIENTATION, alpha_only);
        assert_eq!(
            serializers.serialize(DEVICE_ORIENTATION, &json!({"alpha": 1, "beta": 2})),
            json!({"alpha": 1})
        );
    }
}
