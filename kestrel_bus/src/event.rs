use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload of an [`Event`]. Keys keep their insertion order.
pub type EventData = Map<String, Value>;

/// A single notification published on the bus.
///
/// Events are immutable once published; the bus hands subscribers a shared
/// reference to the same instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl Event {
    /// Construct an event with an empty payload, timestamped now
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: EventData::new(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }

    /// Append a payload entry
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Append a payload entry only if `value` is present
    pub fn with_opt<V: Into<Value>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}
