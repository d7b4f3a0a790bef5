//! Execution state and the merge policy.
//!
//! State is an opaque key/value map threaded through segments. It is
//! mutated in exactly two places: adopting a segment's output and merging
//! an external resume payload — both go through [`ExecutionState::merge`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved key holding the bounded sliding-window message list used for
/// multi-turn conversational correction.
pub const MESSAGES_KEY: &str = "__segflow_messages";
/// Reserved side-channel key preserving a scalar displaced by an incoming map.
pub const PREVIOUS_VALUE_KEY: &str = "__segflow_previous_value";
/// Reserved side-channel key preserving an incoming scalar that cannot be
/// merged into map-shaped state.
pub const INCOMING_VALUE_KEY: &str = "__segflow_incoming_value";
/// Payload key treated as conversational feedback.
pub const FEEDBACK_KEY: &str = "feedback";

/// Opaque key/value state threaded through segment execution.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct ExecutionState {
    inner: Map<String, Value>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// get a value by key
    pub fn get(
        &self,
        key: &str,
    ) -> Option<Value> {
        self.inner.get(key).cloned()
    }

    /// set a value by key
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) {
        self.inner.insert(key.into(), value.into());
    }

    /// builder-style set
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.set(key, value);
        self
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.inner.clone())
    }

    /// Size of the state once serialized, in bytes.
    pub fn serialized_size(&self) -> usize {
        serde_json::to_vec(&self.inner).map(|b| b.len()).unwrap_or(0)
    }

    /// The recorded conversation messages, oldest first.
    pub fn messages(&self) -> Vec<String> {
        match self.inner.get(MESSAGES_KEY) {
            Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect(),
            _ => Vec::new(),
        }
    }

    /// Merge an incoming payload under the state merge policy:
    ///
    /// | previous | incoming | result |
    /// |---|---|---|
    /// | map | map | deep-merge, incoming wins |
    /// | map | scalar | map preserved, scalar under a reserved key |
    /// | scalar | map | map wins, scalar preserved under a reserved key |
    /// | scalar | scalar | both preserved under reserved keys |
    /// | any | text / `{feedback: text}` | appended to the message window |
    ///
    /// State itself is always map-shaped; scalar "previous" values live
    /// under [`PREVIOUS_VALUE_KEY`] (see [`ExecutionState::from`]).
    pub fn merge(
        &mut self,
        incoming: Value,
        window: usize,
    ) {
        match incoming {
            Value::String(text) => self.push_message(text, window),
            Value::Object(map) if Self::is_feedback(&map) => {
                if let Some(Value::String(text)) = map.get(FEEDBACK_KEY).cloned() {
                    self.push_message(text, window);
                }
            }
            Value::Object(map) => {
                for (key, value) in map {
                    match self.inner.get_mut(&key) {
                        Some(previous) => deep_merge(previous, value),
                        None => {
                            self.inner.insert(key, value);
                        }
                    }
                }
            }
            Value::Null => {}
            scalar => {
                // a bare scalar cannot be merged into map-shaped state
                self.inner.insert(INCOMING_VALUE_KEY.to_string(), scalar);
            }
        }
    }

    fn is_feedback(map: &Map<String, Value>) -> bool {
        map.len() == 1 && matches!(map.get(FEEDBACK_KEY), Some(Value::String(_)))
    }

    /// Append a message to the bounded sliding window.
    fn push_message(
        &mut self,
        text: String,
        window: usize,
    ) {
        let entry = self.inner.entry(MESSAGES_KEY.to_string()).or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = entry {
            items.push(Value::String(text));
            let excess = items.len().saturating_sub(window.max(1));
            if excess > 0 {
                items.drain(..excess);
            }
        }
    }
}

impl From<Value> for ExecutionState {
    /// Map values become the state; a scalar becomes state holding the
    /// scalar under [`PREVIOUS_VALUE_KEY`], so a later map merge preserves
    /// it on the side channel.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(inner) => Self {
                inner,
            },
            Value::Null => Self::new(),
            scalar => {
                let mut inner = Map::new();
                inner.insert(PREVIOUS_VALUE_KEY.to_string(), scalar);
                Self {
                    inner,
                }
            }
        }
    }
}

/// Recursive merge: maps merge key-wise, everything else is replaced by the
/// incoming value.
fn deep_merge(
    previous: &mut Value,
    incoming: Value,
) {
    match (previous, incoming) {
        (Value::Object(prev), Value::Object(inc)) => {
            for (key, value) in inc {
                match prev.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        prev.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::{ExecutionState, INCOMING_VALUE_KEY, PREVIOUS_VALUE_KEY};

    #[test]
    fn test_map_map_deep_merge_incoming_wins() {
        let mut state = ExecutionState::from(json!({ "a": 1, "nested": { "x": 1, "y": 2 } }));
        state.merge(json!({ "nested": { "y": 20, "z": 30 }, "b": 2 }), 20);

        assert_eq!(state.get("a"), Some(json!(1)));
        assert_eq!(state.get("b"), Some(json!(2)));
        assert_eq!(state.get("nested"), Some(json!({ "x": 1, "y": 20, "z": 30 })));
    }

    #[test]
    fn test_map_scalar_keeps_both() {
        let mut state = ExecutionState::from(json!({ "a": 1 }));
        state.merge(json!(42), 20);

        assert_eq!(state.get("a"), Some(json!(1)));
        assert_eq!(state.get(INCOMING_VALUE_KEY), Some(json!(42)));
    }

    #[test]
    fn test_scalar_map_keeps_both() {
        let mut state = ExecutionState::from(json!(7));
        state.merge(json!({ "a": 1 }), 20);

        assert_eq!(state.get("a"), Some(json!(1)));
        assert_eq!(state.get(PREVIOUS_VALUE_KEY), Some(json!(7)));
    }

    #[test]
    fn test_scalar_scalar_keeps_both() {
        let mut state = ExecutionState::from(json!(7));
        state.merge(json!(8), 20);

        assert_eq!(state.get(PREVIOUS_VALUE_KEY), Some(json!(7)));
        assert_eq!(state.get(INCOMING_VALUE_KEY), Some(json!(8)));
    }

    #[test]
    fn test_text_appends_to_message_window() {
        let mut state = ExecutionState::from(json!({ "a": 1 }));
        state.merge(json!("Approved"), 20);
        state.merge(json!({ "feedback": "Add more detail" }), 20);

        assert_eq!(state.messages(), vec!["Approved", "Add more detail"]);
        assert_eq!(state.get("a"), Some(json!(1)));
        assert_eq!(state.get("feedback"), None);
    }

    #[test]
    fn test_message_window_is_bounded() {
        let mut state = ExecutionState::new();
        for i in 0..10 {
            state.merge(json!(format!("message {}", i)), 3);
        }
        assert_eq!(state.messages(), vec!["message 7", "message 8", "message 9"]);
    }
}
