//! The attempt-state store contract.
//!
//! The engine never owns attempt state; it reads and writes it through
//! [`AttemptState`]. [`InMemoryAttemptState`] is the default store and can be
//! serialized between requests by whatever layer owns sessions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

pub trait AttemptState {
    /// Current value of a variable; `None` when never set.
    fn value(&self, identifier: &str) -> Option<&Value>;
    fn set_value(&mut self, identifier: &str, value: Value);

    fn overridden_default(&self, identifier: &str) -> Option<&Value>;
    fn set_overridden_default(&mut self, identifier: &str, value: Option<Value>);

    fn overridden_correct(&self, identifier: &str) -> Option<&Value>;
    fn set_overridden_correct(&mut self, identifier: &str, value: Option<Value>);

    /// Recorded choice order of a shuffled interaction, keyed by its
    /// response identifier.
    fn shuffle_order(&self, interaction: &str) -> Option<&[String]>;
    fn set_shuffle_order(&mut self, interaction: &str, order: Vec<String>);

    fn is_initialized(&self) -> bool;
    fn set_initialized(&mut self, initialized: bool);

    fn attempt_count(&self) -> u32;
    fn set_attempt_count(&mut self, count: u32);

    /// Accumulated time on the attempt, in seconds.
    fn duration(&self) -> f64;
    fn set_duration(&mut self, seconds: f64);

    /// Forget every per-attempt override.
    fn clear_overrides(&mut self);
}

/// Attempt state held in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemoryAttemptState {
    pub id: Uuid,
    pub values: BTreeMap<String, Value>,
    #[serde(default)]
    pub overridden_defaults: BTreeMap<String, Value>,
    #[serde(default)]
    pub overridden_correct: BTreeMap<String, Value>,
    #[serde(default)]
    pub shuffle_orders: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub initialized: bool,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default)]
    pub duration: f64,
}

impl InMemoryAttemptState {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            ..Default::default()
        }
    }
}

fn store(map: &mut BTreeMap<String, Value>, identifier: &str, value: Option<Value>) {
    match value {
        Some(value) => {
            map.insert(identifier.to_string(), value);
        }
        None => {
            map.remove(identifier);
        }
    }
}

impl AttemptState for InMemoryAttemptState {
    fn value(&self, identifier: &str) -> Option<&Value> {
        self.values.get(identifier)
    }

    fn set_value(&mut self, identifier: &str, value: Value) {
        self.values.insert(identifier.to_string(), value);
    }

    fn overridden_default(&self, identifier: &str) -> Option<&Value> {
        self.overridden_defaults.get(identifier)
    }

    fn set_overridden_default(&mut self, identifier: &str, value: Option<Value>) {
        store(&mut self.overridden_defaults, identifier, value);
    }

    fn overridden_correct(&self, identifier: &str) -> Option<&Value> {
        self.overridden_correct.get(identifier)
    }

    fn set_overridden_correct(&mut self, identifier: &str, value: Option<Value>) {
        store(&mut self.overridden_correct, identifier, value);
    }

    fn shuffle_order(&self, interaction: &str) -> Option<&[String]> {
        self.shuffle_orders.get(interaction).map(Vec::as_slice)
    }

    fn set_shuffle_order(&mut self, interaction: &str, order: Vec<String>) {
        self.shuffle_orders.insert(interaction.to_string(), order);
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn set_attempt_count(&mut self, count: u32) {
        self.attempt_count = count;
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn set_duration(&mut self, seconds: f64) {
        self.duration = seconds;
    }

    fn clear_overrides(&mut self) {
        self.overridden_defaults.clear();
        self.overridden_correct.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_can_be_cleared() {
        let mut state = InMemoryAttemptState::new();
        state.set_overridden_default("SCORE", Some(Value::integer(5)));
        state.set_overridden_correct("RESPONSE", Some(Value::identifier("A")));
        assert_eq!(state.overridden_default("SCORE"), Some(&Value::integer(5)));
        state.set_overridden_default("SCORE", None);
        assert!(state.overridden_default("SCORE").is_none());
        state.clear_overrides();
        assert!(state.overridden_correct("RESPONSE").is_none());
    }

    #[test]
    fn serializes_to_json() {
        let mut state = InMemoryAttemptState::new();
        state.set_value("SCORE", Value::float(1.0));
        state.set_shuffle_order("RESPONSE", vec!["B".into(), "A".into()]);
        let json = serde_json::to_string(&state).unwrap();
        let back: InMemoryAttemptState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
