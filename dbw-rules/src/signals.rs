//! Signal input and command output capabilities
//!
//! The engine reads vehicle state through [`SignalProvider`] and writes commands into a
//! [`CommandSink`]. Both are borrowed for the duration of a single tick only.

use crate::types::Value;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Read-only, typed lookup of current external signal values
///
/// Every accessor returns `None` when the signal is absent or is not of the requested kind.
/// Implementations must never panic on unknown names.
pub trait SignalProvider {
    fn get_number(&self, name: &str) -> Option<f64>;
    fn get_bool(&self, name: &str) -> Option<bool>;
    fn get_string(&self, name: &str) -> Option<&str>;

    /// Check if the signal is available under any accessor
    fn has_signal(&self, name: &str) -> bool {
        self.get_number(name).is_some()
            || self.get_bool(name).is_some()
            || self.get_string(name).is_some()
    }
}

/// Destination for `set` commands produced during a tick
pub trait CommandSink {
    /// Record a command, replacing any earlier command with the same key
    fn set(&mut self, key: &str, value: Value);
}

/// Accumulator of `set` commands, keyed by signal name
///
/// Entries keep their first insertion order so that the emitted command list is
/// deterministic. The engine never clears the buffer; the caller does, typically once the
/// commands have been applied to the bus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandBuffer {
    commands: IndexMap<String, Value>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the accumulated commands
    pub fn commands(&self) -> &IndexMap<String, Value> {
        &self.commands
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.commands.get(key)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl CommandSink for CommandBuffer {
    fn set(&mut self, key: &str, value: Value) {
        // insert keeps the position of an existing key
        self.commands.insert(key.to_string(), value);
    }
}

/// In-memory signal table
///
/// A simple [`SignalProvider`] holding one typed value per signal name, used by the CLI
/// driver and in tests in place of a live bus reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalMap {
    values: HashMap<String, Value>,
}

impl SignalMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) a signal value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder method: set a signal value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SignalProvider for SignalMap {
    fn get_number(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_number)
    }

    fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    fn get_string(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    fn has_signal(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for SignalMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = SignalMap::new();
        for (name, value) in iter {
            map.set(name, value);
        }
        map
    }
}
