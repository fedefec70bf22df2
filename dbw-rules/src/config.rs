//! Engine configuration types
//!
//! The defaults reproduce the reference behavior: a FIFO event queue and the internal
//! state store consulted for signals the vehicle does not provide.

use serde::{Deserialize, Serialize};

/// How incoming events are held until the engine is idle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventIntake {
    /// First-in-first-out queue, consumed one event per idle tick
    #[default]
    Queue,
    /// Single slot; a new event replaces one that was not consumed yet
    Latest,
}

/// Configuration for the rule engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Event intake mode
    #[serde(default)]
    pub intake: EventIntake,

    /// Maximum number of queued events (queue mode); the oldest is dropped when full
    #[serde(default = "default_max_pending_events")]
    pub max_pending_events: usize,

    /// Evaluate conditions against the internal state store when a signal is not provided
    #[serde(default = "default_true")]
    pub state_fallback: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_pending_events() -> usize {
    32
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            intake: EventIntake::default(),
            max_pending_events: default_max_pending_events(),
            state_fallback: true,
        }
    }
}

impl EngineConfig {
    /// Create a new engine configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the event intake mode
    pub fn with_intake(mut self, intake: EventIntake) -> Self {
        self.intake = intake;
        self
    }

    /// Builder method: bound the event queue (at least one slot is always kept)
    pub fn with_max_pending_events(mut self, max: usize) -> Self {
        self.max_pending_events = max;
        self
    }

    /// Builder method: enable or disable the state store fallback
    pub fn with_state_fallback(mut self, enabled: bool) -> Self {
        self.state_fallback = enabled;
        self
    }

    /// Effective queue capacity
    pub fn queue_capacity(&self) -> usize {
        match self.intake {
            EventIntake::Queue => self.max_pending_events.max(1),
            EventIntake::Latest => 1,
        }
    }
}
