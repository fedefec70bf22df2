//! Drive-by-wire Rule Engine Library
//!
//! A tick-driven rule execution engine for a drive-by-wire ECU. A named, high-level intent
//! (e.g. "enter autonomous mode") arrives as an event; the engine picks the first rule whose
//! trigger matches and whose conditions hold, then plays back its sequence of signal writes
//! and dwell delays, one step per control-loop tick, re-checking the conditions every tick.
//!
//! # Architecture
//!
//! The engine is a plain state machine driven by the caller:
//! - No threads, no blocking, no global state
//! - Time is supplied by the caller (`tick_at`), so runs are deterministic and replayable
//! - Vehicle state is read through the [`SignalProvider`] trait
//! - Commands are written into a [`CommandSink`] (usually a [`CommandBuffer`])
//!
//! The library does NOT:
//! - Read CAN frames or apply commands to a bus
//! - Run its own control loop or clock
//! - Persist anything across restarts
//!
//! # Example Usage
//!
//! ```no_run
//! use dbw_rules::{CommandBuffer, RuleEngine, SignalMap};
//! use std::path::Path;
//!
//! let mut engine = RuleEngine::new();
//! engine.load_rules_from_file(Path::new("rules/enter_auto_mode.json")).unwrap();
//!
//! let signals = SignalMap::new()
//!     .with("gear", "P")
//!     .with("VCU_Life_Signal", 1.0);
//! let mut out = CommandBuffer::new();
//!
//! engine.on_event("dbw_toggle_on");
//! loop {
//!     out.clear();
//!     engine.tick(&signals, &mut out);
//!     for (key, value) in out.commands() {
//!         println!("set {} = {}", key, value);
//!     }
//!     if engine.is_idle() {
//!         break;
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! ```

// Public modules
pub mod condition;
pub mod config;
pub mod engine;
pub mod loader;
pub mod rule;
pub mod signals;
pub mod types;

// Re-export main types for convenience
pub use config::{EngineConfig, EventIntake};
pub use engine::{ActiveSequence, RuleEngine, TickOutcome};
pub use loader::{parse_rules_file, parse_rules_str};
pub use rule::{CompareOp, Condition, Rule, Step};
pub use signals::{CommandBuffer, CommandSink, SignalMap, SignalProvider};
pub use types::{Result, RuleError, Value, NUMBER_TOLERANCE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: a fresh engine is idle and has no rules
        let engine = RuleEngine::new();
        assert!(engine.rules().is_empty());
        assert!(engine.is_idle());
        assert_eq!(engine.active_rule_name(), None);
    }
}
