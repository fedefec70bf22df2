//! Rule engine state machine
//!
//! The [`RuleEngine`] owns the rule table, the pending event intake, the internal state store
//! and at most one active sequence. [`RuleEngine::tick_at`] is the only entry point that
//! advances it; everything else just records input.

use crate::condition;
use crate::config::{EngineConfig, EventIntake};
use crate::rule::{Rule, Step};
use crate::signals::{CommandSink, SignalProvider};
use crate::types::{Result, Value};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::{Duration, Instant};

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TickOutcome {
    /// No sequence active (no event pending, or the event matched no rule)
    Idle,
    /// Active sequence is dwelling in a wait step
    Waiting,
    /// One step was executed and the cursor moved on
    Advanced,
    /// The last step was executed; the engine is idle again
    Completed,
    /// A condition failed; the sequence was abandoned without emitting anything
    Cancelled,
}

/// Cursor over the execution of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSequence {
    rule_index: usize,
    step_index: usize,
    step_started_at: Instant,
    started_at: Instant,
}

impl ActiveSequence {
    /// Index of the running rule in the engine's rule table
    pub fn rule_index(&self) -> usize {
        self.rule_index
    }

    /// Index of the step to execute next
    pub fn step_index(&self) -> usize {
        self.step_index
    }

    /// Instant the current step was entered
    pub fn step_started_at(&self) -> Instant {
        self.step_started_at
    }

    /// Instant the rule was activated
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time spent in the current step as of `now`
    pub fn step_elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.step_started_at)
    }
}

/// The rule engine - entry point for event intake and tick execution
///
/// # Example
/// ```
/// use dbw_rules::{CommandBuffer, CompareOp, Condition, Rule, RuleEngine, SignalMap, Step, Value};
///
/// let mut engine = RuleEngine::new();
/// engine.set_rules(vec![Rule::new("enter_auto_mode", "dbw_toggle_on")
///     .when(Condition::new("gear", CompareOp::Eq, "P"))
///     .then(Step::set("AS_AutoD_Req", 1.0))]);
///
/// let signals = SignalMap::new().with("gear", "P");
/// let mut out = CommandBuffer::new();
///
/// engine.on_event("dbw_toggle_on");
/// engine.tick(&signals, &mut out);
/// assert_eq!(out.get("AS_AutoD_Req"), Some(&Value::Number(1.0)));
/// ```
#[derive(Debug, Default)]
pub struct RuleEngine {
    config: EngineConfig,
    rules: Vec<Rule>,
    active: Option<ActiveSequence>,
    pending: VecDeque<String>,
    /// Written by `SetState` steps only
    state: HashMap<String, Value>,
}

impl RuleEngine {
    /// Create an engine with the default configuration and no rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with a custom configuration
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Replace the rule set
    ///
    /// Any active sequence is cancelled and all pending events are discarded before the new
    /// rules are installed. The internal state store is kept. No commands are emitted.
    pub fn set_rules(&mut self, rules: Vec<Rule>) {
        if let Some(name) = self.active_rule_name() {
            log::info!("Cancelling rule '{}': rule set replaced", name);
        }
        if !self.pending.is_empty() {
            log::debug!("Discarding {} pending event(s)", self.pending.len());
        }

        self.active = None;
        self.pending.clear();
        self.rules = rules;

        log::info!("Installed {} rule(s)", self.rules.len());
    }

    /// Parse a JSON rule document and install it
    ///
    /// On failure the current rules, active sequence and pending events are left untouched.
    ///
    /// # Returns
    /// * `Result<usize>` - number of rules installed
    pub fn load_rules_from_str(&mut self, json: &str) -> Result<usize> {
        let rules = crate::loader::parse_rules_str(json)?;
        let count = rules.len();
        self.set_rules(rules);
        Ok(count)
    }

    /// Read a JSON rule document from disk and install it (all-or-nothing)
    pub fn load_rules_from_file(&mut self, path: &Path) -> Result<usize> {
        let rules = crate::loader::parse_rules_file(path)?;
        let count = rules.len();
        self.set_rules(rules);
        Ok(count)
    }

    /// Record an event for processing on a later idle tick
    pub fn on_event(&mut self, name: impl Into<String>) {
        let name = name.into();
        log::debug!("Event received: {}", name);
        push_pending(&mut self.pending, &self.config, name);
    }

    /// Name of the currently active rule
    pub fn active_rule_name(&self) -> Option<&str> {
        self.active
            .as_ref()
            .map(|active| self.rules[active.rule_index].name.as_str())
    }

    /// Current step offset, or 0 when idle
    pub fn active_step_index(&self) -> usize {
        self.active.map_or(0, |active| active.step_index)
    }

    pub fn active_sequence(&self) -> Option<&ActiveSequence> {
        self.active.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Number of events waiting for the engine to become idle
    pub fn pending_event_count(&self) -> usize {
        self.pending.len()
    }

    /// Look up an entry of the internal state store
    pub fn state_value(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Run one tick using the current monotonic time
    pub fn tick<S, C>(&mut self, signals: &S, out: &mut C) -> TickOutcome
    where
        S: SignalProvider + ?Sized,
        C: CommandSink + ?Sized,
    {
        self.tick_at(signals, out, Instant::now())
    }

    /// Run one tick at an explicit instant
    ///
    /// 1. If idle, dequeue one event and activate the first rule whose trigger matches and
    ///    whose conditions all hold.
    /// 2. Re-check the active rule's conditions; cancel on the first failure.
    /// 3. Execute exactly one step.
    pub fn tick_at<S, C>(&mut self, signals: &S, out: &mut C, now: Instant) -> TickOutcome
    where
        S: SignalProvider + ?Sized,
        C: CommandSink + ?Sized,
    {
        if self.active.is_none() {
            if let Some(event) = self.pending.pop_front() {
                self.activate(&event, signals, now);
            }
        }

        let Some(active) = self.active else {
            return TickOutcome::Idle;
        };

        let fallback = self.fallback();
        let rule = &self.rules[active.rule_index];
        if let Some(failed) = condition::first_failing(&rule.conditions, signals, fallback) {
            log::info!(
                "Cancelling rule '{}' at step {}: condition `{}` no longer holds",
                rule.name,
                active.step_index,
                failed
            );
            self.active = None;
            return TickOutcome::Cancelled;
        }

        let Some(step) = rule.sequence.get(active.step_index) else {
            // Only reachable for a rule with an empty sequence
            log::info!("Rule '{}' completed (empty sequence)", rule.name);
            self.active = None;
            return TickOutcome::Completed;
        };

        let done = match step {
            Step::Set { key, value } => {
                log::debug!("Rule '{}' step {}: {}", rule.name, active.step_index, step);
                out.set(key, value.clone());
                true
            }
            Step::Wait { duration } => {
                let elapsed = active.step_elapsed(now);
                log::trace!(
                    "Rule '{}' step {}: waited {:?} of {:?}",
                    rule.name,
                    active.step_index,
                    elapsed,
                    duration
                );
                elapsed >= *duration
            }
            Step::SetState { key, value } => {
                log::debug!("Rule '{}' step {}: {}", rule.name, active.step_index, step);
                self.state.insert(key.clone(), value.clone());
                true
            }
            Step::EmitEvent { name } => {
                log::debug!("Rule '{}' step {}: {}", rule.name, active.step_index, step);
                push_pending(&mut self.pending, &self.config, name.clone());
                true
            }
        };

        if done {
            self.advance(now)
        } else {
            TickOutcome::Waiting
        }
    }

    fn activate<S>(&mut self, event: &str, signals: &S, now: Instant)
    where
        S: SignalProvider + ?Sized,
    {
        let fallback = self.fallback();
        let matched = self.rules.iter().position(|rule| {
            rule.trigger == event && condition::all_satisfied(&rule.conditions, signals, fallback)
        });

        match matched {
            Some(rule_index) => {
                log::info!(
                    "Event '{}' activated rule '{}' ({} steps)",
                    event,
                    self.rules[rule_index].name,
                    self.rules[rule_index].sequence.len()
                );
                self.active = Some(ActiveSequence {
                    rule_index,
                    step_index: 0,
                    step_started_at: now,
                    started_at: now,
                });
            }
            None => log::debug!("Event '{}' matched no rule, dropped", event),
        }
    }

    fn advance(&mut self, now: Instant) -> TickOutcome {
        let Some(active) = self.active.as_mut() else {
            return TickOutcome::Idle;
        };

        active.step_index += 1;
        active.step_started_at = now;

        let rule = &self.rules[active.rule_index];
        if active.step_index < rule.sequence.len() {
            return TickOutcome::Advanced;
        }

        log::info!(
            "Rule '{}' completed in {:?}",
            rule.name,
            now.saturating_duration_since(active.started_at)
        );
        self.active = None;
        TickOutcome::Completed
    }

    fn fallback(&self) -> Option<&HashMap<String, Value>> {
        self.config.state_fallback.then_some(&self.state)
    }
}

fn push_pending(pending: &mut VecDeque<String>, config: &EngineConfig, name: String) {
    match config.intake {
        EventIntake::Latest => {
            if let Some(replaced) = pending.pop_front() {
                log::debug!("Event '{}' replaced unconsumed event '{}'", name, replaced);
            }
            pending.clear();
        }
        EventIntake::Queue => {
            if pending.len() >= config.queue_capacity() {
                if let Some(dropped) = pending.pop_front() {
                    log::warn!("Event queue full, dropping oldest event '{}'", dropped);
                }
            }
        }
    }
    pending.push_back(name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{CompareOp, Condition};
    use crate::signals::{CommandBuffer, SignalMap};

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    fn parked() -> SignalMap {
        SignalMap::new().with("gear", "P").with("VCU_Life_Signal", 1.0)
    }

    fn three_sets() -> Rule {
        Rule::new("three", "go")
            .when(Condition::new("gear", CompareOp::Eq, "P"))
            .then(Step::set("a", 1.0))
            .then(Step::set("b", 2.0))
            .then(Step::set("c", 3.0))
    }

    #[test]
    fn test_idle_tick_emits_nothing() {
        let mut engine = RuleEngine::new();
        engine.set_rules(vec![three_sets()]);
        let mut out = CommandBuffer::new();

        assert_eq!(engine.tick(&parked(), &mut out), TickOutcome::Idle);
        assert!(out.is_empty());
        assert_eq!(engine.active_rule_name(), None);
        assert_eq!(engine.active_step_index(), 0);
    }

    #[test]
    fn test_one_step_per_tick() {
        let base = Instant::now();
        let mut engine = RuleEngine::new();
        engine.set_rules(vec![three_sets()]);
        let signals = parked();
        engine.on_event("go");

        let mut seen = Vec::new();
        for i in 0..3 {
            let mut out = CommandBuffer::new();
            let outcome = engine.tick_at(&signals, &mut out, at(base, i * 10));
            assert_eq!(out.len(), 1);
            seen.extend(out.commands().keys().cloned());
            if i < 2 {
                assert_eq!(outcome, TickOutcome::Advanced);
                assert_eq!(engine.active_step_index(), i as usize + 1);
            } else {
                assert_eq!(outcome, TickOutcome::Completed);
            }
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert!(engine.is_idle());
    }

    #[test]
    fn test_unmatched_event_is_dropped() {
        let mut engine = RuleEngine::new();
        engine.set_rules(vec![three_sets()]);
        let mut out = CommandBuffer::new();

        engine.on_event("go");
        let neutral = SignalMap::new().with("gear", "N");
        assert_eq!(engine.tick(&neutral, &mut out), TickOutcome::Idle);
        assert_eq!(engine.pending_event_count(), 0);

        // Conditions becoming true later does not revive the event
        assert_eq!(engine.tick(&parked(), &mut out), TickOutcome::Idle);
        assert!(out.is_empty());
    }

    #[test]
    fn test_first_match_wins() {
        let first = Rule::new("first", "go")
            .when(Condition::new("VCU_Life_Signal", CompareOp::Gt, 5.0))
            .then(Step::set("first", true));
        let second = Rule::new("second", "go").then(Step::set("second", true));
        let third = Rule::new("third", "go").then(Step::set("third", true));

        let mut engine = RuleEngine::new();
        engine.set_rules(vec![first, second, third]);
        let mut out = CommandBuffer::new();

        engine.on_event("go");
        engine.tick(&parked(), &mut out);
        assert_eq!(out.get("second"), Some(&Value::Bool(true)));
        assert_eq!(out.len(), 1);

        out.clear();
        let alive = parked().with("VCU_Life_Signal", 9.0);
        engine.on_event("go");
        engine.tick(&alive, &mut out);
        assert_eq!(out.get("first"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_wait_step_timing() {
        let base = Instant::now();
        let rule = Rule::new("dwell", "go")
            .then(Step::set("before", 1.0))
            .then(Step::wait_ms(100))
            .then(Step::set("after", 1.0));
        let mut engine = RuleEngine::new();
        engine.set_rules(vec![rule]);
        let signals = SignalMap::new();
        let mut out = CommandBuffer::new();

        engine.on_event("go");
        assert_eq!(engine.tick_at(&signals, &mut out, at(base, 0)), TickOutcome::Advanced);
        out.clear();

        assert_eq!(engine.tick_at(&signals, &mut out, at(base, 50)), TickOutcome::Waiting);
        assert_eq!(engine.tick_at(&signals, &mut out, at(base, 99)), TickOutcome::Waiting);
        assert_eq!(engine.active_step_index(), 1);
        let active = engine.active_sequence().unwrap();
        assert_eq!(active.step_elapsed(at(base, 99)), Duration::from_millis(99));

        assert_eq!(engine.tick_at(&signals, &mut out, at(base, 100)), TickOutcome::Advanced);
        assert!(out.is_empty());

        assert_eq!(engine.tick_at(&signals, &mut out, at(base, 101)), TickOutcome::Completed);
        assert_eq!(out.get("after"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_cancel_and_restart_from_first_step() {
        let base = Instant::now();
        let mut engine = RuleEngine::new();
        engine.set_rules(vec![three_sets()]);
        let mut out = CommandBuffer::new();

        engine.on_event("go");
        engine.tick_at(&parked(), &mut out, at(base, 0));
        assert_eq!(engine.active_step_index(), 1);
        out.clear();

        let neutral = SignalMap::new().with("gear", "N");
        assert_eq!(engine.tick_at(&neutral, &mut out, at(base, 10)), TickOutcome::Cancelled);
        assert!(out.is_empty());
        assert_eq!(engine.active_rule_name(), None);

        engine.on_event("go");
        engine.tick_at(&parked(), &mut out, at(base, 20));
        assert_eq!(out.get("a"), Some(&Value::Number(1.0)));
        assert_eq!(engine.active_step_index(), 1);
    }

    #[test]
    fn test_set_rules_cancels_and_discards() {
        let mut engine = RuleEngine::new();
        engine.set_rules(vec![three_sets()]);
        let mut out = CommandBuffer::new();

        engine.on_event("go");
        engine.tick(&parked(), &mut out);
        engine.on_event("go");
        assert_eq!(engine.active_rule_name(), Some("three"));
        assert_eq!(engine.pending_event_count(), 1);

        out.clear();
        engine.set_rules(vec![three_sets()]);
        assert!(engine.is_idle());
        assert_eq!(engine.pending_event_count(), 0);
        assert!(out.is_empty());

        assert_eq!(engine.tick(&parked(), &mut out), TickOutcome::Idle);
        assert!(out.is_empty());
    }

    #[test]
    fn test_empty_sequence_completes_on_activation() {
        let mut engine = RuleEngine::new();
        engine.set_rules(vec![Rule::new("noop", "go")]);
        let mut out = CommandBuffer::new();

        engine.on_event("go");
        assert_eq!(engine.tick(&parked(), &mut out), TickOutcome::Completed);
        assert!(engine.is_idle());
        assert!(out.is_empty());
    }

    #[test]
    fn test_latest_intake_overwrites() {
        let mut engine =
            RuleEngine::with_config(EngineConfig::new().with_intake(EventIntake::Latest));
        engine.set_rules(vec![
            Rule::new("a", "a").then(Step::set("a", true)),
            Rule::new("b", "b").then(Step::set("b", true)),
        ]);
        let mut out = CommandBuffer::new();

        engine.on_event("a");
        engine.on_event("b");
        assert_eq!(engine.pending_event_count(), 1);

        engine.tick(&parked(), &mut out);
        assert_eq!(out.get("a"), None);
        assert_eq!(out.get("b"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_queue_preserves_order_until_idle() {
        let base = Instant::now();
        let mut engine = RuleEngine::new();
        engine.set_rules(vec![
            Rule::new("a", "a").then(Step::set("a1", 1.0)).then(Step::set("a2", 1.0)),
            Rule::new("b", "b").then(Step::set("b1", 1.0)),
        ]);
        let signals = SignalMap::new();

        engine.on_event("a");
        engine.on_event("b");

        let mut keys = Vec::new();
        for i in 0..4 {
            let mut out = CommandBuffer::new();
            engine.tick_at(&signals, &mut out, at(base, i * 50));
            keys.extend(out.commands().keys().cloned());
        }
        assert_eq!(keys, vec!["a1", "a2", "b1"]);
        assert_eq!(engine.pending_event_count(), 0);
    }

    #[test]
    fn test_queue_bound_drops_oldest() {
        let mut engine =
            RuleEngine::with_config(EngineConfig::new().with_max_pending_events(2));
        engine.set_rules(vec![
            Rule::new("a", "a").then(Step::set("a", true)),
            Rule::new("b", "b").then(Step::set("b", true)),
            Rule::new("c", "c").then(Step::set("c", true)),
        ]);
        let mut out = CommandBuffer::new();

        engine.on_event("a");
        engine.on_event("b");
        engine.on_event("c");
        assert_eq!(engine.pending_event_count(), 2);

        engine.tick(&parked(), &mut out);
        engine.tick(&parked(), &mut out);
        assert_eq!(out.get("a"), None);
        assert!(out.get("b").is_some());
        assert!(out.get("c").is_some());
    }

    fn handshake_rules() -> Vec<Rule> {
        vec![
            Rule::new("handshake", "dbw_toggle_on")
                .then(Step::set_state("handshake_done", true))
                .then(Step::emit_event("engage")),
            Rule::new("engage", "engage")
                .when(Condition::new("handshake_done", CompareOp::Eq, true))
                .then(Step::set("AS_AutoD_Req", 1.0)),
        ]
    }

    #[test]
    fn test_emit_event_is_deferred_and_state_feeds_conditions() {
        let mut engine = RuleEngine::new();
        engine.set_rules(handshake_rules());
        let signals = parked();
        let mut out = CommandBuffer::new();

        engine.on_event("dbw_toggle_on");
        assert_eq!(engine.tick(&signals, &mut out), TickOutcome::Advanced);
        assert_eq!(engine.state_value("handshake_done"), Some(&Value::Bool(true)));
        assert!(out.is_empty());

        // The emitted event is queued, not matched in the same tick
        assert_eq!(engine.tick(&signals, &mut out), TickOutcome::Completed);
        assert_eq!(engine.active_rule_name(), None);
        assert_eq!(engine.pending_event_count(), 1);
        assert!(out.is_empty());

        assert_eq!(engine.tick(&signals, &mut out), TickOutcome::Completed);
        assert_eq!(out.get("AS_AutoD_Req"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_state_fallback_can_be_disabled() {
        let mut engine =
            RuleEngine::with_config(EngineConfig::new().with_state_fallback(false));
        engine.set_rules(handshake_rules());
        let signals = parked();
        let mut out = CommandBuffer::new();

        engine.on_event("dbw_toggle_on");
        for _ in 0..3 {
            engine.tick(&signals, &mut out);
        }
        assert!(out.is_empty());
        assert!(engine.is_idle());
    }

    #[test]
    fn test_state_survives_set_rules() {
        let mut engine = RuleEngine::new();
        engine.set_rules(handshake_rules());
        let mut out = CommandBuffer::new();

        engine.on_event("dbw_toggle_on");
        engine.tick(&parked(), &mut out);
        let stored = engine.state_value("handshake_done").cloned();
        assert!(stored.is_some());

        engine.set_rules(handshake_rules());
        assert!(engine.is_idle());
        assert_eq!(engine.state_value("handshake_done"), stored.as_ref());
    }

    #[test]
    fn test_trait_objects() {
        let mut engine = RuleEngine::new();
        engine.set_rules(vec![three_sets()]);
        let signals = parked();
        let mut buffer = CommandBuffer::new();

        let provider: &dyn SignalProvider = &signals;
        let sink: &mut dyn CommandSink = &mut buffer;
        engine.on_event("go");
        assert_eq!(engine.tick(provider, sink), TickOutcome::Advanced);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_independent_instances() {
        let mut left = RuleEngine::new();
        let mut right = RuleEngine::new();
        left.set_rules(vec![three_sets()]);
        right.set_rules(vec![three_sets()]);
        let mut out = CommandBuffer::new();

        left.on_event("go");
        left.tick(&parked(), &mut out);
        assert_eq!(left.active_rule_name(), Some("three"));
        assert_eq!(right.active_rule_name(), None);
    }

    #[test]
    fn test_tick_outcome_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TickOutcome::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert_eq!(serde_json::to_string(&TickOutcome::Idle).unwrap(), "\"idle\"");
    }
}
