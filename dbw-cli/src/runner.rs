//! Control loop driver
//!
//! Feeds scripted events and signal changes into a [`RuleEngine`] and ticks it at a fixed
//! period, either on simulated time (deterministic) or on the system clock.

use crate::config::{AppConfig, EventConfig, SignalChangeConfig};
use crate::report::RunReport;
use dbw_rules::{
    CommandBuffer, CompareOp, Condition, EngineConfig, Rule, RuleEngine, SignalMap, Step,
    TickOutcome, Value,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Event used when nothing else is scheduled
pub const DEFAULT_EVENT: &str = "dbw_toggle_on";

/// Everything needed for one run, merged from config file and command line
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub rules: Option<PathBuf>,
    pub ticks: u64,
    pub period_ms: u64,
    pub realtime: bool,
    pub engine: EngineConfig,
    pub signals: BTreeMap<String, Value>,
    pub events: Vec<EventConfig>,
    pub signal_changes: Vec<SignalChangeConfig>,
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub rules: Option<PathBuf>,
    pub ticks: Option<u64>,
    pub period_ms: Option<u64>,
    pub realtime: bool,
    pub events: Vec<String>,
    pub signals: Vec<(String, Value)>,
}

impl RunPlan {
    /// Merge a config file with command-line overrides
    ///
    /// Without any signals the vehicle starts parked with a live VCU; without any events a
    /// single `dbw_toggle_on` is injected before the first tick.
    pub fn build(config: AppConfig, overrides: Overrides) -> Self {
        let mut signals = config.signals;
        signals.extend(overrides.signals);
        if signals.is_empty() {
            signals.insert("gear".to_string(), Value::from("P"));
            signals.insert("VCU_Life_Signal".to_string(), Value::Number(1.0));
        }

        let mut events = config.events;
        events.extend(overrides.events.into_iter().map(|name| EventConfig { at_tick: 0, name }));
        if events.is_empty() {
            events.push(EventConfig {
                at_tick: 0,
                name: DEFAULT_EVENT.to_string(),
            });
        }

        Self {
            rules: overrides.rules.or(config.rules),
            ticks: overrides.ticks.unwrap_or(config.run.ticks),
            period_ms: overrides.period_ms.unwrap_or(config.run.period_ms),
            realtime: overrides.realtime || config.run.realtime,
            engine: config.engine,
            signals,
            events,
            signal_changes: config.signal_changes,
        }
    }
}

/// The rule installed when no rule document is given
pub fn builtin_rules() -> Vec<Rule> {
    vec![Rule::new("enter_auto_mode", DEFAULT_EVENT)
        .when(Condition::new("gear", CompareOp::Eq, "P"))
        .when(Condition::new("VCU_Life_Signal", CompareOp::Gt, 0.0))
        .then(Step::set("AS_HandShank_Ctrl_St", 0.0))
        .then(Step::set("AS_Strg0_Enable", 3.0))
        .then(Step::set("AS_Strg1_Enable", 3.0))
        .then(Step::set("AS_Strg_WorkMode_Req", 1.0))
        .then(Step::set("AS_AutoD_Shift_Req", 2.0))
        .then(Step::set("AS_Longit_Ctrlmode", 1.0))
        .then(Step::set("AS_AutoD_BrkMode_Req", 3.0))
        .then(Step::set("AS_AutoD_Accel_Pos_Req", 0.0))
        .then(Step::set("AS_AutoD_BrkPelPos_Req", 0.3))
        .then(Step::set("AS_AutoD_Spd_Limit", 5.0))
        .then(Step::wait_ms(200))
        .then(Step::set("AS_AutoD_Req", 1.0))]
}

/// Drive `engine` through the plan and return the trace
///
/// With `echo` set, emitted commands and lifecycle changes are printed as they happen.
pub fn run(engine: &mut RuleEngine, plan: &RunPlan, echo: bool) -> RunReport {
    let mut signals: SignalMap = plan.signals.clone().into_iter().collect();
    let mut out = CommandBuffer::new();
    let mut report = RunReport::new(plan.period_ms);

    let period = Duration::from_millis(plan.period_ms);
    let start = Instant::now();

    for tick in 0..plan.ticks {
        for change in plan.signal_changes.iter().filter(|c| c.at_tick == tick) {
            log::info!("Tick {}: signal {} -> {}", tick, change.signal, change.value);
            signals.set(change.signal.clone(), change.value.clone());
        }
        for event in plan.events.iter().filter(|e| e.at_tick == tick) {
            log::info!("Tick {}: event {}", tick, event.name);
            engine.on_event(event.name.clone());
        }

        let now = if plan.realtime {
            Instant::now()
        } else {
            start + Duration::from_millis(plan.period_ms * tick)
        };
        let running = engine.active_rule_name().map(str::to_string);

        out.clear();
        let outcome = engine.tick_at(&signals, &mut out, now);
        let elapsed_ms = now.saturating_duration_since(start).as_millis() as u64;

        if echo {
            print_tick(elapsed_ms, outcome, running.as_deref(), engine, &out);
        }
        report.record(tick, elapsed_ms, outcome, engine, &out);

        if plan.realtime {
            std::thread::sleep(period);
        }
    }

    report
}

fn print_tick(
    elapsed_ms: u64,
    outcome: TickOutcome,
    running: Option<&str>,
    engine: &RuleEngine,
    out: &CommandBuffer,
) {
    for (key, value) in out.commands() {
        println!("[{:>6} ms] set {{ {}: {} }}", elapsed_ms, key, value);
    }

    match outcome {
        TickOutcome::Cancelled => println!(
            "[{:>6} ms] rule '{}' cancelled: conditions no longer hold",
            elapsed_ms,
            running.unwrap_or("?")
        ),
        TickOutcome::Completed => println!("[{:>6} ms] sequence completed", elapsed_ms),
        _ if running.is_none() => {
            if let Some(name) = engine.active_rule_name() {
                println!("[{:>6} ms] rule '{}' activated", elapsed_ms, name);
            }
        }
        _ => {}
    }
}
