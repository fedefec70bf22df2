//! Run trace report
//!
//! Records what every tick did and writes it out as JSON.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dbw_rules::{CommandBuffer, RuleEngine, TickOutcome, Value};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Trace of a complete run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub period_ms: u64,
    pub ticks: Vec<TickRecord>,
}

/// What happened during one tick
#[derive(Debug, Clone, Serialize)]
pub struct TickRecord {
    pub tick: u64,
    pub elapsed_ms: u64,
    pub outcome: TickOutcome,
    /// Rule active after the tick
    pub active_rule: Option<String>,
    pub step_index: usize,
    pub commands: Vec<CommandRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandRecord {
    pub key: String,
    pub value: Value,
}

impl RunReport {
    pub fn new(period_ms: u64) -> Self {
        Self {
            generated_at: Utc::now(),
            period_ms,
            ticks: Vec::new(),
        }
    }

    /// Record the state of `engine` and the commands in `out` right after a tick
    pub fn record(
        &mut self,
        tick: u64,
        elapsed_ms: u64,
        outcome: TickOutcome,
        engine: &RuleEngine,
        out: &CommandBuffer,
    ) {
        self.ticks.push(TickRecord {
            tick,
            elapsed_ms,
            outcome,
            active_rule: engine.active_rule_name().map(str::to_string),
            step_index: engine.active_step_index(),
            commands: out
                .commands()
                .iter()
                .map(|(key, value)| CommandRecord {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        });
    }

    /// Total number of commands emitted over the run
    pub fn command_count(&self) -> usize {
        self.ticks.iter().map(|t| t.commands.len()).sum()
    }

    /// Number of ticks with the given outcome
    pub fn count_outcome(&self, outcome: TickOutcome) -> usize {
        self.ticks.iter().filter(|t| t.outcome == outcome).count()
    }
}

/// Write the report as pretty-printed JSON
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create trace file: {:?}", path))?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, report)
        .with_context(|| format!("Failed to write trace file: {:?}", path))?;
    writer.flush()?;

    log::info!("Trace written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbw_rules::{Rule, SignalMap, Step};

    #[test]
    fn test_record_and_serialize() {
        let mut engine = RuleEngine::new();
        engine.set_rules(vec![Rule::new("r", "go")
            .then(Step::set("AS_AutoD_Req", 1.0))
            .then(Step::wait_ms(100))]);
        engine.on_event("go");

        let mut out = CommandBuffer::new();
        let outcome = engine.tick(&SignalMap::new(), &mut out);

        let mut report = RunReport::new(50);
        report.record(0, 0, outcome, &engine, &out);
        out.clear();
        report.record(1, 50, TickOutcome::Waiting, &engine, &out);

        assert_eq!(report.command_count(), 1);
        assert_eq!(report.count_outcome(TickOutcome::Advanced), 1);
        assert_eq!(report.count_outcome(TickOutcome::Waiting), 1);
        assert_eq!(report.ticks[0].outcome, TickOutcome::Advanced);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["period_ms"], 50);
        assert_eq!(json["ticks"][0]["outcome"], "advanced");
        assert_eq!(json["ticks"][0]["active_rule"], "r");
        assert_eq!(json["ticks"][0]["step_index"], 1);
        assert_eq!(json["ticks"][0]["commands"][0]["key"], "AS_AutoD_Req");
        assert_eq!(json["ticks"][0]["commands"][0]["value"], 1.0);
        assert!(json["ticks"][1]["commands"].as_array().unwrap().is_empty());
        assert!(json["generated_at"].is_string());
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");

        write_report(&path, &RunReport::new(20)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["period_ms"], 20);
    }
}
