//! Drive-by-wire rule runner
//!
//! Command-line front end for the dbw-rules engine. It loads a rule document (or falls back to
//! the built-in `enter_auto_mode` rule), injects scripted events and signal changes, ticks the
//! engine at a fixed control period and prints every command it emits.

use anyhow::{Context, Result};
use clap::Parser;
use dbw_rules::{RuleEngine, Value};
use std::path::PathBuf;

mod config;
mod report;
mod runner;

use runner::{Overrides, RunPlan};

/// Drive-by-wire rule runner - tick a rule engine against simulated vehicle signals
#[derive(Parser, Debug)]
#[command(name = "dbw-cli")]
#[command(about = "Run drive-by-wire control rules against simulated signals", long_about = None)]
#[command(version)]
struct Args {
    /// JSON rule document (default: built-in enter_auto_mode rule)
    #[arg(short, long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Run configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Event injected before the first tick (can be repeated)
    #[arg(short, long, value_name = "NAME")]
    event: Vec<String>,

    /// Initial signal value (can be repeated)
    #[arg(short, long, value_name = "NAME=VALUE", value_parser = config::parse_signal_arg)]
    signal: Vec<(String, Value)>,

    /// Number of control ticks to run
    #[arg(short, long, value_name = "COUNT")]
    ticks: Option<u64>,

    /// Control period in milliseconds
    #[arg(long, value_name = "MS")]
    period_ms: Option<u64>,

    /// Tick on the wall clock instead of simulated time
    #[arg(long)]
    realtime: bool,

    /// Write a JSON trace of every tick
    #[arg(long, value_name = "FILE")]
    trace: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("DBW rule runner v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using dbw-rules library v{}", dbw_rules::VERSION);

    let app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from {:?}", path);
            config::load_config(path)?
        }
        None => config::AppConfig::default(),
    };

    let plan = RunPlan::build(
        app_config,
        Overrides {
            rules: args.rules,
            ticks: args.ticks,
            period_ms: args.period_ms,
            realtime: args.realtime,
            events: args.event,
            signals: args.signal,
        },
    );

    let mut engine = RuleEngine::with_config(plan.engine.clone());
    match &plan.rules {
        Some(path) => {
            let count = engine
                .load_rules_from_file(path)
                .with_context(|| format!("Failed to load rules from {:?}", path))?;
            log::info!("Loaded {} rule(s) from {:?}", count, path);
        }
        None => {
            log::info!("No rule document given, using built-in enter_auto_mode rule");
            engine.set_rules(runner::builtin_rules());
        }
    }

    for (name, value) in &plan.signals {
        log::debug!("Signal {} = {}", name, value);
    }
    log::info!(
        "Running {} tick(s) at {} ms ({})",
        plan.ticks,
        plan.period_ms,
        if plan.realtime { "realtime" } else { "simulated" }
    );

    let run_report = runner::run(&mut engine, &plan, !args.quiet);

    if let Some(path) = &args.trace {
        report::write_report(path, &run_report)?;
    }

    if !args.quiet {
        println!();
        println!("=== Summary ===");
        println!("Ticks:     {}", run_report.ticks.len());
        println!("Commands:  {}", run_report.command_count());
        println!(
            "Completed: {}",
            run_report.count_outcome(dbw_rules::TickOutcome::Completed)
        );
        println!(
            "Cancelled: {}",
            run_report.count_outcome(dbw_rules::TickOutcome::Cancelled)
        );
        if let Some(name) = engine.active_rule_name() {
            println!(
                "Still running: {} (step {})",
                name,
                engine.active_step_index()
            );
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
