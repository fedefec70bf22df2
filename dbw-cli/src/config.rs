//! Run configuration loading and parsing

use anyhow::{Context, Result};
use dbw_rules::{EngineConfig, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main run configuration (loaded from a TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// JSON rule document; relative paths are resolved against the config file
    pub rules: Option<PathBuf>,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Initial signal values
    #[serde(default)]
    pub signals: BTreeMap<String, Value>,
    #[serde(default)]
    pub events: Vec<EventConfig>,
    #[serde(default)]
    pub signal_changes: Vec<SignalChangeConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default)]
    pub realtime: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ticks: default_ticks(),
            period_ms: default_period_ms(),
            realtime: false,
        }
    }
}

fn default_ticks() -> u64 {
    20
}

fn default_period_ms() -> u64 {
    50
}

/// An event injected before the given tick
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EventConfig {
    #[serde(default)]
    pub at_tick: u64,
    pub name: String,
}

/// A signal value change applied before the given tick
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SignalChangeConfig {
    pub at_tick: u64,
    pub signal: String,
    pub value: Value,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if let (Some(rules), Some(dir)) = (&config.rules, path.parent()) {
        if rules.is_relative() {
            config.rules = Some(dir.join(rules));
        }
    }

    Ok(config)
}

/// Parse a `NAME=VALUE` signal assignment from the command line
///
/// `true`/`false` become booleans, anything that parses as a number becomes a number, and
/// everything else (optionally in double quotes) is text.
pub fn parse_signal_arg(arg: &str) -> std::result::Result<(String, Value), String> {
    let (name, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", arg))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing signal name in '{}'", arg));
    }

    Ok((name.to_string(), parse_value_literal(raw.trim())))
}

fn parse_value_literal(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match raw.parse::<f64>() {
            Ok(number) => Value::Number(number),
            Err(_) => {
                let text = raw
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .unwrap_or(raw);
                Value::Text(text.to_string())
            }
        },
    }
}
