//! Core types for the drive-by-wire rule engine
//!
//! This module defines the value type shared by signal readings, condition operands and
//! command payloads, plus the library error type. The engine itself never fails during a
//! tick; errors only come from loading rule documents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for rule engine operations
pub type Result<T> = std::result::Result<T, RuleError>;

/// Absolute tolerance used when comparing two numbers for equality
pub const NUMBER_TOLERANCE: f64 = 1e-6;

/// Errors that can occur while loading rules
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Failed to parse rule document: {0}")]
    DocumentParseError(String),

    #[error("Invalid rule definition: {0}")]
    InvalidRule(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for RuleError {
    fn from(err: serde_json::Error) -> Self {
        RuleError::DocumentParseError(err.to_string())
    }
}

/// A typed value: signal reading, condition operand or command payload
///
/// Values of different kinds never compare equal; see [`CompareOp`](crate::rule::CompareOp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value (switches, flags)
    Bool(bool),
    /// Numeric value (physical signal values, enumerations encoded as numbers)
    Number(f64),
    /// Text value (e.g. gear position "P")
    Text(String),
}

impl Value {
    /// Name of this value's kind, as used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
        }
    }

    /// Get this value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", if *v { "true" } else { "false" }),
            Value::Number(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "\"{}\"", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}
