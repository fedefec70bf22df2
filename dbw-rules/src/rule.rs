//! Rule definitions
//!
//! A rule ties a trigger event to a flat list of conditions (all must hold) and an ordered
//! sequence of steps executed across ticks.

use crate::types::{Value, NUMBER_TOLERANCE};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Comparison operator used by a [`Condition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    /// All operators, in document keyword order
    pub const ALL: [CompareOp; 6] = [
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Gt,
        CompareOp::Lt,
        CompareOp::Ge,
        CompareOp::Le,
    ];

    /// Parse a rule document keyword (e.g. `greater_than`)
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.keyword() == keyword)
    }

    /// The rule document keyword for this operator
    pub fn keyword(self) -> &'static str {
        match self {
            CompareOp::Eq => "equals",
            CompareOp::Ne => "not_equals",
            CompareOp::Gt => "greater_than",
            CompareOp::Lt => "less_than",
            CompareOp::Ge => "greater_or_equal",
            CompareOp::Le => "less_or_equal",
        }
    }

    /// Compare two numbers
    ///
    /// Numbers within [`NUMBER_TOLERANCE`] of each other are equal; outside it the ordering
    /// follows the sign of `a - b`.
    pub fn compare_numbers(self, a: f64, b: f64) -> bool {
        let diff = a - b;
        let ordering = if diff.abs() <= NUMBER_TOLERANCE {
            Ordering::Equal
        } else if diff < 0.0 {
            Ordering::Less
        } else {
            Ordering::Greater
        };
        self.holds(ordering)
    }

    /// Compare two booleans (only `Eq`/`Ne` are meaningful)
    pub fn compare_bools(self, a: bool, b: bool) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            _ => false,
        }
    }

    /// Compare two strings (only `Eq`/`Ne` are meaningful)
    pub fn compare_text(self, a: &str, b: &str) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            _ => false,
        }
    }

    /// Compare two values; values of different kinds never satisfy any operator
    pub fn compare(self, lhs: &Value, rhs: &Value) -> bool {
        match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => self.compare_numbers(*a, *b),
            (Value::Bool(a), Value::Bool(b)) => self.compare_bools(*a, *b),
            (Value::Text(a), Value::Text(b)) => self.compare_text(a, b),
            _ => false,
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
        };
        f.write_str(symbol)
    }
}

/// A single comparison of a signal against an expected value
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Signal name
    pub signal: String,
    /// Comparison operator
    pub op: CompareOp,
    /// Expected value (its kind selects which signal accessor is used)
    pub value: Value,
}

impl Condition {
    /// Create a new condition
    pub fn new(signal: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            signal: signal.into(),
            op,
            value: value.into(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.signal, self.op, self.value)
    }
}

/// One unit of sequence execution
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Write a command into the tick's command sink
    Set { key: String, value: Value },
    /// Dwell for at least `duration` before moving on
    Wait { duration: Duration },
    /// Write into the engine's internal state store
    SetState { key: String, value: Value },
    /// Queue an event for a later tick
    EmitEvent { name: String },
}

impl Step {
    pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Step::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn wait_ms(ms: u64) -> Self {
        Step::Wait {
            duration: Duration::from_millis(ms),
        }
    }

    pub fn set_state(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Step::SetState {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn emit_event(name: impl Into<String>) -> Self {
        Step::EmitEvent { name: name.into() }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Set { key, value } => write!(f, "set {} = {}", key, value),
            Step::Wait { duration } => write!(f, "wait {}ms", duration.as_millis()),
            Step::SetState { key, value } => write!(f, "set_state {} = {}", key, value),
            Step::EmitEvent { name } => write!(f, "emit_event {}", name),
        }
    }
}

/// A rule: trigger event, activation/continuation conditions and a step sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Rule name (not required to be unique)
    pub name: String,
    /// Event name that starts this rule, e.g. `dbw_toggle_on`
    pub trigger: String,
    /// All must hold to start and to continue
    pub conditions: Vec<Condition>,
    /// Steps executed across ticks
    pub sequence: Vec<Step>,
}

impl Rule {
    /// Create a rule with no conditions and an empty sequence
    pub fn new(name: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trigger: trigger.into(),
            conditions: Vec::new(),
            sequence: Vec::new(),
        }
    }

    /// Builder method: add a condition
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Builder method: append a step to the sequence
    pub fn then(mut self, step: Step) -> Self {
        self.sequence.push(step);
        self
    }
}
