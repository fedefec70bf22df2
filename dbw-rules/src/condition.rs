//! Condition evaluation against live signals
//!
//! Evaluation is fail-closed: a missing signal or a kind mismatch makes the condition false,
//! it is never an error.

use crate::rule::Condition;
use crate::signals::SignalProvider;
use crate::types::Value;
use std::collections::HashMap;

/// Evaluate a single condition
///
/// The expected value's kind selects the accessor (number, then bool, then text). When the
/// provider has no signal of that name at all and `fallback` is given, the condition is
/// evaluated against the fallback entry of the same name instead.
pub fn evaluate<S>(
    condition: &Condition,
    signals: &S,
    fallback: Option<&HashMap<String, Value>>,
) -> bool
where
    S: SignalProvider + ?Sized,
{
    let name = condition.signal.as_str();
    let op = condition.op;

    let observed = match &condition.value {
        Value::Number(expected) => signals
            .get_number(name)
            .map(|actual| op.compare_numbers(actual, *expected)),
        Value::Bool(expected) => signals
            .get_bool(name)
            .map(|actual| op.compare_bools(actual, *expected)),
        Value::Text(expected) => signals
            .get_string(name)
            .map(|actual| op.compare_text(actual, expected)),
    };

    match observed {
        Some(result) => result,
        // Present, but of another kind
        None if signals.has_signal(name) => false,
        None => fallback
            .and_then(|state| state.get(name))
            .map_or(false, |stored| op.compare(stored, &condition.value)),
    }
}

/// Evaluate a conjunction of conditions; an empty list is satisfied
pub fn all_satisfied<S>(
    conditions: &[Condition],
    signals: &S,
    fallback: Option<&HashMap<String, Value>>,
) -> bool
where
    S: SignalProvider + ?Sized,
{
    conditions.iter().all(|c| evaluate(c, signals, fallback))
}

/// Return the first condition that does not hold, if any
pub fn first_failing<'r, S>(
    conditions: &'r [Condition],
    signals: &S,
    fallback: Option<&HashMap<String, Value>>,
) -> Option<&'r Condition>
where
    S: SignalProvider + ?Sized,
{
    conditions.iter().find(|c| !evaluate(c, signals, fallback))
}
