//! JSON rule document loader
//!
//! Parses documents of the form
//!
//! ```json
//! { "rules": [ {
//!     "name": "enter_auto_mode",
//!     "trigger": { "on_event": "dbw_toggle_on" },
//!     "conditions": [ { "signal": "gear", "equals": "P" } ],
//!     "sequence": [ { "set": { "AS_AutoD_Req": 1.0 } }, { "wait_ms": 200 } ]
//! } ] }
//! ```
//!
//! and converts them into [`Rule`]s. Validation is structural only: signal names, value
//! ranges and reachability are not checked. A document either loads completely or not at all.

use crate::rule::{CompareOp, Condition, Rule, Step};
use crate::types::{Result, RuleError, Value};
use serde_json::{Map, Value as Json};
use std::path::Path;

const STEP_KINDS: [&str; 4] = ["set", "wait_ms", "set_state", "emit_event"];

/// Parse a rule document from a JSON string
pub fn parse_rules_str(text: &str) -> Result<Vec<Rule>> {
    let document: Json = serde_json::from_str(text)?;

    let entries = document
        .get("rules")
        .and_then(Json::as_array)
        .ok_or_else(|| RuleError::InvalidRule("missing 'rules' array".to_string()))?;

    let rules = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| convert_rule(index, entry))
        .collect::<Result<Vec<_>>>()?;

    log::debug!("Parsed {} rule(s) from document", rules.len());
    Ok(rules)
}

/// Read and parse a rule document from a file
pub fn parse_rules_file(path: &Path) -> Result<Vec<Rule>> {
    log::info!("Loading rule file: {:?}", path);

    let text = std::fs::read_to_string(path)?;

    let rules = parse_rules_str(&text)?;
    log::info!("Parsed {} rule(s) from {:?}", rules.len(), path);
    Ok(rules)
}

/// Convert one entry of the `rules` array
fn convert_rule(index: usize, entry: &Json) -> Result<Rule> {
    let object = entry
        .as_object()
        .ok_or_else(|| invalid(&format!("rule #{}", index), "expected an object"))?;

    let name = required_str(object, "name", &format!("rule #{}", index))?;
    let context = format!("rule #{} ('{}')", index, name);

    let trigger = object
        .get("trigger")
        .and_then(Json::as_object)
        .ok_or_else(|| invalid(&context, "missing 'trigger' object"))?;
    let trigger = required_str(trigger, "on_event", &format!("{} trigger", context))?;

    let conditions = match object.get("conditions") {
        None | Some(Json::Null) => Vec::new(),
        Some(Json::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| convert_condition(&format!("{} condition #{}", context, i), item))
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(invalid(&context, "'conditions' must be an array")),
    };

    let sequence = object
        .get("sequence")
        .and_then(Json::as_array)
        .ok_or_else(|| invalid(&context, "missing 'sequence' array"))?
        .iter()
        .enumerate()
        .map(|(i, item)| convert_step(&format!("{} step #{}", context, i), item))
        .collect::<Result<Vec<_>>>()?;

    Ok(Rule {
        name: name.to_string(),
        trigger: trigger.to_string(),
        conditions,
        sequence,
    })
}

/// Convert `{"signal": name, "<op-keyword>": value}`
fn convert_condition(context: &str, item: &Json) -> Result<Condition> {
    let object = item
        .as_object()
        .ok_or_else(|| invalid(context, "expected an object"))?;
    let signal = required_str(object, "signal", context)?;

    let mut operators = object.iter().filter(|(key, _)| key.as_str() != "signal");
    let (keyword, expected) = match (operators.next(), operators.next()) {
        (Some(only), None) => only,
        (None, _) => return Err(invalid(context, "missing comparison operator")),
        (Some(_), Some(_)) => {
            return Err(invalid(context, "expected exactly one comparison operator"))
        }
    };

    let op = CompareOp::from_keyword(keyword).ok_or_else(|| {
        invalid(context, &format!("unknown comparison operator '{}'", keyword))
    })?;

    Ok(Condition {
        signal: signal.to_string(),
        op,
        value: convert_value(context, expected)?,
    })
}

/// Convert one entry of a rule's `sequence`
fn convert_step(context: &str, item: &Json) -> Result<Step> {
    let object = item
        .as_object()
        .ok_or_else(|| invalid(context, "expected an object"))?;

    let kinds: Vec<&str> = STEP_KINDS
        .iter()
        .copied()
        .filter(|kind| object.contains_key(*kind))
        .collect();

    let (kind, body) = match kinds.as_slice() {
        [kind] => (*kind, &object[*kind]),
        [] => return Err(invalid(context, "unknown step type")),
        _ => return Err(invalid(context, &format!("ambiguous step, found {}", kinds.join(", ")))),
    };

    match kind {
        "set" => {
            let (key, value) = single_entry(context, "set", body)?;
            Ok(Step::Set { key, value })
        }
        "set_state" => {
            let (key, value) = single_entry(context, "set_state", body)?;
            Ok(Step::SetState { key, value })
        }
        "wait_ms" => body
            .as_u64()
            .map(Step::wait_ms)
            .ok_or_else(|| invalid(context, "'wait_ms' must be a non-negative integer")),
        _ => body
            .as_str()
            .map(Step::emit_event)
            .ok_or_else(|| invalid(context, "'emit_event' must be a string")),
    }
}

/// Extract the `{key: value}` body of a `set`/`set_state` step
fn single_entry(context: &str, kind: &str, body: &Json) -> Result<(String, Value)> {
    let object = body
        .as_object()
        .ok_or_else(|| invalid(context, &format!("'{}' must be an object", kind)))?;

    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some((key, value)), None) => Ok((key.clone(), convert_value(context, value)?)),
        _ => Err(invalid(
            context,
            &format!("{} step must have exactly one key", kind),
        )),
    }
}

fn convert_value(context: &str, json: &Json) -> Result<Value> {
    match json {
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::String(s) => Ok(Value::Text(s.clone())),
        Json::Number(n) => n.as_f64().map(Value::Number).ok_or_else(|| {
            RuleError::InvalidValue(format!("{}: number {} is out of range", context, n))
        }),
        other => Err(RuleError::InvalidValue(format!(
            "{}: expected bool, number or string, got {}",
            context, other
        ))),
    }
}

fn required_str<'a>(object: &'a Map<String, Json>, field: &str, context: &str) -> Result<&'a str> {
    object
        .get(field)
        .and_then(Json::as_str)
        .ok_or_else(|| invalid(context, &format!("missing '{}' string", field)))
}

fn invalid(context: &str, message: &str) -> RuleError {
    RuleError::InvalidRule(format!("{}: {}", context, message))
}
