use serde_json::{Map, Value};

use super::display_value;

/// Headline fields in order of priority: DCF price, LBO returns, Monte Carlo
/// mean, then enterprise and equity value.
const PRIORITY_KEYS: [&str; 6] = [
    "price_per_share",
    "irr",
    "moic",
    "mean",
    "enterprise_value",
    "equity_value",
];

/// Headline fields whose absence is itself the answer: a DCF without a
/// per-share price, or a Monte Carlo run with no valid trials.
const NO_RESULT_KEYS: [&str; 2] = ["price_per_share", "summary"];

/// Print just the key answer value from the output.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match result {
        Value::Object(map) => {
            if let Some(line) = headline(map) {
                println!("{}", line);
            } else if let Some((key, val)) = map.iter().next() {
                println!("{}: {}", key, display_value(val));
            }
        }
        // Projection rows: the final year's free cash flow
        Value::Array(rows) => match rows.last().and_then(|r| r.get("fcf")) {
            Some(fcf) => println!("{}", display_value(fcf)),
            None => println!("{}", display_value(result)),
        },
        other => println!("{}", display_value(other)),
    }
}

/// The headline line: `<key>: no result` when a headline field is null,
/// otherwise the first priority value found.
fn headline(map: &Map<String, Value>) -> Option<String> {
    for key in NO_RESULT_KEYS {
        if lookup(map, key).is_some_and(Value::is_null) {
            return Some(format!("{}: no result", key));
        }
    }
    PRIORITY_KEYS
        .iter()
        .find_map(|key| lookup(map, key).filter(|v| !v.is_null()))
        .map(display_value)
}

/// Look `key` up in the result, then in its directly nested records.
fn lookup<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).or_else(|| {
        map.values()
            .filter_map(Value::as_object)
            .find_map(|inner| inner.get(key))
    })
}
