pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use rust_decimal::Decimal;
use serde_json::{Number, Value};

use crate::OutputFormat;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Display form of a number: integers as-is, floats rounded to 2 dp.
pub(crate) fn round_number(n: &Number) -> String {
    if n.is_f64() {
        if let Some(d) = n.as_f64().and_then(Decimal::from_f64_retain) {
            return d.round_dp(2).normalize().to_string();
        }
    }
    n.to_string()
}

/// Display form of any scalar or array, with floats rounded.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => round_number(n),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => arr.iter().map(display_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
