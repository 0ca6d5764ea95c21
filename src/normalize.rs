//! Field extraction and normalization
//!
//! Inbound payloads are loosely typed JSON; every field goes through these
//! helpers before it is allowed anywhere near the outbound query.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::AppError;

static LEADING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+").unwrap());

/// First key present in `payload` with a non-null value, in the given order.
pub fn get_any<'a>(payload: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| payload.get(*k))
        .find(|v| !v.is_null())
}

/// Like [`get_any`] but required: absence everywhere is a caller error
/// naming the attempted keys.
pub fn require_any<'a>(
    payload: &'a Map<String, Value>,
    keys: &[&str],
) -> Result<&'a Value, AppError> {
    get_any(payload, keys).ok_or_else(|| {
        AppError::MissingField(format!("Missing required field: one of {keys:?}"))
    })
}

/// Coerce any JSON value to a trimmed, lowercased string. Total.
pub fn norm_str(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_lowercase(),
        other => other.to_string().trim().to_lowercase(),
    }
}

/// Normalize a cylinder count: absent input is `"unknown"`, numeric-looking
/// input becomes `"<n> cylinders"`, anything else passes through trimmed
/// and lowercased.
pub fn norm_cyl(v: Option<&Value>) -> String {
    let Some(v) = v else {
        return "unknown".to_string();
    };

    if let Some(n) = number_as_i64(v) {
        return format!("{n} cylinders");
    }

    let s = norm_str(v);
    if let Some(m) = LEADING_DIGITS.find(&s) {
        if let Ok(n) = m.as_str().parse::<i64>() {
            return format!("{n} cylinders");
        }
    }
    s
}

/// Coerce a JSON value to an integer: numbers truncate, strings must parse
/// as a whole integer.
pub fn coerce_i64(v: &Value, field: &str) -> Result<i64, AppError> {
    match v {
        Value::Number(_) => number_as_i64(v),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| AppError::InvalidInput(format!("Field `{field}` must be an integer, got {v}")))
}

/// Coerce a JSON value to a float: numbers pass, strings must parse.
pub fn coerce_f64(v: &Value, field: &str) -> Result<f64, AppError> {
    value_as_f64(v)
        .ok_or_else(|| AppError::InvalidInput(format!("Field `{field}` must be a number, got {v}")))
}

/// Lenient float view of a JSON value, used when scanning result rows.
pub fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn number_as_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn norm_str_trims_and_lowercases() {
        assert_eq!(norm_str(&json!("  Ford  ")), "ford");
        assert_eq!(norm_str(&json!("F-150")), "f-150");
        assert_eq!(norm_str(&json!(45000.5)), "45000.5");
        assert_eq!(norm_str(&json!(true)), "true");
    }

    #[test]
    fn norm_str_is_idempotent() {
        for raw in ["  MiXeD Case  ", "already lower", "\tTABS\t"] {
            let once = norm_str(&json!(raw));
            assert_eq!(norm_str(&json!(once.clone())), once);
        }
    }

    #[test]
    fn norm_cyl_formats_numeric_input() {
        assert_eq!(norm_cyl(Some(&json!(6))), "6 cylinders");
        assert_eq!(norm_cyl(Some(&json!(8.0))), "8 cylinders");
        assert_eq!(norm_cyl(Some(&json!(6.7))), "6 cylinders");
        assert_eq!(norm_cyl(Some(&json!("8"))), "8 cylinders");
        assert_eq!(norm_cyl(Some(&json!("  08  "))), "8 cylinders");
    }

    #[test]
    fn norm_cyl_extracts_a_leading_digit_run() {
        assert_eq!(norm_cyl(Some(&json!("6 cyl"))), "6 cylinders");
        assert_eq!(norm_cyl(Some(&json!("  10 Cylinders  "))), "10 cylinders");
    }

    #[test]
    fn norm_cyl_passes_everything_else_through() {
        assert_eq!(norm_cyl(None), "unknown");
        assert_eq!(norm_cyl(Some(&json!("unknown"))), "unknown");
        assert_eq!(norm_cyl(Some(&json!("V8"))), "v8");
    }

    #[test]
    fn get_any_takes_the_first_present_key() {
        let payload = obj(json!({"make": "Ford"}));
        assert_eq!(
            get_any(&payload, &["manufacturer", "make"]),
            Some(&json!("Ford"))
        );
    }

    #[test]
    fn get_any_skips_null_values() {
        let payload = obj(json!({"manufacturer": null, "make": "Ford"}));
        assert_eq!(
            get_any(&payload, &["manufacturer", "make"]),
            Some(&json!("Ford"))
        );
        assert_eq!(get_any(&payload, &["manufacturer"]), None);
    }

    #[test]
    fn require_any_names_the_attempted_keys() {
        let err = require_any(&Map::new(), &["manufacturer", "make"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("manufacturer"), "got: {msg}");
        assert!(msg.contains("make"), "got: {msg}");
    }

    #[test]
    fn coerce_i64_accepts_numbers_and_numeric_strings() {
        assert_eq!(coerce_i64(&json!(2015), "year").unwrap(), 2015);
        assert_eq!(coerce_i64(&json!("2015"), "year").unwrap(), 2015);
        assert_eq!(coerce_i64(&json!(2015.7), "year").unwrap(), 2015);
        assert!(coerce_i64(&json!("abc"), "year").is_err());
        assert!(coerce_i64(&json!([1]), "year").is_err());
    }

    #[test]
    fn coerce_f64_accepts_numbers_and_numeric_strings() {
        assert_eq!(coerce_f64(&json!(45000), "odometer").unwrap(), 45000.0);
        assert_eq!(coerce_f64(&json!("45000.5"), "odometer").unwrap(), 45000.5);
        assert!(coerce_f64(&json!({}), "odometer").is_err());
    }
}
