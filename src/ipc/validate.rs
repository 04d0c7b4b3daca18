use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde_json::{json, Value};

use crate::ipc::helpers::{row_exists, HandlerErr};

/// Field-level validation messages, collected across the whole candidate row
/// before create/update decides.
#[derive(Debug, Default)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_details(self) -> Value {
        json!({ "fieldErrors": self.0 })
    }
}

/// Required non-empty text.
pub fn req_text(body: &Value, key: &str, errors: &mut FieldErrors) -> String {
    match body.get(key).and_then(|v| v.as_str()).map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => {
            errors.add(key, "required");
            String::new()
        }
    }
}

pub fn opt_text(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Required text consisting of letters only (person-name fields).
pub fn req_letters(body: &Value, key: &str, errors: &mut FieldErrors) -> String {
    let v = req_text(body, key, errors);
    if !v.is_empty() && !v.chars().all(char::is_alphabetic) {
        errors.add(key, "must contain only letters");
    }
    v
}

pub fn req_i64(body: &Value, key: &str, errors: &mut FieldErrors) -> i64 {
    match body.get(key).and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => {
            errors.add(key, "required");
            0
        }
    }
}

pub fn req_i64_min(body: &Value, key: &str, min: i64, errors: &mut FieldErrors) -> i64 {
    let v = req_i64(body, key, errors);
    if body.get(key).and_then(|x| x.as_i64()).is_some() && v < min {
        errors.add(key, format!("must be at least {}", min));
    }
    v
}

/// Required calendar date, normalized to ISO `YYYY-MM-DD`.
pub fn req_date(body: &Value, key: &str, errors: &mut FieldErrors) -> String {
    let raw = req_text(body, key, errors);
    if raw.is_empty() {
        return raw;
    }
    match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        Ok(d) => d.format("%Y-%m-%d").to_string(),
        Err(_) => {
            errors.add(key, "must be a valid date (YYYY-MM-DD)");
            String::new()
        }
    }
}

/// Required time of day, normalized to `HH:MM`.
pub fn req_time(body: &Value, key: &str, errors: &mut FieldErrors) -> String {
    let raw = req_text(body, key, errors);
    if raw.is_empty() {
        return raw;
    }
    let parsed = NaiveTime::parse_from_str(&raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"));
    match parsed {
        Ok(t) => t.format("%H:%M").to_string(),
        Err(_) => {
            errors.add(key, "must be a valid time (HH:MM)");
            String::new()
        }
    }
}

/// Required foreign key: present and referencing an existing row.
pub fn req_fk(
    conn: &Connection,
    body: &Value,
    key: &str,
    table: &str,
    errors: &mut FieldErrors,
) -> Result<i64, HandlerErr> {
    match body.get(key).and_then(|v| v.as_i64()) {
        Some(id) => {
            if !row_exists(conn, table, id)? {
                errors.add(key, format!("references a missing {} row", table));
            }
            Ok(id)
        }
        None => {
            errors.add(key, "required");
            Ok(0)
        }
    }
}

/// Optional foreign key: absent/null is fine, a present value must resolve.
pub fn opt_fk(
    conn: &Connection,
    body: &Value,
    key: &str,
    table: &str,
    errors: &mut FieldErrors,
) -> Result<Option<i64>, HandlerErr> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_i64() {
            Some(id) => {
                if !row_exists(conn, table, id)? {
                    errors.add(key, format!("references a missing {} row", table));
                }
                Ok(Some(id))
            }
            None => {
                errors.add(key, "must be an integer id");
                Ok(None)
            }
        },
    }
}
