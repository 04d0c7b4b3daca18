use std::collections::HashMap;

use rusqlite::Connection;

use crate::ipc::error::err;
use crate::ipc::types::AppState;

/// A handler-level failure, turned into the error envelope at the dispatch
/// boundary so the query code can use `?` throughout.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            code: "conflict",
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(details: serde_json::Value) -> Self {
        Self {
            code: "validation_failed",
            message: "one or more fields are invalid".to_string(),
            details: Some(details),
        }
    }

    pub fn no_workspace() -> Self {
        Self {
            code: "no_workspace",
            message: "select a workspace first".to_string(),
            details: None,
        }
    }

    pub fn db_query(e: rusqlite::Error) -> Self {
        Self {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn db_insert(e: rusqlite::Error) -> Self {
        Self {
            code: "db_insert_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn db_update(e: rusqlite::Error) -> Self {
        Self {
            code: "db_update_failed",
            message: e.to_string(),
            details: None,
        }
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state.db.as_ref().ok_or_else(HandlerErr::no_workspace)
}

/// Detail/edit/delete paths treat a missing or non-numeric id like an absent
/// row rather than a malformed request.
pub fn path_id(params: &serde_json::Value) -> Result<i64, HandlerErr> {
    params
        .get("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::not_found("missing id"))
}

pub fn body(params: &serde_json::Value, key: &str) -> Result<serde_json::Value, HandlerErr> {
    params
        .get(key)
        .filter(|v| v.is_object())
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn page_param(params: &serde_json::Value) -> i64 {
    params.get("page").and_then(|v| v.as_i64()).unwrap_or(1)
}

pub fn sort_param<'a>(params: &'a serde_json::Value) -> &'a str {
    params.get("sort").and_then(|v| v.as_str()).unwrap_or("")
}

/// The submitted filter as a string map, the shape the filter store persists.
/// Scalar values are coerced to their string form so `{"yearCreated": 2020}`
/// and `{"yearCreated": "2020"}` behave alike. Returns None when the request
/// carries no filter at all, which means "reuse the stored one".
pub fn filter_map(params: &serde_json::Value) -> Option<HashMap<String, String>> {
    let obj = params.get("filter")?.as_object()?;
    let mut map = HashMap::new();
    for (k, v) in obj {
        let s = match v {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        map.insert(k.clone(), s);
    }
    Some(map)
}

pub fn row_exists(conn: &Connection, table: &str, id: i64) -> Result<bool, HandlerErr> {
    use rusqlite::OptionalExtension;
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    conn.query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()
        .map(|v| v.is_some())
        .map_err(HandlerErr::db_query)
}

/// UPDATE guarded by id and, when the caller supplies `expectedRowVersion`,
/// by the row version too. Zero rows affected means either the row vanished
/// (not_found) or it changed underneath the caller (conflict).
pub fn guarded_update(
    conn: &Connection,
    table: &str,
    set_clause: &str,
    mut params: Vec<rusqlite::types::Value>,
    id: i64,
    expected_row_version: Option<i64>,
) -> Result<(), HandlerErr> {
    let mut sql = format!(
        "UPDATE {} SET {}, row_version = row_version + 1 WHERE id = ?",
        table, set_clause
    );
    params.push(rusqlite::types::Value::Integer(id));
    if let Some(rv) = expected_row_version {
        sql.push_str(" AND row_version = ?");
        params.push(rusqlite::types::Value::Integer(rv));
    }

    let changed = conn
        .execute(&sql, rusqlite::params_from_iter(params))
        .map_err(HandlerErr::db_update)?;
    if changed > 0 {
        return Ok(());
    }
    if row_exists(conn, table, id)? {
        Err(HandlerErr::conflict("row was modified concurrently"))
    } else {
        Err(HandlerErr::not_found("row no longer exists"))
    }
}

pub fn expected_row_version(params: &serde_json::Value) -> Option<i64> {
    params.get("expectedRowVersion").and_then(|v| v.as_i64())
}

/// Confirmed delete. A missing row answers not_found; rows still referenced
/// by children are refused by the FK constraints.
pub fn guarded_delete(conn: &Connection, table: &str, id: i64) -> Result<(), HandlerErr> {
    if !row_exists(conn, table, id)? {
        return Err(HandlerErr::not_found("row not found"));
    }
    let sql = format!("DELETE FROM {} WHERE id = ?", table);
    match conn.execute(&sql, [id]) {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(HandlerErr {
                code: "constraint_violation",
                message: "row is referenced by other records".to_string(),
                details: Some(serde_json::json!({ "table": table })),
            })
        }
        Err(e) => Err(HandlerErr {
            code: "db_delete_failed",
            message: e.to_string(),
            details: None,
        }),
    }
}

/// DISTINCT related-entity names for the filter drop-downs on list screens.
pub fn distinct_names(conn: &Connection, table: &str, column: &str) -> Result<Vec<String>, HandlerErr> {
    let sql = format!(
        "SELECT DISTINCT {} FROM {} ORDER BY {}",
        column, table, column
    );
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db_query)?;
    stmt.query_map([], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)
}
