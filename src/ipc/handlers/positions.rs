use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};

use crate::filters::PositionFilter;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    body, expected_row_version, filter_map, guarded_delete, guarded_update, page_param, path_id,
    require_db, sort_param, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::ipc::validate::{self, FieldErrors};
use crate::query::{offset, page_info, WhereBuilder};

#[derive(Clone, Copy, PartialEq)]
enum Sort {
    No,
    NameAsc,
    NameDesc,
}

impl Sort {
    fn parse(s: &str) -> Self {
        match s {
            "positionNameAsc" => Self::NameAsc,
            "positionNameDesc" => Self::NameDesc,
            _ => Self::No,
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::No => "",
            Self::NameAsc => " ORDER BY p.name ASC",
            Self::NameDesc => " ORDER BY p.name DESC",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::NameAsc => "positionNameAsc",
            Self::NameDesc => "positionNameDesc",
        }
    }

    fn view(self) -> Value {
        let name_next = if self == Self::NameAsc {
            Self::NameDesc
        } else {
            Self::NameAsc
        };
        json!({
            "current": self.as_str(),
            "positionNameSort": name_next.as_str(),
        })
    }
}

fn row_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "name": r.get::<_, String>(1)?,
        "description": r.get::<_, String>(2)?,
        "salary": r.get::<_, i64>(3)?,
        "rowVersion": r.get::<_, i64>(4)?,
    }))
}

fn list(
    conn: &Connection,
    filter: &PositionFilter,
    sort: Sort,
    page: i64,
    page_size: i64,
) -> Result<Value, HandlerErr> {
    let mut w = WhereBuilder::new();
    w.contains("p.name", &filter.name);

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM positions p{}", w.clause()),
            params_from_iter(w.params()),
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    let info = page_info(total, page, page_size);

    let sql = format!(
        "SELECT p.id, p.name, p.description, p.salary, p.row_version
         FROM positions p{}{} LIMIT ? OFFSET ?",
        w.clause(),
        sort.order_by()
    );
    let mut params = w.params();
    params.push(SqlValue::Integer(info.page_size));
    params.push(SqlValue::Integer(offset(&info)));

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map(params_from_iter(params), row_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    Ok(json!({
        "positions": rows,
        "page": info.to_json(),
        "sort": sort.view(),
    }))
}

fn get_one(conn: &Connection, id: i64) -> Result<Value, HandlerErr> {
    conn.query_row(
        "SELECT id, name, description, salary, row_version FROM positions WHERE id = ?",
        [id],
        row_json,
    )
    .optional()
    .map_err(HandlerErr::db_query)?
    .map(|p| json!({ "position": p }))
    .ok_or_else(|| HandlerErr::not_found("position not found"))
}

fn validated(body: &Value) -> Result<(String, String, i64), HandlerErr> {
    let mut errors = FieldErrors::default();
    let name = validate::req_text(body, "name", &mut errors);
    let description = validate::req_text(body, "description", &mut errors);
    let salary = validate::req_i64_min(body, "salary", 0, &mut errors);
    if !errors.is_empty() {
        return Err(HandlerErr::validation(errors.into_details()));
    }
    Ok((name, description, salary))
}

fn create(conn: &Connection, body: &Value) -> Result<Value, HandlerErr> {
    let (name, description, salary) = validated(body)?;
    conn.execute(
        "INSERT INTO positions(name, description, salary) VALUES(?, ?, ?)",
        (&name, &description, salary),
    )
    .map_err(HandlerErr::db_insert)?;
    Ok(json!({ "id": conn.last_insert_rowid() }))
}

fn update(
    conn: &Connection,
    id: i64,
    body: &Value,
    expected: Option<i64>,
) -> Result<Value, HandlerErr> {
    if body.get("id").and_then(|v| v.as_i64()) != Some(id) {
        return Err(HandlerErr::not_found("id mismatch"));
    }
    let (name, description, salary) = validated(body)?;
    guarded_update(
        conn,
        "positions",
        "name = ?, description = ?, salary = ?",
        vec![
            SqlValue::Text(name),
            SqlValue::Text(description),
            SqlValue::Integer(salary),
        ],
        id,
        expected,
    )?;
    Ok(json!({ "id": id }))
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    let AppState {
        db,
        filters,
        config,
        ..
    } = state;
    let Some(conn) = db.as_ref() else {
        return HandlerErr::no_workspace().response(&req.id);
    };
    let raw = match filter_map(&req.params) {
        Some(m) => {
            filters.save("Position", m.clone());
            m
        }
        None => filters.get("Position").cloned().unwrap_or_default(),
    };
    let filter = PositionFilter::from_string_map(&raw);
    let sort = Sort::parse(sort_param(&req.params));
    let page = page_param(&req.params);

    match list(conn, &filter, sort, page, config.page_size) {
        Ok(mut result) => {
            result["filter"] = json!(raw);
            ok(&req.id, result)
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    path_id(&req.params)
        .and_then(|id| get_one(conn, id))
        .map(|v| ok(&req.id, v))
        .unwrap_or_else(|e| e.response(&req.id))
}

fn handle_create(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    body(&req.params, "position")
        .and_then(|b| create(conn, &b))
        .map(|v| ok(&req.id, v))
        .unwrap_or_else(|e| e.response(&req.id))
}

fn handle_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let expected = expected_row_version(&req.params);
    path_id(&req.params)
        .and_then(|id| body(&req.params, "position").and_then(|b| update(conn, id, &b, expected)))
        .map(|v| ok(&req.id, v))
        .unwrap_or_else(|e| e.response(&req.id))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    path_id(&req.params)
        .and_then(|id| guarded_delete(conn, "positions", id))
        .map(|_| ok(&req.id, json!({ "deleted": true })))
        .unwrap_or_else(|e| e.response(&req.id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "positions.list" => Some(handle_list(state, req)),
        "positions.get" => Some(handle_get(state, req)),
        "positions.create" => Some(handle_create(state, req)),
        "positions.update" => Some(handle_update(state, req)),
        "positions.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
