use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};

use crate::filters::EmployeeFilter;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    body, distinct_names, expected_row_version, filter_map, guarded_delete, guarded_update,
    page_param, path_id, require_db, sort_param, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::ipc::validate::{self, FieldErrors};
use crate::query::{offset, page_info, WhereBuilder};

#[derive(Clone, Copy, PartialEq)]
enum Sort {
    No,
    FirstNameAsc,
    FirstNameDesc,
    LastNameAsc,
    LastNameDesc,
    PositionNameAsc,
    PositionNameDesc,
}

impl Sort {
    fn parse(s: &str) -> Self {
        match s {
            "firstNameAsc" => Self::FirstNameAsc,
            "firstNameDesc" => Self::FirstNameDesc,
            "lastNameAsc" => Self::LastNameAsc,
            "lastNameDesc" => Self::LastNameDesc,
            "positionNameAsc" => Self::PositionNameAsc,
            "positionNameDesc" => Self::PositionNameDesc,
            _ => Self::No,
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::No => "",
            Self::FirstNameAsc => " ORDER BY e.first_name ASC",
            Self::FirstNameDesc => " ORDER BY e.first_name DESC",
            Self::LastNameAsc => " ORDER BY e.last_name ASC",
            Self::LastNameDesc => " ORDER BY e.last_name DESC",
            Self::PositionNameAsc => " ORDER BY p.name ASC",
            Self::PositionNameDesc => " ORDER BY p.name DESC",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::FirstNameAsc => "firstNameAsc",
            Self::FirstNameDesc => "firstNameDesc",
            Self::LastNameAsc => "lastNameAsc",
            Self::LastNameDesc => "lastNameDesc",
            Self::PositionNameAsc => "positionNameAsc",
            Self::PositionNameDesc => "positionNameDesc",
        }
    }

    fn toggle(self, asc: Self, desc: Self) -> &'static str {
        if self == asc {
            desc.as_str()
        } else {
            asc.as_str()
        }
    }

    fn view(self) -> Value {
        json!({
            "current": self.as_str(),
            "firstNameSort": self.toggle(Self::FirstNameAsc, Self::FirstNameDesc),
            "lastNameSort": self.toggle(Self::LastNameAsc, Self::LastNameDesc),
            "positionNameSort": self.toggle(Self::PositionNameAsc, Self::PositionNameDesc),
        })
    }
}

fn row_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "firstName": r.get::<_, String>(1)?,
        "lastName": r.get::<_, String>(2)?,
        "middleName": r.get::<_, String>(3)?,
        "positionId": r.get::<_, i64>(4)?,
        "rowVersion": r.get::<_, i64>(5)?,
        "positionName": r.get::<_, String>(6)?,
    }))
}

const JOIN: &str = "FROM employees e JOIN positions p ON p.id = e.position_id";

fn list(
    conn: &Connection,
    filter: &EmployeeFilter,
    sort: Sort,
    page: i64,
    page_size: i64,
) -> Result<Value, HandlerErr> {
    let mut w = WhereBuilder::new();
    w.contains("e.first_name", &filter.first_name);
    w.contains("e.last_name", &filter.last_name);
    w.contains("e.middle_name", &filter.middle_name);
    w.contains("p.name", &filter.position_name);

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) {}{}", JOIN, w.clause()),
            params_from_iter(w.params()),
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    let info = page_info(total, page, page_size);

    let sql = format!(
        "SELECT e.id, e.first_name, e.last_name, e.middle_name, e.position_id,
                e.row_version, p.name
         {}{}{} LIMIT ? OFFSET ?",
        JOIN,
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
        "employees": rows,
        "page": info.to_json(),
        "sort": sort.view(),
        "positionNames": distinct_names(conn, "positions", "name")?,
    }))
}

fn get_one(conn: &Connection, id: i64) -> Result<Value, HandlerErr> {
    conn.query_row(
        &format!(
            "SELECT e.id, e.first_name, e.last_name, e.middle_name, e.position_id,
                    e.row_version, p.name, p.description, p.salary
             {} WHERE e.id = ?",
            JOIN
        ),
        [id],
        |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "firstName": r.get::<_, String>(1)?,
                "lastName": r.get::<_, String>(2)?,
                "middleName": r.get::<_, String>(3)?,
                "positionId": r.get::<_, i64>(4)?,
                "rowVersion": r.get::<_, i64>(5)?,
                "position": {
                    "id": r.get::<_, i64>(4)?,
                    "name": r.get::<_, String>(6)?,
                    "description": r.get::<_, String>(7)?,
                    "salary": r.get::<_, i64>(8)?,
                },
            }))
        },
    )
    .optional()
    .map_err(HandlerErr::db_query)?
    .map(|e| json!({ "employee": e }))
    .ok_or_else(|| HandlerErr::not_found("employee not found"))
}

struct Candidate {
    first_name: String,
    last_name: String,
    middle_name: String,
    position_id: i64,
}

fn validated(conn: &Connection, body: &Value) -> Result<Candidate, HandlerErr> {
    let mut errors = FieldErrors::default();
    let first_name = validate::req_letters(body, "firstName", &mut errors);
    let last_name = validate::req_letters(body, "lastName", &mut errors);
    let middle_name = validate::req_letters(body, "middleName", &mut errors);
    let position_id = validate::req_fk(conn, body, "positionId", "positions", &mut errors)?;
    if !errors.is_empty() {
        return Err(HandlerErr::validation(errors.into_details()));
    }
    Ok(Candidate {
        first_name,
        last_name,
        middle_name,
        position_id,
    })
}

fn create(conn: &Connection, body: &Value) -> Result<Value, HandlerErr> {
    let c = validated(conn, body)?;
    conn.execute(
        "INSERT INTO employees(first_name, last_name, middle_name, position_id)
         VALUES(?, ?, ?, ?)",
        (&c.first_name, &c.last_name, &c.middle_name, c.position_id),
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
    let c = validated(conn, body)?;
    guarded_update(
        conn,
        "employees",
        "first_name = ?, last_name = ?, middle_name = ?, position_id = ?",
        vec![
            SqlValue::Text(c.first_name),
            SqlValue::Text(c.last_name),
            SqlValue::Text(c.middle_name),
            SqlValue::Integer(c.position_id),
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
            filters.save("Employee", m.clone());
            m
        }
        None => filters.get("Employee").cloned().unwrap_or_default(),
    };
    let filter = EmployeeFilter::from_string_map(&raw);
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
    body(&req.params, "employee")
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
        .and_then(|id| body(&req.params, "employee").and_then(|b| update(conn, id, &b, expected)))
        .map(|v| ok(&req.id, v))
        .unwrap_or_else(|e| e.response(&req.id))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    path_id(&req.params)
        .and_then(|id| guarded_delete(conn, "employees", id))
        .map(|_| ok(&req.id, json!({ "deleted": true })))
        .unwrap_or_else(|e| e.response(&req.id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "employees.list" => Some(handle_list(state, req)),
        "employees.get" => Some(handle_get(state, req)),
        "employees.create" => Some(handle_create(state, req)),
        "employees.update" => Some(handle_update(state, req)),
        "employees.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
