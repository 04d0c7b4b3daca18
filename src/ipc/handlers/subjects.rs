use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};

use crate::filters::SubjectFilter;
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
    SubjectNameAsc,
    SubjectNameDesc,
    EmployeeNameAsc,
    EmployeeNameDesc,
}

impl Sort {
    fn parse(s: &str) -> Self {
        match s {
            "subjectNameAsc" => Self::SubjectNameAsc,
            "subjectNameDesc" => Self::SubjectNameDesc,
            "employeeNameAsc" => Self::EmployeeNameAsc,
            "employeeNameDesc" => Self::EmployeeNameDesc,
            _ => Self::No,
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::No => "",
            Self::SubjectNameAsc => " ORDER BY s.name ASC",
            Self::SubjectNameDesc => " ORDER BY s.name DESC",
            Self::EmployeeNameAsc => " ORDER BY e.first_name ASC",
            Self::EmployeeNameDesc => " ORDER BY e.first_name DESC",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::SubjectNameAsc => "subjectNameAsc",
            Self::SubjectNameDesc => "subjectNameDesc",
            Self::EmployeeNameAsc => "employeeNameAsc",
            Self::EmployeeNameDesc => "employeeNameDesc",
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
            "subjectNameSort": self.toggle(Self::SubjectNameAsc, Self::SubjectNameDesc),
            "employeeNameSort": self.toggle(Self::EmployeeNameAsc, Self::EmployeeNameDesc),
        })
    }
}

fn row_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "name": r.get::<_, String>(1)?,
        "description": r.get::<_, Option<String>>(2)?,
        "employeeId": r.get::<_, i64>(3)?,
        "rowVersion": r.get::<_, i64>(4)?,
        "employeeFirstName": r.get::<_, String>(5)?,
    }))
}

const JOIN: &str = "FROM subjects s JOIN employees e ON e.id = s.employee_id";

fn list(
    conn: &Connection,
    filter: &SubjectFilter,
    sort: Sort,
    page: i64,
    page_size: i64,
) -> Result<Value, HandlerErr> {
    let mut w = WhereBuilder::new();
    w.contains("s.name", &filter.subject_name);
    w.contains("e.first_name", &filter.employee_name);

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) {}{}", JOIN, w.clause()),
            params_from_iter(w.params()),
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    let info = page_info(total, page, page_size);

    let sql = format!(
        "SELECT s.id, s.name, s.description, s.employee_id, s.row_version, e.first_name
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
        "subjects": rows,
        "page": info.to_json(),
        "sort": sort.view(),
        "employeeFirstNames": distinct_names(conn, "employees", "first_name")?,
    }))
}

fn get_one(conn: &Connection, id: i64) -> Result<Value, HandlerErr> {
    conn.query_row(
        &format!(
            "SELECT s.id, s.name, s.description, s.employee_id, s.row_version,
                    e.first_name, e.last_name, e.middle_name
             {} WHERE s.id = ?",
            JOIN
        ),
        [id],
        |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "name": r.get::<_, String>(1)?,
                "description": r.get::<_, Option<String>>(2)?,
                "employeeId": r.get::<_, i64>(3)?,
                "rowVersion": r.get::<_, i64>(4)?,
                "employee": {
                    "id": r.get::<_, i64>(3)?,
                    "firstName": r.get::<_, String>(5)?,
                    "lastName": r.get::<_, String>(6)?,
                    "middleName": r.get::<_, String>(7)?,
                },
            }))
        },
    )
    .optional()
    .map_err(HandlerErr::db_query)?
    .map(|s| json!({ "subject": s }))
    .ok_or_else(|| HandlerErr::not_found("subject not found"))
}

struct Candidate {
    name: String,
    description: Option<String>,
    employee_id: i64,
}

fn validated(conn: &Connection, body: &Value) -> Result<Candidate, HandlerErr> {
    let mut errors = FieldErrors::default();
    let name = validate::req_text(body, "name", &mut errors);
    let description = validate::opt_text(body, "description");
    let employee_id = validate::req_fk(conn, body, "employeeId", "employees", &mut errors)?;
    if !errors.is_empty() {
        return Err(HandlerErr::validation(errors.into_details()));
    }
    Ok(Candidate {
        name,
        description,
        employee_id,
    })
}

fn create(conn: &Connection, body: &Value) -> Result<Value, HandlerErr> {
    let c = validated(conn, body)?;
    conn.execute(
        "INSERT INTO subjects(name, description, employee_id) VALUES(?, ?, ?)",
        (&c.name, &c.description, c.employee_id),
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
        "subjects",
        "name = ?, description = ?, employee_id = ?",
        vec![
            SqlValue::Text(c.name),
            c.description.map(SqlValue::Text).unwrap_or(SqlValue::Null),
            SqlValue::Integer(c.employee_id),
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
            filters.save("Subject", m.clone());
            m
        }
        None => filters.get("Subject").cloned().unwrap_or_default(),
    };
    let filter = SubjectFilter::from_string_map(&raw);
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
    body(&req.params, "subject")
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
        .and_then(|id| body(&req.params, "subject").and_then(|b| update(conn, id, &b, expected)))
        .map(|v| ok(&req.id, v))
        .unwrap_or_else(|e| e.response(&req.id))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    path_id(&req.params)
        .and_then(|id| guarded_delete(conn, "subjects", id))
        .map(|_| ok(&req.id, json!({ "deleted": true })))
        .unwrap_or_else(|e| e.response(&req.id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_list(state, req)),
        "subjects.get" => Some(handle_get(state, req)),
        "subjects.create" => Some(handle_create(state, req)),
        "subjects.update" => Some(handle_update(state, req)),
        "subjects.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
