use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};

use crate::filters::ScheduleFilter;
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
    ClassNameAsc,
    ClassNameDesc,
    SubjectNameAsc,
    SubjectNameDesc,
}

impl Sort {
    fn parse(s: &str) -> Self {
        match s {
            "classNameAsc" => Self::ClassNameAsc,
            "classNameDesc" => Self::ClassNameDesc,
            "subjectNameAsc" => Self::SubjectNameAsc,
            "subjectNameDesc" => Self::SubjectNameDesc,
            _ => Self::No,
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::No => "",
            Self::ClassNameAsc => " ORDER BY c.name ASC",
            Self::ClassNameDesc => " ORDER BY c.name DESC",
            Self::SubjectNameAsc => " ORDER BY s.name ASC",
            Self::SubjectNameDesc => " ORDER BY s.name DESC",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::ClassNameAsc => "classNameAsc",
            Self::ClassNameDesc => "classNameDesc",
            Self::SubjectNameAsc => "subjectNameAsc",
            Self::SubjectNameDesc => "subjectNameDesc",
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
            "classNameSort": self.toggle(Self::ClassNameAsc, Self::ClassNameDesc),
            "subjectNameSort": self.toggle(Self::SubjectNameAsc, Self::SubjectNameDesc),
        })
    }
}

fn row_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "date": r.get::<_, String>(1)?,
        "dayOfWeek": r.get::<_, String>(2)?,
        "classId": r.get::<_, i64>(3)?,
        "subjectId": r.get::<_, i64>(4)?,
        "startTime": r.get::<_, String>(5)?,
        "endTime": r.get::<_, String>(6)?,
        "rowVersion": r.get::<_, i64>(7)?,
        "className": r.get::<_, String>(8)?,
        "subjectName": r.get::<_, String>(9)?,
    }))
}

const JOIN: &str = "FROM schedules sc
         JOIN classes c ON c.id = sc.class_id
         JOIN subjects s ON s.id = sc.subject_id";

fn list(
    conn: &Connection,
    filter: &ScheduleFilter,
    sort: Sort,
    page: i64,
    page_size: i64,
) -> Result<Value, HandlerErr> {
    let mut w = WhereBuilder::new();
    w.contains("c.name", &filter.class_name);
    w.contains("s.name", &filter.subject_name);

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) {}{}", JOIN, w.clause()),
            params_from_iter(w.params()),
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    let info = page_info(total, page, page_size);

    let sql = format!(
        "SELECT sc.id, sc.date, sc.day_of_week, sc.class_id, sc.subject_id,
                sc.start_time, sc.end_time, sc.row_version, c.name, s.name
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
        "schedules": rows,
        "page": info.to_json(),
        "sort": sort.view(),
        "classNames": distinct_names(conn, "classes", "name")?,
        "subjectNames": distinct_names(conn, "subjects", "name")?,
    }))
}

fn get_one(conn: &Connection, id: i64) -> Result<Value, HandlerErr> {
    conn.query_row(
        &format!(
            "SELECT sc.id, sc.date, sc.day_of_week, sc.class_id, sc.subject_id,
                    sc.start_time, sc.end_time, sc.row_version, c.name, s.name
             {} WHERE sc.id = ?",
            JOIN
        ),
        [id],
        |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "date": r.get::<_, String>(1)?,
                "dayOfWeek": r.get::<_, String>(2)?,
                "classId": r.get::<_, i64>(3)?,
                "subjectId": r.get::<_, i64>(4)?,
                "startTime": r.get::<_, String>(5)?,
                "endTime": r.get::<_, String>(6)?,
                "rowVersion": r.get::<_, i64>(7)?,
                "class": { "id": r.get::<_, i64>(3)?, "name": r.get::<_, String>(8)? },
                "subject": { "id": r.get::<_, i64>(4)?, "name": r.get::<_, String>(9)? },
            }))
        },
    )
    .optional()
    .map_err(HandlerErr::db_query)?
    .map(|s| json!({ "schedule": s }))
    .ok_or_else(|| HandlerErr::not_found("schedule not found"))
}

struct Candidate {
    date: String,
    day_of_week: String,
    class_id: i64,
    subject_id: i64,
    start_time: String,
    end_time: String,
}

fn validated(conn: &Connection, body: &Value) -> Result<Candidate, HandlerErr> {
    let mut errors = FieldErrors::default();
    let date = validate::req_date(body, "date", &mut errors);
    let day_of_week = validate::req_text(body, "dayOfWeek", &mut errors);
    let class_id = validate::req_fk(conn, body, "classId", "classes", &mut errors)?;
    let subject_id = validate::req_fk(conn, body, "subjectId", "subjects", &mut errors)?;
    let start_time = validate::req_time(body, "startTime", &mut errors);
    let end_time = validate::req_time(body, "endTime", &mut errors);
    if !errors.is_empty() {
        return Err(HandlerErr::validation(errors.into_details()));
    }
    Ok(Candidate {
        date,
        day_of_week,
        class_id,
        subject_id,
        start_time,
        end_time,
    })
}

fn create(conn: &Connection, body: &Value) -> Result<Value, HandlerErr> {
    let c = validated(conn, body)?;
    conn.execute(
        "INSERT INTO schedules(date, day_of_week, class_id, subject_id, start_time, end_time)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &c.date,
            &c.day_of_week,
            c.class_id,
            c.subject_id,
            &c.start_time,
            &c.end_time,
        ),
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
        "schedules",
        "date = ?, day_of_week = ?, class_id = ?, subject_id = ?, start_time = ?, end_time = ?",
        vec![
            SqlValue::Text(c.date),
            SqlValue::Text(c.day_of_week),
            SqlValue::Integer(c.class_id),
            SqlValue::Integer(c.subject_id),
            SqlValue::Text(c.start_time),
            SqlValue::Text(c.end_time),
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
            filters.save("Schedule", m.clone());
            m
        }
        None => filters.get("Schedule").cloned().unwrap_or_default(),
    };
    let filter = ScheduleFilter::from_string_map(&raw);
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
    body(&req.params, "schedule")
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
        .and_then(|id| body(&req.params, "schedule").and_then(|b| update(conn, id, &b, expected)))
        .map(|v| ok(&req.id, v))
        .unwrap_or_else(|e| e.response(&req.id))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    path_id(&req.params)
        .and_then(|id| guarded_delete(conn, "schedules", id))
        .map(|_| ok(&req.id, json!({ "deleted": true })))
        .unwrap_or_else(|e| e.response(&req.id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "schedules.list" => Some(handle_list(state, req)),
        "schedules.get" => Some(handle_get(state, req)),
        "schedules.create" => Some(handle_create(state, req)),
        "schedules.update" => Some(handle_update(state, req)),
        "schedules.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
