use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};

use crate::filters::ClassFilter;
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
    NameAsc,
    NameDesc,
    YearAsc,
    YearDesc,
    StudentCountAsc,
    StudentCountDesc,
    ClassTypeAsc,
    ClassTypeDesc,
}

impl Sort {
    fn parse(s: &str) -> Self {
        match s {
            "classNameAsc" => Self::NameAsc,
            "classNameDesc" => Self::NameDesc,
            "yearCreatedAsc" => Self::YearAsc,
            "yearCreatedDesc" => Self::YearDesc,
            "studentCountAsc" => Self::StudentCountAsc,
            "studentCountDesc" => Self::StudentCountDesc,
            "classTypeAsc" => Self::ClassTypeAsc,
            "classTypeDesc" => Self::ClassTypeDesc,
            _ => Self::No,
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::No => "",
            Self::NameAsc => " ORDER BY c.name ASC",
            Self::NameDesc => " ORDER BY c.name DESC",
            Self::YearAsc => " ORDER BY c.year_created ASC",
            Self::YearDesc => " ORDER BY c.year_created DESC",
            Self::StudentCountAsc => " ORDER BY c.student_count ASC",
            Self::StudentCountDesc => " ORDER BY c.student_count DESC",
            Self::ClassTypeAsc => " ORDER BY ct.name ASC",
            Self::ClassTypeDesc => " ORDER BY ct.name DESC",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::NameAsc => "classNameAsc",
            Self::NameDesc => "classNameDesc",
            Self::YearAsc => "yearCreatedAsc",
            Self::YearDesc => "yearCreatedDesc",
            Self::StudentCountAsc => "studentCountAsc",
            Self::StudentCountDesc => "studentCountDesc",
            Self::ClassTypeAsc => "classTypeAsc",
            Self::ClassTypeDesc => "classTypeDesc",
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
            "classNameSort": self.toggle(Self::NameAsc, Self::NameDesc),
            "yearCreatedSort": self.toggle(Self::YearAsc, Self::YearDesc),
            "studentCountSort": self.toggle(Self::StudentCountAsc, Self::StudentCountDesc),
            "classTypeSort": self.toggle(Self::ClassTypeAsc, Self::ClassTypeDesc),
        })
    }
}

fn row_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "name": r.get::<_, String>(1)?,
        "classTeacher": r.get::<_, String>(2)?,
        "classTypeId": r.get::<_, i64>(3)?,
        "studentCount": r.get::<_, i64>(4)?,
        "yearCreated": r.get::<_, i64>(5)?,
        "rowVersion": r.get::<_, i64>(6)?,
        "classTypeName": r.get::<_, String>(7)?,
    }))
}

const JOIN: &str = "FROM classes c JOIN class_types ct ON ct.id = c.class_type_id";

fn list(
    conn: &Connection,
    filter: &ClassFilter,
    sort: Sort,
    page: i64,
    page_size: i64,
) -> Result<Value, HandlerErr> {
    let mut w = WhereBuilder::new();
    w.contains("c.name", &filter.class_name);
    w.equals_i64("c.year_created", &filter.year_created);
    w.equals_i64("c.student_count", &filter.student_count);
    w.contains("ct.name", &filter.class_type_name);

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) {}{}", JOIN, w.clause()),
            params_from_iter(w.params()),
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    let info = page_info(total, page, page_size);

    let sql = format!(
        "SELECT c.id, c.name, c.class_teacher, c.class_type_id, c.student_count,
                c.year_created, c.row_version, ct.name
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
        "classes": rows,
        "page": info.to_json(),
        "sort": sort.view(),
        "classTypeNames": distinct_names(conn, "class_types", "name")?,
    }))
}

fn get_one(conn: &Connection, id: i64) -> Result<Value, HandlerErr> {
    conn.query_row(
        &format!(
            "SELECT c.id, c.name, c.class_teacher, c.class_type_id, c.student_count,
                    c.year_created, c.row_version, ct.name, ct.description
             {} WHERE c.id = ?",
            JOIN
        ),
        [id],
        |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "name": r.get::<_, String>(1)?,
                "classTeacher": r.get::<_, String>(2)?,
                "classTypeId": r.get::<_, i64>(3)?,
                "studentCount": r.get::<_, i64>(4)?,
                "yearCreated": r.get::<_, i64>(5)?,
                "rowVersion": r.get::<_, i64>(6)?,
                "classType": {
                    "id": r.get::<_, i64>(3)?,
                    "name": r.get::<_, String>(7)?,
                    "description": r.get::<_, String>(8)?,
                },
            }))
        },
    )
    .optional()
    .map_err(HandlerErr::db_query)?
    .map(|c| json!({ "class": c }))
    .ok_or_else(|| HandlerErr::not_found("class not found"))
}

struct Candidate {
    name: String,
    class_teacher: String,
    class_type_id: i64,
    student_count: i64,
    year_created: i64,
}

fn validated(conn: &Connection, body: &Value) -> Result<Candidate, HandlerErr> {
    let mut errors = FieldErrors::default();
    let name = validate::req_text(body, "name", &mut errors);
    let class_teacher = validate::req_text(body, "classTeacher", &mut errors);
    let class_type_id = validate::req_fk(conn, body, "classTypeId", "class_types", &mut errors)?;
    let student_count = validate::req_i64_min(body, "studentCount", 0, &mut errors);
    let year_created = validate::req_i64_min(body, "yearCreated", 1990, &mut errors);
    if !errors.is_empty() {
        return Err(HandlerErr::validation(errors.into_details()));
    }
    Ok(Candidate {
        name,
        class_teacher,
        class_type_id,
        student_count,
        year_created,
    })
}

fn create(conn: &Connection, body: &Value) -> Result<Value, HandlerErr> {
    let c = validated(conn, body)?;
    conn.execute(
        "INSERT INTO classes(name, class_teacher, class_type_id, student_count, year_created)
         VALUES(?, ?, ?, ?, ?)",
        (
            &c.name,
            &c.class_teacher,
            c.class_type_id,
            c.student_count,
            c.year_created,
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
        "classes",
        "name = ?, class_teacher = ?, class_type_id = ?, student_count = ?, year_created = ?",
        vec![
            SqlValue::Text(c.name),
            SqlValue::Text(c.class_teacher),
            SqlValue::Integer(c.class_type_id),
            SqlValue::Integer(c.student_count),
            SqlValue::Integer(c.year_created),
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
    // The store only remembers filters that actually ran against a workspace.
    let Some(conn) = db.as_ref() else {
        return HandlerErr::no_workspace().response(&req.id);
    };
    let raw = match filter_map(&req.params) {
        Some(m) => {
            filters.save("Class", m.clone());
            m
        }
        None => filters.get("Class").cloned().unwrap_or_default(),
    };
    let filter = ClassFilter::from_string_map(&raw);
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
    body(&req.params, "class")
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
        .and_then(|id| body(&req.params, "class").and_then(|b| update(conn, id, &b, expected)))
        .map(|v| ok(&req.id, v))
        .unwrap_or_else(|e| e.response(&req.id))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    path_id(&req.params)
        .and_then(|id| guarded_delete(conn, "classes", id))
        .map(|_| ok(&req.id, json!({ "deleted": true })))
        .unwrap_or_else(|e| e.response(&req.id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_list(state, req)),
        "classes.get" => Some(handle_get(state, req)),
        "classes.create" => Some(handle_create(state, req)),
        "classes.update" => Some(handle_update(state, req)),
        "classes.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
