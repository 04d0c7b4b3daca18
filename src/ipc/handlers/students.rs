use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};

use crate::filters::StudentFilter;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    body, distinct_names, expected_row_version, filter_map, guarded_delete, guarded_update,
    page_param, path_id, require_db, sort_param, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::ipc::validate::{self, FieldErrors};
use crate::query::{offset, page_info, WhereBuilder};

// Students relate to subjects only through their class's schedules. The
// filter below selects students whose class teaches a matching subject at
// least once; the sort picks whichever related schedule SQLite finds first,
// which is not a total order. Both match the behavior of the screens this
// daemon serves.
const SUBJECT_FILTER: &str = "EXISTS (
            SELECT 1 FROM schedules sch
            JOIN subjects sub ON sub.id = sch.subject_id
            WHERE sch.class_id = st.class_id AND instr(sub.name, ?) > 0)";

const SUBJECT_SORT_KEY: &str = "(SELECT sub.name FROM schedules sch
            JOIN subjects sub ON sub.id = sch.subject_id
            WHERE sch.class_id = st.class_id LIMIT 1)";

#[derive(Clone, Copy, PartialEq)]
enum Sort {
    No,
    ClassNameAsc,
    ClassNameDesc,
    DateOfBirthAsc,
    DateOfBirthDesc,
    SubjectNameAsc,
    SubjectNameDesc,
}

impl Sort {
    fn parse(s: &str) -> Self {
        match s {
            "classNameAsc" => Self::ClassNameAsc,
            "classNameDesc" => Self::ClassNameDesc,
            "dateOfBirthAsc" => Self::DateOfBirthAsc,
            "dateOfBirthDesc" => Self::DateOfBirthDesc,
            "subjectNameAsc" => Self::SubjectNameAsc,
            "subjectNameDesc" => Self::SubjectNameDesc,
            _ => Self::No,
        }
    }

    fn order_by(self) -> String {
        match self {
            Self::No => String::new(),
            Self::ClassNameAsc => " ORDER BY c.name ASC".to_string(),
            Self::ClassNameDesc => " ORDER BY c.name DESC".to_string(),
            Self::DateOfBirthAsc => " ORDER BY st.date_of_birth ASC".to_string(),
            Self::DateOfBirthDesc => " ORDER BY st.date_of_birth DESC".to_string(),
            Self::SubjectNameAsc => format!(" ORDER BY {} ASC", SUBJECT_SORT_KEY),
            Self::SubjectNameDesc => format!(" ORDER BY {} DESC", SUBJECT_SORT_KEY),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::ClassNameAsc => "classNameAsc",
            Self::ClassNameDesc => "classNameDesc",
            Self::DateOfBirthAsc => "dateOfBirthAsc",
            Self::DateOfBirthDesc => "dateOfBirthDesc",
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
            "dateOfBirthSort": self.toggle(Self::DateOfBirthAsc, Self::DateOfBirthDesc),
            "subjectNameSort": self.toggle(Self::SubjectNameAsc, Self::SubjectNameDesc),
        })
    }
}

fn row_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "firstName": r.get::<_, String>(1)?,
        "lastName": r.get::<_, String>(2)?,
        "middleName": r.get::<_, String>(3)?,
        "dateOfBirth": r.get::<_, String>(4)?,
        "gender": r.get::<_, String>(5)?,
        "address": r.get::<_, String>(6)?,
        "fatherFirstName": r.get::<_, String>(7)?,
        "fatherLastName": r.get::<_, String>(8)?,
        "fatherMiddleName": r.get::<_, String>(9)?,
        "motherFirstName": r.get::<_, String>(10)?,
        "motherLastName": r.get::<_, String>(11)?,
        "motherMiddleName": r.get::<_, String>(12)?,
        "classId": r.get::<_, Option<i64>>(13)?,
        "additionalInfo": r.get::<_, Option<String>>(14)?,
        "rowVersion": r.get::<_, i64>(15)?,
        "className": r.get::<_, Option<String>>(16)?,
    }))
}

const COLUMNS: &str = "st.id, st.first_name, st.last_name, st.middle_name, st.date_of_birth,
                st.gender, st.address, st.father_first_name, st.father_last_name,
                st.father_middle_name, st.mother_first_name, st.mother_last_name,
                st.mother_middle_name, st.class_id, st.additional_info, st.row_version,
                c.name";

const JOIN: &str = "FROM students st LEFT JOIN classes c ON c.id = st.class_id";

fn list(
    conn: &Connection,
    filter: &StudentFilter,
    sort: Sort,
    page: i64,
    page_size: i64,
) -> Result<Value, HandlerErr> {
    let mut w = WhereBuilder::new();
    w.contains("c.name", &filter.class_name);
    w.raw_text(SUBJECT_FILTER, &filter.subject_name);
    w.equals_text(
        "st.date_of_birth",
        &filter.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()),
    );

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) {}{}", JOIN, w.clause()),
            params_from_iter(w.params()),
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    let info = page_info(total, page, page_size);

    let sql = format!(
        "SELECT {} {}{}{} LIMIT ? OFFSET ?",
        COLUMNS,
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
        "students": rows,
        "page": info.to_json(),
        "sort": sort.view(),
        "classNames": distinct_names(conn, "classes", "name")?,
        "subjectNames": distinct_names(conn, "subjects", "name")?,
    }))
}

fn get_one(conn: &Connection, id: i64) -> Result<Value, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} {} WHERE st.id = ?", COLUMNS, JOIN),
        [id],
        row_json,
    )
    .optional()
    .map_err(HandlerErr::db_query)?
    .map(|s| json!({ "student": s }))
    .ok_or_else(|| HandlerErr::not_found("student not found"))
}

struct Candidate {
    first_name: String,
    last_name: String,
    middle_name: String,
    date_of_birth: String,
    gender: String,
    address: String,
    father_first_name: String,
    father_last_name: String,
    father_middle_name: String,
    mother_first_name: String,
    mother_last_name: String,
    mother_middle_name: String,
    class_id: Option<i64>,
    additional_info: Option<String>,
}

fn validated(conn: &Connection, body: &Value) -> Result<Candidate, HandlerErr> {
    let mut errors = FieldErrors::default();
    let first_name = validate::req_text(body, "firstName", &mut errors);
    let last_name = validate::req_text(body, "lastName", &mut errors);
    let middle_name = validate::req_text(body, "middleName", &mut errors);
    let date_of_birth = validate::req_date(body, "dateOfBirth", &mut errors);
    let gender = validate::req_text(body, "gender", &mut errors);
    if !gender.is_empty() && gender != "Мужской" && gender != "Женский" {
        errors.add("gender", "must be 'Мужской' or 'Женский'");
    }
    let address = validate::req_text(body, "address", &mut errors);
    let father_first_name = validate::req_text(body, "fatherFirstName", &mut errors);
    let father_last_name = validate::req_text(body, "fatherLastName", &mut errors);
    let father_middle_name = validate::req_text(body, "fatherMiddleName", &mut errors);
    let mother_first_name = validate::req_text(body, "motherFirstName", &mut errors);
    let mother_last_name = validate::req_text(body, "motherLastName", &mut errors);
    let mother_middle_name = validate::req_text(body, "motherMiddleName", &mut errors);
    let class_id = validate::opt_fk(conn, body, "classId", "classes", &mut errors)?;
    let additional_info = validate::opt_text(body, "additionalInfo");
    if !errors.is_empty() {
        return Err(HandlerErr::validation(errors.into_details()));
    }
    Ok(Candidate {
        first_name,
        last_name,
        middle_name,
        date_of_birth,
        gender,
        address,
        father_first_name,
        father_last_name,
        father_middle_name,
        mother_first_name,
        mother_last_name,
        mother_middle_name,
        class_id,
        additional_info,
    })
}

fn create(conn: &Connection, body: &Value) -> Result<Value, HandlerErr> {
    let c = validated(conn, body)?;
    conn.execute(
        "INSERT INTO students(first_name, last_name, middle_name, date_of_birth, gender,
                              address, father_first_name, father_last_name, father_middle_name,
                              mother_first_name, mother_last_name, mother_middle_name,
                              class_id, additional_info)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &c.first_name,
            &c.last_name,
            &c.middle_name,
            &c.date_of_birth,
            &c.gender,
            &c.address,
            &c.father_first_name,
            &c.father_last_name,
            &c.father_middle_name,
            &c.mother_first_name,
            &c.mother_last_name,
            &c.mother_middle_name,
            c.class_id,
            &c.additional_info,
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
        "students",
        "first_name = ?, last_name = ?, middle_name = ?, date_of_birth = ?, gender = ?,
         address = ?, father_first_name = ?, father_last_name = ?, father_middle_name = ?,
         mother_first_name = ?, mother_last_name = ?, mother_middle_name = ?,
         class_id = ?, additional_info = ?",
        vec![
            SqlValue::Text(c.first_name),
            SqlValue::Text(c.last_name),
            SqlValue::Text(c.middle_name),
            SqlValue::Text(c.date_of_birth),
            SqlValue::Text(c.gender),
            SqlValue::Text(c.address),
            SqlValue::Text(c.father_first_name),
            SqlValue::Text(c.father_last_name),
            SqlValue::Text(c.father_middle_name),
            SqlValue::Text(c.mother_first_name),
            SqlValue::Text(c.mother_last_name),
            SqlValue::Text(c.mother_middle_name),
            c.class_id.map(SqlValue::Integer).unwrap_or(SqlValue::Null),
            c.additional_info
                .map(SqlValue::Text)
                .unwrap_or(SqlValue::Null),
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
            filters.save("Student", m.clone());
            m
        }
        None => filters.get("Student").cloned().unwrap_or_default(),
    };
    let filter = StudentFilter::from_string_map(&raw);
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
    body(&req.params, "student")
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
        .and_then(|id| body(&req.params, "student").and_then(|b| update(conn, id, &b, expected)))
        .map(|v| ok(&req.id, v))
        .unwrap_or_else(|e| e.response(&req.id))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    path_id(&req.params)
        .and_then(|id| guarded_delete(conn, "students", id))
        .map(|_| ok(&req.id, json!({ "deleted": true })))
        .unwrap_or_else(|e| e.response(&req.id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_list(state, req)),
        "students.get" => Some(handle_get(state, req)),
        "students.create" => Some(handle_create(state, req)),
        "students.update" => Some(handle_update(state, req)),
        "students.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
