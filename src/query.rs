use rusqlite::types::Value;

/// Dynamic WHERE clause for list queries. Predicates are AND-ed; a filter
/// field that is None contributes nothing.
pub struct WhereBuilder {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl WhereBuilder {
    pub fn new() -> Self {
        Self {
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Substring containment on a text column. instr() is exact byte-level
    /// matching, so user input needs no LIKE-wildcard escaping.
    pub fn contains(&mut self, expr: &str, needle: &Option<String>) {
        if let Some(v) = needle {
            self.clauses.push(format!("instr({}, ?) > 0", expr));
            self.params.push(Value::Text(v.clone()));
        }
    }

    pub fn equals_i64(&mut self, expr: &str, value: &Option<i64>) {
        if let Some(v) = value {
            self.clauses.push(format!("{} = ?", expr));
            self.params.push(Value::Integer(*v));
        }
    }

    /// Hand-written predicate with a single text placeholder, for shapes the
    /// simple column helpers cannot express (EXISTS subqueries and the like).
    pub fn raw_text(&mut self, clause: &str, value: &Option<String>) {
        if let Some(v) = value {
            self.clauses.push(clause.to_string());
            self.params.push(Value::Text(v.clone()));
        }
    }

    pub fn equals_text(&mut self, expr: &str, value: &Option<String>) {
        if let Some(v) = value {
            self.clauses.push(format!("{} = ?", expr));
            self.params.push(Value::Text(v.clone()));
        }
    }

    /// " WHERE ..." or "" when no predicate is active.
    pub fn clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> Vec<Value> {
        self.params.clone()
    }
}

/// Page metadata returned alongside every list page.
#[derive(Debug, PartialEq, Eq)]
pub struct PageInfo {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// Clamp the requested 1-based page and compute the window. The count is
/// taken over the filtered set before paging.
pub fn page_info(total: i64, requested_page: i64, page_size: i64) -> PageInfo {
    let page = requested_page.max(1);
    let total_pages = if total == 0 {
        0
    } else {
        (total + page_size - 1) / page_size
    };
    PageInfo {
        total,
        page,
        page_size,
        total_pages,
    }
}

pub fn offset(info: &PageInfo) -> i64 {
    (info.page - 1) * info.page_size
}

impl PageInfo {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "total": self.total,
            "page": self.page,
            "pageSize": self.page_size,
            "totalPages": self.total_pages,
        })
    }
}
