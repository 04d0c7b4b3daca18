use chrono::NaiveDate;
use std::collections::HashMap;

/// Last-used list filters, keyed by entity name ("Class", "Student", ...).
/// Values are kept as the raw string map the caller submitted, mirroring how
/// a web session would hold form fields, and are rehydrated into typed
/// filters on every list call.
pub struct FilterStore {
    entries: HashMap<String, HashMap<String, String>>,
}

impl FilterStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn save(&mut self, entity: &str, raw: HashMap<String, String>) {
        self.entries.insert(entity.to_string(), raw);
    }

    pub fn get(&self, entity: &str) -> Option<&HashMap<String, String>> {
        self.entries.get(entity)
    }
}

/// Case-insensitive key lookup. Session-persisted maps and form posts do not
/// agree on key casing, so neither do we.
fn lookup<'a>(map: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Text field: absent or empty means "no restriction".
fn text_field(map: &HashMap<String, String>, key: &str) -> Option<String> {
    lookup(map, key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Integer field: absent, empty, or unparseable all default to None.
fn i64_field(map: &HashMap<String, String>, key: &str) -> Option<i64> {
    lookup(map, key).and_then(|v| v.trim().parse::<i64>().ok())
}

/// Calendar-date field, parsed as a plain date with no time-of-day or zone.
/// Bad input defaults to None rather than failing the rehydration.
fn date_field(map: &HashMap<String, String>, key: &str) -> Option<NaiveDate> {
    lookup(map, key).and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok())
}

#[derive(Debug, Default)]
pub struct ClassTypeFilter {
    pub name: Option<String>,
}

impl ClassTypeFilter {
    pub fn from_string_map(map: &HashMap<String, String>) -> Self {
        Self {
            name: text_field(map, "name"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ClassFilter {
    pub class_name: Option<String>,
    pub year_created: Option<i64>,
    pub student_count: Option<i64>,
    pub class_type_name: Option<String>,
}

impl ClassFilter {
    pub fn from_string_map(map: &HashMap<String, String>) -> Self {
        Self {
            class_name: text_field(map, "className"),
            year_created: i64_field(map, "yearCreated"),
            student_count: i64_field(map, "studentCount"),
            class_type_name: text_field(map, "classTypeName"),
        }
    }
}

#[derive(Debug, Default)]
pub struct PositionFilter {
    pub name: Option<String>,
}

impl PositionFilter {
    pub fn from_string_map(map: &HashMap<String, String>) -> Self {
        Self {
            name: text_field(map, "name"),
        }
    }
}

#[derive(Debug, Default)]
pub struct EmployeeFilter {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub middle_name: Option<String>,
    pub position_name: Option<String>,
}

impl EmployeeFilter {
    pub fn from_string_map(map: &HashMap<String, String>) -> Self {
        Self {
            first_name: text_field(map, "firstName"),
            last_name: text_field(map, "lastName"),
            middle_name: text_field(map, "middleName"),
            position_name: text_field(map, "positionName"),
        }
    }
}

#[derive(Debug, Default)]
pub struct SubjectFilter {
    pub subject_name: Option<String>,
    pub employee_name: Option<String>,
}

impl SubjectFilter {
    pub fn from_string_map(map: &HashMap<String, String>) -> Self {
        Self {
            subject_name: text_field(map, "subjectName"),
            employee_name: text_field(map, "employeeName"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScheduleFilter {
    pub class_name: Option<String>,
    pub subject_name: Option<String>,
}

impl ScheduleFilter {
    pub fn from_string_map(map: &HashMap<String, String>) -> Self {
        Self {
            class_name: text_field(map, "className"),
            subject_name: text_field(map, "subjectName"),
        }
    }
}

#[derive(Debug, Default)]
pub struct StudentFilter {
    pub class_name: Option<String>,
    pub subject_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

impl StudentFilter {
    pub fn from_string_map(map: &HashMap<String, String>) -> Self {
        Self {
            class_name: text_field(map, "className"),
            subject_name: text_field(map, "subjectName"),
            date_of_birth: date_field(map, "dateOfBirth"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn keys_match_case_insensitively() {
        let m = map(&[("CLASSNAME", "5Д"), ("yearcreated", "2020")]);
        let f = ClassFilter::from_string_map(&m);
        assert_eq!(f.class_name.as_deref(), Some("5Д"));
        assert_eq!(f.year_created, Some(2020));
    }

    #[test]
    fn absent_keys_keep_defaults() {
        let f = ClassFilter::from_string_map(&map(&[("className", "1А")]));
        assert_eq!(f.class_name.as_deref(), Some("1А"));
        assert_eq!(f.year_created, None);
        assert_eq!(f.student_count, None);
        assert_eq!(f.class_type_name, None);
    }

    #[test]
    fn empty_values_mean_no_restriction() {
        let m = map(&[
            ("className", ""),
            ("yearCreated", ""),
            ("studentCount", "  "),
        ]);
        let f = ClassFilter::from_string_map(&m);
        assert_eq!(f.class_name, None);
        assert_eq!(f.year_created, None);
        assert_eq!(f.student_count, None);
    }

    #[test]
    fn unparseable_values_default_instead_of_failing() {
        let m = map(&[("yearCreated", "двадцать"), ("studentCount", "3.5")]);
        let f = ClassFilter::from_string_map(&m);
        assert_eq!(f.year_created, None);
        assert_eq!(f.student_count, None);
    }

    #[test]
    fn dates_parse_as_plain_calendar_dates() {
        let f = StudentFilter::from_string_map(&map(&[("dateOfBirth", "2012-09-01")]));
        assert_eq!(
            f.date_of_birth,
            Some(NaiveDate::from_ymd_opt(2012, 9, 1).unwrap())
        );

        let bad = StudentFilter::from_string_map(&map(&[("dateOfBirth", "01.09.2012")]));
        assert_eq!(bad.date_of_birth, None);
    }

    #[test]
    fn store_keeps_last_map_per_entity() {
        let mut store = FilterStore::new();
        store.save("Class", map(&[("className", "1А")]));
        store.save("Class", map(&[("className", "2Б")]));
        store.save("Student", map(&[("subjectName", "Физика")]));

        let class = store.get("Class").unwrap();
        assert_eq!(class.get("className").map(String::as_str), Some("2Б"));
        assert!(store.get("Position").is_none());
    }
}
