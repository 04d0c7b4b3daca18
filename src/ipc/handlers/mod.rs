pub mod class_types;
pub mod classes;
pub mod core;
pub mod employees;
pub mod positions;
pub mod schedules;
pub mod students;
pub mod subjects;
