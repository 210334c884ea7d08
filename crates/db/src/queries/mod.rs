// crates/db/src/queries/mod.rs
// Task record queries for the taskforge SQLite database.

pub(crate) mod row_types;
pub mod tasks;
