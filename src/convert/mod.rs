//! Stateless transforms from backend payloads to response formats

mod csv_json;

pub use csv_json::{csv_to_json, csv_to_records, infer_column_type, ColumnType};
