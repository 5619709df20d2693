use heck::ToLowerCamelCase;
use serde_json::{Map, Number, Value};

use crate::utils::{GatewayError, Result};

/// Scalar type inferred for one column, narrowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    Text,
}

impl ColumnType {
    fn next(self) -> Self {
        match self {
            Self::Bool => Self::Int,
            Self::Int => Self::Float,
            Self::Float | Self::Text => Self::Text,
        }
    }

    /// Convert a cell already known to parse as this type
    fn to_value(self, cell: &str) -> Value {
        match self {
            Self::Bool => parse_bool(cell).map(Value::Bool),
            Self::Int => cell.parse::<i64>().ok().map(Value::from),
            Self::Float => parse_float(cell).and_then(Number::from_f64).map(Value::Number),
            Self::Text => None,
        }
        .unwrap_or_else(|| Value::String(cell.to_string()))
    }

    fn accepts(self, cell: &str) -> bool {
        match self {
            Self::Bool => parse_bool(cell).is_some(),
            Self::Int => cell.parse::<i64>().is_ok(),
            Self::Float => parse_float(cell).is_some(),
            Self::Text => true,
        }
    }
}

/// Same vocabulary the Cognos CSV export uses for flags
fn parse_bool(cell: &str) -> Option<bool> {
    match cell {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// JSON has no NaN or infinity, so those stay text
fn parse_float(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn trim_cell(cell: &str) -> &str {
    cell.trim_end_matches(' ')
}

/// Infer a column's type from its present cells
pub fn infer_column_type<'a>(cells: impl Iterator<Item = &'a str> + Clone) -> ColumnType {
    let mut column_type = ColumnType::Bool;
    // every promotion rescans from the first cell
    while column_type != ColumnType::Text {
        if cells.clone().all(|cell| column_type.accepts(trim_cell(cell))) {
            break;
        }
        column_type = column_type.next();
    }
    column_type
}

/// Parse CSV text (header row first) into typed records
pub fn csv_to_records(csv_data: &str) -> Result<Vec<Map<String, Value>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| GatewayError::MalformedInput(format!("failed to parse CSV: {}", e)))?;
        rows.push(record);
    }

    let Some((header, data)) = rows.split_first() else {
        return Err(GatewayError::MalformedInput(
            "need at least 1 row to parse CSV".to_string(),
        ));
    };

    let keys: Vec<String> = header
        .iter()
        .map(|name| trim_cell(name).to_lower_camel_case())
        .collect();
    warn_on_duplicate_keys(&keys);

    let column_types: Vec<ColumnType> = (0..keys.len())
        .map(|col| infer_column_type(data.iter().filter_map(move |row| row.get(col))))
        .collect();

    let records = data
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (col, key) in keys.iter().enumerate() {
                // short rows simply omit the missing keys
                if let Some(cell) = row.get(col) {
                    object.insert(key.clone(), column_types[col].to_value(trim_cell(cell)));
                }
            }
            object
        })
        .collect();

    Ok(records)
}

/// Convert CSV text into a pretty-printed JSON array of records
pub fn csv_to_json(csv_data: &str) -> Result<Vec<u8>> {
    let records = csv_to_records(csv_data)?;
    serde_json::to_vec_pretty(&records)
        .map_err(|e| GatewayError::MalformedInput(format!("failed to encode JSON: {}", e)))
}

fn warn_on_duplicate_keys(keys: &[String]) {
    for (i, key) in keys.iter().enumerate() {
        if keys[..i].contains(key) {
            // TODO: disambiguate colliding columns instead of letting the last one win
            tracing::warn!("CSV header {:?} appears more than once after normalization", key);
        }
    }
}
