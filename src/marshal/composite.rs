use serde_json::Value;
use std::sync::Arc;

use super::{Error, documents_to_batch};
use crate::repo::Document;
use crate::types::DataFrame;

/// Coerces simple structured data into a table.
///
/// Accepted shapes:
/// * a sequence of mappings, one row each
/// * a mapping of equal length sequences, one column each
/// * a flat mapping, a single row
///
/// Column types are inferred from the values.
pub fn composite_to_frame(value: &Value) -> Result<DataFrame, Error> {
    let rows: Vec<Document> = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map.clone()),
                _ => Err(Error::Unsupported(
                    "sequence items must be mappings".to_owned(),
                )),
            })
            .collect::<Result<_, _>>()?,
        Value::Object(map) if !map.is_empty() && map.values().all(Value::is_array) => {
            columns_to_rows(map)?
        }
        Value::Object(map) => vec![map.clone()],
        other => {
            return Err(Error::Unsupported(format!(
                "cannot build a table from `{other}`"
            )));
        }
    };

    if rows.is_empty() {
        return Ok(DataFrame::empty());
    }

    let values: Vec<Value> = rows.iter().cloned().map(Value::Object).collect();
    let schema = arrow::json::reader::infer_json_schema_from_iterator(values.iter().map(Ok))?;

    Ok(DataFrame::new(documents_to_batch(&rows, Arc::new(schema))?))
}

fn columns_to_rows(map: &serde_json::Map<String, Value>) -> Result<Vec<Document>, Error> {
    let mut len = None;
    for (name, column) in map {
        let n = column.as_array().map(Vec::len).unwrap_or_default();
        match len {
            None => len = Some(n),
            Some(l) if l != n => {
                return Err(Error::Unsupported(format!(
                    "column `{name}` has {n} values, expected {l}"
                )));
            }
            Some(_) => {}
        }
    }

    let mut rows = vec![Document::new(); len.unwrap_or_default()];
    for (name, column) in map {
        if let Value::Array(values) = column {
            for (row, v) in rows.iter_mut().zip(values) {
                row.insert(name.clone(), v.clone());
            }
        }
    }

    Ok(rows)
}
