use arrow::array::{ArrayRef, RecordBatch, RecordBatchOptions};
use arrow::datatypes::{DataType, Field, Schema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::Error;
use crate::params;
use crate::types::{DataFrame, Index, IndexLevel};

/// Reconstruction data for one index level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexLevelMeta {
    pub name: Option<String>,
    /// Column holding the level values
    pub column: String,
    pub dtype: DataType,
    pub nullable: bool,
}

/// Reconstruction data of a (possibly multi-level) row index.
/// No levels means a positional index.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexMeta {
    pub levels: Vec<IndexLevelMeta>,
}

impl IndexMeta {
    pub fn is_positional(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().map(|l| l.column.as_str())
    }

    /// Column holding the level named `name`
    pub fn column_for(&self, name: &str) -> Option<&str> {
        self.levels
            .iter()
            .find(|l| l.name.as_deref() == Some(name))
            .map(|l| l.column.as_str())
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, Error> {
        serde_json::from_str(s).map_err(|e| Error::KindMeta(e.to_string()))
    }
}

/// Synthetic column name of an index level
pub fn index_column_name(level: usize, name: Option<&str>) -> String {
    format!(
        "{}#{}_{}",
        params::INDEX_COLUMN_PREFIX,
        level,
        name.unwrap_or_default()
    )
}

/// Flattens the index of `df` into trailing synthetic columns.
pub fn unravel_index(df: &DataFrame) -> Result<(RecordBatch, IndexMeta), Error> {
    let data = df.data();
    let schema = data.schema();

    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut columns: Vec<ArrayRef> = data.columns().to_vec();
    let mut meta = IndexMeta::default();

    for (level, idx) in df.index().levels().iter().enumerate() {
        let column = index_column_name(level, idx.name.as_deref());
        let nullable = idx.values.null_count() > 0;

        fields.push(Field::new(&column, idx.values.data_type().clone(), nullable));
        columns.push(idx.values.clone());
        meta.levels.push(IndexLevelMeta {
            name: idx.name.clone(),
            column,
            dtype: idx.values.data_type().clone(),
            nullable,
        });
    }

    let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    let options = RecordBatchOptions::new().with_row_count(Some(data.num_rows()));
    let batch = RecordBatch::try_new_with_options(schema, columns, &options)?;

    Ok((batch, meta))
}

/// Moves the synthetic index columns described by `meta` back into the index.
pub fn restore_index(batch: RecordBatch, meta: &IndexMeta) -> Result<DataFrame, Error> {
    let schema = batch.schema();
    let num_rows = batch.num_rows();

    let mut levels = Vec::with_capacity(meta.levels.len());
    for level in &meta.levels {
        let values = batch
            .column_by_name(&level.column)
            .ok_or_else(|| Error::MissingColumn(level.column.clone()))?;
        levels.push(IndexLevel::new(level.name.as_deref(), values.clone()));
    }

    let mut fields = Vec::new();
    let mut columns = Vec::new();
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        if meta.columns().any(|c| c == field.name()) {
            continue;
        }
        fields.push(field.as_ref().clone());
        columns.push(column.clone());
    }

    let schema = Arc::new(Schema::new(fields));
    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    let data = RecordBatch::try_new_with_options(schema, columns, &options)?;

    Ok(DataFrame::new(data).with_index(Index::new(levels))?)
}
