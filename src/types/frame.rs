//! In-memory tabular values.
//!
//! A [`DataFrame`] is an Arrow [`RecordBatch`] paired with a row [`Index`].
//! The index is either positional (no levels, rows are addressed by position)
//! or made of one or more named levels, each an Arrow array with the same
//! length as the data. A [`Series`] is a single named column with its own index.
use arrow::array::{ArrayRef, RecordBatch, RecordBatchOptions};
use arrow::datatypes::{Field, Schema};
use arrow::error::ArrowError;
use std::sync::Arc;

use crate::params;

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("index length mismatch, expected {expected} rows, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("a series needs exactly one column, found {0}")]
    NotASeries(usize),
    #[error("arrow error :: {0}")]
    Arrow(#[from] ArrowError),
}

/// One level of a (possibly multi-level) row index
#[derive(Debug, Clone)]
pub struct IndexLevel {
    pub name: Option<String>,
    pub values: ArrayRef,
}

impl PartialEq for IndexLevel {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && *self.values == *other.values
    }
}

impl IndexLevel {
    pub fn new(name: Option<&str>, values: ArrayRef) -> Self {
        Self {
            name: name.map(str::to_owned),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Index {
    levels: Vec<IndexLevel>,
}

impl Index {
    /// Index addressing rows by their position
    pub fn positional() -> Self {
        Self::default()
    }

    pub fn new(levels: Vec<IndexLevel>) -> Self {
        Self { levels }
    }

    pub fn single(name: Option<&str>, values: ArrayRef) -> Self {
        Self::new(vec![IndexLevel::new(name, values)])
    }

    pub fn is_positional(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn levels(&self) -> &[IndexLevel] {
        &self.levels
    }

    pub fn nlevels(&self) -> usize {
        self.levels.len()
    }

    pub fn into_levels(self) -> Vec<IndexLevel> {
        self.levels
    }

    fn check_len(&self, expected: usize) -> Result<(), FrameError> {
        for level in &self.levels {
            if level.values.len() != expected {
                return Err(FrameError::LengthMismatch {
                    expected,
                    found: level.values.len(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    data: RecordBatch,
    index: Index,
}

impl DataFrame {
    pub fn new(data: RecordBatch) -> Self {
        Self {
            data,
            index: Index::positional(),
        }
    }

    /// Builds a frame from named columns. Column nullability follows the
    /// presence of nulls in each array.
    pub fn try_from_columns<I, S>(columns: I) -> Result<Self, FrameError>
    where
        I: IntoIterator<Item = (S, ArrayRef)>,
        S: AsRef<str>,
    {
        Ok(Self::new(RecordBatch::try_from_iter(columns)?))
    }

    pub fn empty() -> Self {
        Self::new(RecordBatch::new_empty(Arc::new(Schema::empty())))
    }

    pub fn with_index(mut self, index: Index) -> Result<Self, FrameError> {
        index.check_len(self.data.num_rows())?;
        self.index = index;
        Ok(self)
    }

    pub fn data(&self) -> &RecordBatch {
        &self.data
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn num_rows(&self) -> usize {
        self.data.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.data.num_columns()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0 || self.num_columns() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.data
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.data.column_by_name(name)
    }

    pub fn into_parts(self) -> (RecordBatch, Index) {
        (self.data, self.index)
    }

    /// Appends (or replaces) a column, keeping the index untouched.
    pub fn with_column(self, name: &str, values: ArrayRef) -> Result<Self, FrameError> {
        let schema = self.data.schema();
        let mut fields: Vec<Field> = Vec::with_capacity(schema.fields().len() + 1);
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len() + 1);

        for (field, column) in schema.fields().iter().zip(self.data.columns()) {
            if field.name() != name {
                fields.push(field.as_ref().clone());
                columns.push(column.clone());
            }
        }
        fields.push(Field::new(
            name,
            values.data_type().clone(),
            values.null_count() > 0,
        ));
        columns.push(values);

        let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
        let options = RecordBatchOptions::new().with_row_count(Some(self.data.num_rows()));
        let data = RecordBatch::try_new_with_options(schema, columns, &options)?;

        Ok(Self {
            data,
            index: self.index,
        })
    }

    /// Converts a single column frame into a series carrying the same index.
    pub fn into_series(self) -> Result<Series, FrameError> {
        if self.data.num_columns() != 1 {
            return Err(FrameError::NotASeries(self.data.num_columns()));
        }

        let name = self.data.schema().field(0).name().clone();
        let name = if name == params::UNNAMED_SERIES_COLUMN {
            None
        } else {
            Some(name)
        };

        Ok(Series {
            name,
            values: self.data.column(0).clone(),
            index: self.index,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Series {
    name: Option<String>,
    values: ArrayRef,
    index: Index,
}

impl PartialEq for Series {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && *self.values == *other.values && self.index == other.index
    }
}

impl Series {
    pub fn new(name: Option<&str>, values: ArrayRef) -> Self {
        Self {
            name: name.map(str::to_owned),
            values,
            index: Index::positional(),
        }
    }

    pub fn with_index(mut self, index: Index) -> Result<Self, FrameError> {
        index.check_len(self.values.len())?;
        self.index = index;
        Ok(self)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn values(&self) -> &ArrayRef {
        &self.values
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Converts the series into a one column frame. Unnamed series use a
    /// reserved column name which is mapped back by [`DataFrame::into_series`].
    pub fn into_frame(self) -> Result<DataFrame, FrameError> {
        let name = self
            .name
            .unwrap_or_else(|| params::UNNAMED_SERIES_COLUMN.to_owned());
        DataFrame::try_from_columns([(name, self.values)])?.with_index(self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};

    fn frame() -> DataFrame {
        DataFrame::try_from_columns([
            ("a", Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef),
            ("b", Arc::new(Float64Array::from(vec![0.5, 1.5, 2.5])) as ArrayRef),
        ])
        .unwrap()
    }

    #[test]
    fn index_length_is_checked() {
        let index = Index::single(Some("k"), Arc::new(StringArray::from(vec!["x", "y"])));
        let err = frame().with_index(index).unwrap_err();
        assert!(matches!(
            err,
            FrameError::LengthMismatch {
                expected: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn with_column_replaces_existing() {
        let df = frame()
            .with_column("a", Arc::new(Int64Array::from(vec![7, 8, 9])))
            .unwrap();
        assert_eq!(df.column_names(), vec!["b", "a"]);
        assert_eq!(
            df.column("a").unwrap().as_ref(),
            &Int64Array::from(vec![7, 8, 9]) as &dyn arrow::array::Array
        );
    }

    #[test]
    fn series_frame_conversion() {
        let index = Index::single(None, Arc::new(Int64Array::from(vec![10, 20])));
        let series = Series::new(None, Arc::new(Float64Array::from(vec![1.0, 2.0])))
            .with_index(index)
            .unwrap();

        let df = series.clone().into_frame().unwrap();
        assert_eq!(df.column_names(), vec![params::UNNAMED_SERIES_COLUMN]);

        let back = df.into_series().unwrap();
        assert_eq!(back, series);
        assert!(frame().into_series().is_err());
    }
}
