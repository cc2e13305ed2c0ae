use arrow::array::{ArrayRef, Float64Array};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{DataFrame, FrameError, Series};
use crate::{query, repo};

/// A trained model in its portable form.
///
/// Models are opaque to the store: the estimator name and parameters are
/// informative, the fitted state is kept as raw bytes produced by whatever
/// framework trained the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub estimator: String,
    pub params: BTreeMap<String, String>,
    pub state: Vec<u8>,
}

impl Model {
    pub fn new(estimator: &str) -> Self {
        Self {
            estimator: estimator.to_owned(),
            params: BTreeMap::new(),
            state: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_state(mut self, state: Vec<u8>) -> Self {
        self.state = state;
        self
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ArrayError {
    #[error("ragged rows, expected {expected} values per row, found {found}")]
    Ragged { expected: usize, found: usize },
}

/// Dense one or two dimensional array of floating point values (row-major).
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    values: Vec<f64>,
}

impl NdArray {
    pub fn from_vec(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    pub fn try_from_rows(rows: Vec<Vec<f64>>) -> Result<Self, ArrayError> {
        let ncols = rows.first().map(Vec::len).unwrap_or_default();
        let mut values = Vec::with_capacity(rows.len() * ncols);
        for row in &rows {
            if row.len() != ncols {
                return Err(ArrayError::Ragged {
                    expected: ncols,
                    found: row.len(),
                });
            }
            values.extend_from_slice(row);
        }

        Ok(Self {
            shape: vec![rows.len(), ncols],
            values,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Tabular view of the array, one column per array column named by its
    /// position (`"0"`, `"1"`, ...).
    pub fn to_frame(&self) -> Result<DataFrame, FrameError> {
        let (nrows, ncols) = match self.shape.as_slice() {
            [n] => (*n, 1),
            [n, m] => (*n, *m),
            _ => (0, 0),
        };

        let columns = (0..ncols).map(|c| {
            let column: Vec<f64> = (0..nrows).map(|r| self.values[r * ncols + c]).collect();
            (c.to_string(), Arc::new(Float64Array::from(column)) as ArrayRef)
        });

        DataFrame::try_from_columns(columns)
    }
}

/// Input of a put operation.
///
/// The fixed set of variants is what the built-in strategies know how to
/// store; [`Object::Other`] carries values only registered backends can claim.
pub enum Object {
    Frame(DataFrame),
    Series(Series),
    Model(Model),
    Array(NdArray),
    /// Arbitrary structured data (mapping or sequence)
    Data(serde_json::Value),
    Other(Box<dyn Any + Send + Sync>),
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Frame(_) => "frame",
            Self::Series(_) => "series",
            Self::Model(_) => "model",
            Self::Array(_) => "array",
            Self::Data(serde_json::Value::Object(_)) => "mapping",
            Self::Data(serde_json::Value::Array(_)) => "sequence",
            Self::Data(_) => "scalar",
            Self::Other(_) => "opaque",
        }
    }

    /// Frames and series are the tabular inputs
    pub fn is_tabular(&self) -> bool {
        matches!(self, Self::Frame(_) | Self::Series(_))
    }

    /// Mappings and sequences, scalars do not qualify
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Self::Data(serde_json::Value::Object(_) | serde_json::Value::Array(_))
        )
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame(v) => f.debug_tuple("Frame").field(v).finish(),
            Self::Series(v) => f.debug_tuple("Series").field(v).finish(),
            Self::Model(v) => f.debug_tuple("Model").field(v).finish(),
            Self::Array(v) => f.debug_tuple("Array").field(v).finish(),
            Self::Data(v) => f.debug_tuple("Data").field(v).finish(),
            Self::Other(_) => f.write_str("Other(..)"),
        }
    }
}

impl From<DataFrame> for Object {
    fn from(value: DataFrame) -> Self {
        Self::Frame(value)
    }
}

impl From<Series> for Object {
    fn from(value: Series) -> Self {
        Self::Series(value)
    }
}

impl From<Model> for Object {
    fn from(value: Model) -> Self {
        Self::Model(value)
    }
}

impl From<NdArray> for Object {
    fn from(value: NdArray) -> Self {
        Self::Array(value)
    }
}

impl From<serde_json::Value> for Object {
    fn from(value: serde_json::Value) -> Self {
        Self::Data(value)
    }
}

/// Output of a get operation.
pub enum Retrieved {
    Frame(DataFrame),
    Series(Series),
    /// Deferred query over a row-document collection
    Lazy(query::LazyFrame),
    Model(Model),
    Data(serde_json::Value),
    /// Raw stored documents
    Documents(Vec<repo::Document>),
    /// Raw blob content
    Blob(Bytes),
    Other(Box<dyn Any + Send + Sync>),
}

impl Retrieved {
    pub fn into_frame(self) -> Option<DataFrame> {
        match self {
            Self::Frame(df) => Some(df),
            _ => None,
        }
    }

    pub fn into_series(self) -> Option<Series> {
        match self {
            Self::Series(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_lazy(self) -> Option<query::LazyFrame> {
        match self {
            Self::Lazy(lf) => Some(lf),
            _ => None,
        }
    }

    pub fn into_model(self) -> Option<Model> {
        match self {
            Self::Model(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<serde_json::Value> {
        match self {
            Self::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_documents(self) -> Option<Vec<repo::Document>> {
        match self {
            Self::Documents(d) => Some(d),
            _ => None,
        }
    }

    pub fn into_blob(self) -> Option<Bytes> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Retrieved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame(v) => f.debug_tuple("Frame").field(v).finish(),
            Self::Series(v) => f.debug_tuple("Series").field(v).finish(),
            Self::Lazy(v) => f.debug_tuple("Lazy").field(v).finish(),
            Self::Model(v) => f.debug_tuple("Model").field(v).finish(),
            Self::Data(v) => f.debug_tuple("Data").field(v).finish(),
            Self::Documents(v) => f.debug_tuple("Documents").field(v).finish(),
            Self::Blob(v) => f.debug_tuple("Blob").field(&v.len()).finish(),
            Self::Other(_) => f.write_str("Other(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_to_frame() {
        let arr = NdArray::try_from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]])
            .unwrap();
        assert_eq!(arr.shape(), &[3, 2]);

        let df = arr.to_frame().unwrap();
        assert_eq!(df.column_names(), vec!["0", "1"]);
        assert_eq!(df.num_rows(), 3);

        let col = df.column("1").unwrap();
        let col = col.as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(col.values().to_vec(), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn ragged_rows_fail() {
        assert!(NdArray::try_from_rows(vec![vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn composite_detection() {
        assert!(Object::Data(serde_json::json!({"a": 1})).is_composite());
        assert!(Object::Data(serde_json::json!([1, 2])).is_composite());
        assert!(!Object::Data(serde_json::json!(1)).is_composite());
        assert_eq!(Object::Data(serde_json::json!("x")).type_name(), "scalar");
    }
}
