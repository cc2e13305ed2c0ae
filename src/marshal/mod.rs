//! Conversions between in-memory values and their stored representation.
//!
//! Tabular data is mapped to JSON documents (one per row, or one per group)
//! through Arrow's JSON writer and decoder. What cannot be inferred back from
//! the documents (original column names, data types, index levels) is kept in
//! a `kind_meta` payload saved with the metadata record.
use arrow::error::ArrowError;

use crate::types::FrameError;

mod index;
pub use index::*;

mod rows;
pub use rows::*;

mod groups;
pub use groups::*;

mod composite;
pub use composite::*;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("arrow error :: {0}")]
    Arrow(#[from] ArrowError),
    #[error("json error :: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame error :: {0}")]
    Frame(#[from] FrameError),
    #[error("missing column `{0}`")]
    MissingColumn(String),
    #[error("invalid kind metadata :: {0}")]
    KindMeta(String),
    #[error("unsupported data :: {0}")]
    Unsupported(String),
}

/// Escapes a column name so it can be used as a document key.
///
/// Dots would be read as path separators and a leading `$` as an operator,
/// both are percent encoded (as is `%` itself).
pub fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '%' => out.push_str("%25"),
            '.' => out.push_str("%2E"),
            '$' => out.push_str("%24"),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_key`]
pub fn unescape_key(key: &str) -> String {
    key.replace("%2E", ".").replace("%24", "$").replace("%25", "%")
}
