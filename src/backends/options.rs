use crate::query::Filter;
use crate::repo::{IndexKey, IndexOrder, IndexSpec};
use crate::rw::Format;
use crate::types::{Kind, Timestamp};
use crate::params;

use super::Error;

/// Timestamp column injected by a row-document put
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampOption {
    /// Current time in the default column when enabled
    Enabled(bool),
    /// Current time in the named column
    Column(String),
    /// Given time in the default column
    At(Timestamp),
    /// Given time in the named column
    ColumnAt(String, Timestamp),
}

impl TimestampOption {
    /// Column name and time to inject, `None` time meaning now
    pub fn resolve(&self) -> Option<(String, Option<Timestamp>)> {
        let default = || params::DEFAULT_TIMESTAMP_COLUMN.to_owned();
        match self {
            Self::Enabled(false) => None,
            Self::Enabled(true) => Some((default(), None)),
            Self::Column(column) => Some((column.clone(), None)),
            Self::At(at) => Some((default(), Some(*at))),
            Self::ColumnAt(column, at) => Some((column.clone(), Some(*at))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// `Some(false)` replaces existing data, `None` appends with a warning
    pub append: Option<bool>,
    /// Grouping columns, stores one document per group
    pub groupby: Option<Vec<String>>,
    /// Stores tabular and composite data as a binary container
    pub as_binary: bool,
    /// Index specifiers, a column name prefixed by `+` (ascending, the
    /// default), `-` (descending) or `@` (geospatial)
    pub index: Vec<String>,
    pub timestamp: Option<TimestampOption>,
    /// Forces the kind, bypassing the built-in decision
    pub kind: Option<Kind>,
    pub format: Format,
    /// Free options for registered backends
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_append(mut self, append: bool) -> Self {
        self.append = Some(append);
        self
    }

    pub fn with_groupby<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.groupby = Some(columns.iter().map(|c| c.as_ref().to_owned()).collect());
        self
    }

    pub fn as_binary(mut self) -> Self {
        self.as_binary = true;
        self
    }

    pub fn with_index<S: AsRef<str>>(mut self, specifiers: &[S]) -> Self {
        self.index = specifiers.iter().map(|s| s.as_ref().to_owned()).collect();
        self
    }

    pub fn with_timestamp(mut self, timestamp: TimestampOption) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra.insert(key.to_owned(), value);
        self
    }

    /// Parses the index specifiers, `stored` maps a column to its document key
    pub fn index_spec(&self, stored: impl Fn(&str) -> String) -> Result<Option<IndexSpec>, Error> {
        if self.index.is_empty() {
            return Ok(None);
        }

        let keys = self
            .index
            .iter()
            .map(|spec| {
                let (order, column) = match spec.chars().next() {
                    Some('+') => (IndexOrder::Ascending, &spec[1..]),
                    Some('-') => (IndexOrder::Descending, &spec[1..]),
                    Some('@') => (IndexOrder::Geo, &spec[1..]),
                    _ => (IndexOrder::Ascending, spec.as_str()),
                };
                if column.is_empty() {
                    return Err(Error::InvalidOption(format!("empty index specifier `{spec}`")));
                }
                Ok(IndexKey::new(&stored(column), order))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(IndexSpec::new(keys)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Row filter, on original column names
    pub filter: Filter,
    /// Columns to return, in order
    pub columns: Option<Vec<String>>,
    /// Returns a deferred query where supported
    pub lazy: bool,
    /// Returns the stored representation without conversion
    pub force_python: bool,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.as_ref().to_owned()).collect());
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn force_python(mut self) -> Self {
        self.force_python = true;
        self
    }
}
