use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Short tag identifying the serialization strategy owning a stored object.
///
/// Built-in kinds are exposed as associated constants, any other tag can be
/// created with [`Kind::new`] and bound to a backend at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(Cow<'static, str>);

impl Kind {
    /// Tabular data stored as one document per row
    pub const FRAME_ROWS: Kind = Kind(Cow::Borrowed("frame.rows"));
    /// Single column tabular data stored as one document per row
    pub const SERIES_ROWS: Kind = Kind(Cow::Borrowed("series.rows"));
    /// Tabular data stored as one document per group
    pub const FRAME_GROUPS: Kind = Kind(Cow::Borrowed("frame.groups"));
    /// Tabular data stored as a binary container blob
    pub const FRAME_PARQUET: Kind = Kind(Cow::Borrowed("frame.parquet"));
    /// Packaged model blob
    pub const MODEL: Kind = Kind(Cow::Borrowed("model.bincode"));
    /// Arbitrary structured data stored as a flat document
    pub const DOCUMENT: Kind = Kind(Cow::Borrowed("data.document"));

    pub const fn from_static(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    pub fn new(tag: impl Into<String>) -> Self {
        Self(Cow::Owned(tag.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for kinds stored as one document per row
    pub fn is_rows(&self) -> bool {
        *self == Self::FRAME_ROWS || *self == Self::SERIES_ROWS
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Kind {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Kind {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl PartialEq<str> for Kind {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}
