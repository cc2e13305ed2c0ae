//! Serialization strategies.
//!
//! A [`Backend`] owns one or more kinds: it decides whether it can store an
//! input object, writes it into its physical form and reads it back. Writes
//! return the metadata to commit, the caller commits it only once the
//! physical write succeeded.
use async_trait::async_trait;
use std::sync::Arc;

use crate::catalog::{self, Catalog, MetadataRecord, MetadataUpdate};
use crate::repo::{self, DocumentStoreRef};
use crate::store::{self, StoreRef};
use crate::types::{ArrayError, DataFrame, FrameError, Kind, Object, Retrieved, Timestamp};
use crate::{marshal, query, rw};

mod options;
pub use options::*;

mod registry;
pub use registry::*;

mod rows;
pub use rows::RowsBackend;

mod groups;
pub use groups::GroupsBackend;

mod parquet;
pub use parquet::ParquetBackend;

mod document;
pub use document::DocumentBackend;

mod model;
pub use model::ModelBackend;

pub type BackendRef = Arc<dyn Backend>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found :: {0}")]
    NotFound(String),
    #[error("unsupported object type `{0}`")]
    UnsupportedType(String),
    #[error("kind `{0}` cannot be returned in its raw form")]
    UnsupportedKindForPython(Kind),
    #[error("invalid option :: {0}")]
    InvalidOption(String),
    #[error("malformed metadata of `{name}` :: {msg}")]
    MalformedMetadata { name: String, msg: String },
    #[error("repository error :: {0}")]
    Repository(#[from] repo::Error),
    #[error("store error :: {0}")]
    Store(#[from] store::Error),
    #[error("catalog error :: {0}")]
    Catalog(#[from] catalog::Error),
    #[error("data serialization error :: {0}")]
    Rw(#[from] rw::Error),
    #[error("marshal error :: {0}")]
    Marshal(#[from] marshal::Error),
    #[error("query error :: {0}")]
    Query(#[from] query::Error),
    #[error("lazy query error :: {0}")]
    Lazy(#[from] query::LazyError),
    #[error("frame error :: {0}")]
    Frame(#[from] FrameError),
    #[error("array error :: {0}")]
    Array(#[from] ArrayError),
}

/// Handles a backend works with during a single operation
pub struct Context {
    pub db: DocumentStoreRef,
    pub blobs: StoreRef,
    pub catalog: Catalog,
}

impl Context {
    pub fn new(db: DocumentStoreRef, blobs: StoreRef, catalog: Catalog) -> Self {
        Self { db, blobs, catalog }
    }

    pub fn bucket(&self) -> &str {
        self.catalog.keys().bucket()
    }

    pub fn collection_name(&self, name: &str) -> String {
        self.catalog.keys().collection_name(name)
    }

    pub fn blob_key(&self, name: &str, ext: &str) -> String {
        self.catalog.keys().key(name, ext)
    }

    /// Removes the catalog record of `name` if it points at `collection`.
    /// Used when a replacing put dropped the collection and then failed to
    /// write the new documents.
    pub async fn forget(&self, name: &str, collection: &str) -> Result<(), Error> {
        let Some(record) = self.catalog.find(name).await? else {
            return Ok(());
        };

        if matches!(record.location()?, catalog::Location::Collection { name, .. } if name == collection) {
            log::warn!("`{}` could not be replaced, removing its metadata", record.name);
            self.catalog.delete(&record).await?;
        }
        Ok(())
    }
}

/// Non-fatal advisory raised by a put
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Empty input, nothing was stored
    EmptyInput { name: String },
    /// Data was appended to existing documents without explicit append intent
    AmbiguousAppend { name: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyInput { name } => write!(f, "`{name}` is empty, nothing stored"),
            Self::AmbiguousAppend { name } => {
                write!(f, "`{name}` already exists, will append rows")
            }
        }
    }
}

/// Result of a put
#[derive(Debug, Default)]
pub struct Outcome {
    /// Metadata to commit, `None` if nothing was written
    pub update: Option<MetadataUpdate>,
    pub warnings: Vec<Warning>,
}

impl Outcome {
    pub fn stored(update: MetadataUpdate) -> Self {
        Self {
            update: Some(update),
            warnings: Vec::new(),
        }
    }

    pub fn skipped(warning: Warning) -> Self {
        Self {
            update: None,
            warnings: vec![warning],
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<Warning>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Kinds read by this backend
    fn kinds(&self) -> Vec<Kind>;

    /// Returns true if this backend stores `obj` given `options`
    fn supports(&self, obj: &Object, name: &str, options: &PutOptions) -> bool;

    async fn put(
        &self,
        cx: &Context,
        obj: Object,
        name: &str,
        options: &PutOptions,
    ) -> Result<Outcome, Error>;

    async fn get(
        &self,
        cx: &Context,
        record: &MetadataRecord,
        options: &GetOptions,
    ) -> Result<Retrieved, Error>;

    /// Stored representation without conversion
    async fn get_raw(
        &self,
        _cx: &Context,
        record: &MetadataRecord,
        _options: &GetOptions,
    ) -> Result<Retrieved, Error> {
        Err(Error::UnsupportedKindForPython(record.kind.clone()))
    }
}

/// Frames, series, arrays and composite data as a table. Series are
/// returned as one column frames.
pub(crate) fn tabular(obj: Object) -> Result<DataFrame, Error> {
    match obj {
        Object::Frame(df) => Ok(df),
        Object::Series(s) => Ok(s.into_frame()?),
        Object::Array(arr) => Ok(arr.to_frame()?),
        Object::Data(value) if value.is_object() || value.is_array() => {
            Ok(marshal::composite_to_frame(&value)?)
        }
        other => Err(Error::UnsupportedType(other.type_name().to_owned())),
    }
}

/// Adds the timestamp column requested by `option`
pub(crate) fn with_timestamp(df: DataFrame, option: Option<&TimestampOption>) -> Result<DataFrame, Error> {
    let Some((column, at)) = option.and_then(TimestampOption::resolve) else {
        return Ok(df);
    };

    let millis: i64 = at.unwrap_or_else(Timestamp::now).into();
    let values = arrow::array::TimestampMillisecondArray::from(vec![millis; df.num_rows()]);
    Ok(df.with_column(&column, Arc::new(values))?)
}

/// Keeps the requested columns, in the requested order
pub(crate) fn select_columns(df: DataFrame, columns: Option<&[String]>) -> Result<DataFrame, Error> {
    let Some(columns) = columns else {
        return Ok(df);
    };

    let mut selected = Vec::with_capacity(columns.len());
    for c in columns {
        let values = df
            .column(c)
            .ok_or_else(|| marshal::Error::MissingColumn(c.clone()))?;
        selected.push((c.as_str(), values.clone()));
    }

    let (_, index) = df.into_parts();
    Ok(DataFrame::try_from_columns(selected)?.with_index(index)?)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::catalog::StoreKeys;

    /// Context over a private in-memory database and blob store
    pub fn context(prefix: &str) -> Context {
        context_on(Arc::new(repo::MemoryDocumentStore::new()), prefix)
    }

    pub fn context_on(db: DocumentStoreRef, prefix: &str) -> Context {
        let blobs = Arc::new(store::Store::new(
            url::Url::parse("memory:///").unwrap(),
            Arc::new(object_store::memory::InMemory::new()),
        ));
        Context::new(db.clone(), blobs, Catalog::new(db, StoreKeys::new("store", prefix)))
    }

    /// Runs a put and commits its metadata
    pub async fn put(
        backend: &dyn Backend,
        cx: &Context,
        obj: impl Into<Object>,
        name: &str,
        options: &PutOptions,
    ) -> (Option<MetadataRecord>, Vec<Warning>) {
        let outcome = backend.put(cx, obj.into(), name, options).await.unwrap();
        let record = match outcome.update {
            Some(update) => Some(cx.catalog.upsert(update).await.unwrap()),
            None => None,
        };
        (record, outcome.warnings)
    }
}
