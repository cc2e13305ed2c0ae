//! Document database access.
//!
//! Payloads and metadata are schemaless JSON documents grouped in named
//! collections. [`DocumentStore`] is the seam every caller goes through; the
//! Postgres implementation stores documents in a single `jsonb` table, the
//! in-memory implementation keeps them in process.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{params, query};

mod memory;
pub use memory::MemoryDocumentStore;

mod postgres;
pub use postgres::PgDocumentStore;

pub mod sql_models;
pub use sql_models::pg_queries::*;

/// A stored document
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Identifier assigned to a document on insertion
pub type DocumentId = uuid::Uuid;

pub type DocumentStoreRef = Arc<dyn DocumentStore>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("database error :: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("migration error :: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("query error :: {0}")]
    Query(#[from] query::Error),
    #[error("json error :: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed document :: {0}")]
    MalformedDocument(String),
    #[error("unable to create index on `{field}` :: {msg}")]
    IndexCreation { field: String, msg: String },
}

/// Read request over a collection
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub filter: query::Filter,
    /// Top level fields to return, the document identifier is always returned
    pub projection: Option<Vec<String>>,
    pub limit: Option<usize>,
}

impl FindQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: query::Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_projection(mut self, projection: Vec<String>) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrder {
    Ascending,
    Descending,
    /// Geospatial index, values must be GeoJSON objects
    Geo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    pub order: IndexOrder,
}

impl IndexKey {
    pub fn new(field: &str, order: IndexOrder) -> Self {
        Self {
            field: field.to_owned(),
            order,
        }
    }
}

/// Compound index definition over top level fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub keys: Vec<IndexKey>,
}

impl IndexSpec {
    pub fn new(keys: Vec<IndexKey>) -> Self {
        Self { keys }
    }

    pub fn ascending<S: AsRef<str>>(fields: &[S]) -> Self {
        Self::new(
            fields
                .iter()
                .map(|f| IndexKey::new(f.as_ref(), IndexOrder::Ascending))
                .collect(),
        )
    }

    pub fn geo_fields(&self) -> impl Iterator<Item = &str> {
        self.keys
            .iter()
            .filter(|k| k.order == IndexOrder::Geo)
            .map(|k| k.field.as_str())
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Appends documents to a collection, returning the assigned identifiers
    /// in insertion order. Any `_id` field in the input is ignored.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<DocumentId>, Error>;

    /// Returns the matching documents in insertion order, each carrying its
    /// identifier in the `_id` field.
    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>, Error>;

    async fn find_by_id(&self, collection: &str, id: DocumentId) -> Result<Option<Document>, Error>;

    async fn count(&self, collection: &str, filter: &query::Filter) -> Result<usize, Error>;

    /// Replaces the body of an existing document, returns false if missing
    async fn replace_by_id(&self, collection: &str, id: DocumentId, doc: Document) -> Result<bool, Error>;

    async fn delete_by_id(&self, collection: &str, id: DocumentId) -> Result<bool, Error>;

    /// Removes every document and index of the collection, returns true if
    /// any document existed
    async fn drop_collection(&self, collection: &str) -> Result<bool, Error>;

    /// Creates an index unless an identical one exists. Geospatial keys fail
    /// with [`Error::IndexCreation`] if any stored value is not GeoJSON.
    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<(), Error>;

    async fn exists(&self, collection: &str) -> Result<bool, Error> {
        Ok(self.count(collection, &query::Filter::new()).await? > 0)
    }
}

/// Minimal GeoJSON shape check: an object with `type` and `coordinates`
pub fn is_geojson(value: &serde_json::Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.get("type").is_some_and(|t| t.is_string()) && o.contains_key("coordinates"))
}

/// Reads the identifier of a stored document
pub fn document_id(doc: &Document) -> Option<DocumentId> {
    doc.get(params::DOCUMENT_ID_FIELD)
        .and_then(|v| v.as_str())
        .and_then(|s| uuid::Uuid::parse_str(s).ok())
}

/// Sets the identifier field of a document
pub fn with_document_id(mut doc: Document, id: DocumentId) -> Document {
    doc.insert(
        params::DOCUMENT_ID_FIELD.to_owned(),
        serde_json::Value::String(id.to_string()),
    );
    doc
}

/// Keeps only the projected top level fields (plus the identifier)
pub fn project(doc: Document, projection: Option<&[String]>) -> Document {
    match projection {
        None => doc,
        Some(fields) => doc
            .into_iter()
            .filter(|(k, _)| k == params::DOCUMENT_ID_FIELD || fields.iter().any(|f| f == k))
            .collect(),
    }
}

// ////////////////////////////////////////////////////////////////////////////
// Postgres connection handles
// ////////////////////////////////////////////////////////////////////////////

/// Access to the sqlx executor behind a connection or a transaction
pub trait AsExec {
    fn as_exec(&mut self) -> impl sqlx::PgExecutor<'_>;
}

/// Pooled connection, every query runs on its own
pub struct Cx<'a> {
    pool: &'a sqlx::PgPool,
}

impl AsExec for Cx<'_> {
    fn as_exec(&mut self) -> impl sqlx::PgExecutor<'_> {
        self.pool
    }
}

/// Open transaction, dropped without [`Tx::commit`] it rolls back
pub struct Tx<'a> {
    inner: sqlx::Transaction<'a, sqlx::Postgres>,
}

impl Tx<'_> {
    pub async fn commit(self) -> Result<(), Error> {
        self.inner.commit().await?;
        Ok(())
    }
}

impl AsExec for Tx<'_> {
    fn as_exec(&mut self) -> impl sqlx::PgExecutor<'_> {
        &mut *self.inner
    }
}

#[derive(Clone)]
pub struct Repository {
    pool: sqlx::PgPool,
}

impl Repository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn connection(&self) -> Cx<'_> {
        Cx { pool: &self.pool }
    }

    pub async fn transaction(&self) -> Result<Tx<'static>, Error> {
        Ok(Tx {
            inner: self.pool.begin().await?,
        })
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geojson_shape() {
        assert!(is_geojson(&serde_json::json!({"type": "Point", "coordinates": [1.0, 2.0]})));
        assert!(!is_geojson(&serde_json::json!({"type": "Point"})));
        assert!(!is_geojson(&serde_json::json!([1.0, 2.0])));
    }

    #[test]
    fn projection_keeps_id() {
        let id = uuid::Uuid::new_v4();
        let doc = with_document_id(
            serde_json::json!({"a": 1, "b": 2}).as_object().cloned().unwrap(),
            id,
        );

        let projected = project(doc, Some(&["a".to_owned()]));
        assert_eq!(projected.len(), 2);
        assert_eq!(document_id(&projected), Some(id));
        assert!(projected.contains_key("a"));
    }
}
