//! Deferred queries over row-document collections.
//!
//! A [`LazyFrame`] captures the collection, the filter and the projection of
//! a read. Building and refining it performs no I/O, documents are fetched
//! only by [`LazyFrame::count`], [`LazyFrame::documents`] and
//! [`LazyFrame::materialize`]. Filters and projections use the original
//! column names, the translation to stored document keys happens when the
//! query is executed.
use log::trace;

use super::Filter;
use crate::marshal::{self, RowsKindMeta};
use crate::repo::{self, Document, DocumentStoreRef, FindQuery};
use crate::types::{FrameError, Retrieved};

#[derive(thiserror::Error, Debug)]
pub enum LazyError {
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    #[error("repository error :: {0}")]
    Repository(#[from] repo::Error),
    #[error("marshal error :: {0}")]
    Marshal(#[from] marshal::Error),
    #[error("frame error :: {0}")]
    Frame(#[from] FrameError),
}

#[derive(Clone)]
pub struct LazyFrame {
    db: DocumentStoreRef,
    collection: String,
    meta: RowsKindMeta,
    filter: Filter,
    columns: Option<Vec<String>>,
    series: bool,
}

impl LazyFrame {
    pub fn new(db: DocumentStoreRef, collection: &str, meta: RowsKindMeta) -> Self {
        Self {
            db,
            collection: collection.to_owned(),
            meta,
            filter: Filter::new(),
            columns: None,
            series: false,
        }
    }

    /// Materializes into a series instead of a frame
    pub fn as_series(mut self, series: bool) -> Self {
        self.series = series;
        self
    }

    /// Narrows the query, every filter added must hold
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and(filter);
        self
    }

    /// Restricts the returned columns, index levels are always returned
    pub fn select<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.as_ref().to_owned()).collect());
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Original names of the stored columns
    pub fn column_names(&self) -> Vec<&str> {
        self.meta.column_names()
    }

    fn stored_filter(&self) -> Filter {
        self.filter
            .clone()
            .map_roots(|root| self.meta.stored_name(root).map(str::to_owned))
    }

    /// Stored names of the selected data columns
    fn stored_projection(&self) -> Result<Option<Vec<String>>, LazyError> {
        let Some(columns) = &self.columns else {
            return Ok(None);
        };

        columns
            .iter()
            .map(|c| {
                self.meta
                    .columns
                    .iter()
                    .find(|m| &m.original == c)
                    .map(|m| m.stored.clone())
                    .ok_or_else(|| LazyError::UnknownColumn(c.clone()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn find_query(&self, projection: Option<&[String]>) -> FindQuery {
        let query = FindQuery::new().with_filter(self.stored_filter());
        match projection {
            Some(projection) => {
                let mut fields = projection.to_vec();
                fields.extend(self.meta.idx_meta.columns().map(str::to_owned));
                query.with_projection(fields)
            }
            None => query,
        }
    }

    /// Number of matching rows
    pub async fn count(&self) -> Result<usize, LazyError> {
        Ok(self.db.count(&self.collection, &self.stored_filter()).await?)
    }

    /// Matching rows as stored
    pub async fn documents(&self) -> Result<Vec<Document>, LazyError> {
        let projection = self.stored_projection()?;
        let query = self.find_query(projection.as_deref());
        Ok(self.db.find(&self.collection, &query).await?)
    }

    /// Executes the query and rebuilds the tabular value
    pub async fn materialize(&self) -> Result<Retrieved, LazyError> {
        let projection = self.stored_projection()?;
        let query = self.find_query(projection.as_deref());

        let docs = self.db.find(&self.collection, &query).await?;
        trace!("materializing {} rows from `{}`", docs.len(), self.collection);

        let df = marshal::documents_to_frame(&docs, &self.meta, projection.as_deref())?;
        if self.series {
            Ok(Retrieved::Series(df.into_series()?))
        } else {
            Ok(Retrieved::Frame(df))
        }
    }
}

impl std::fmt::Debug for LazyFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyFrame")
            .field("collection", &self.collection)
            .field("filter", &self.filter)
            .field("columns", &self.columns)
            .field("series", &self.series)
            .finish()
    }
}
