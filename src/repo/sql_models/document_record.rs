use sqlx::{Row, postgres::PgRow};

use crate::repo;

#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub document_uuid: uuid::Uuid,
    pub collection_name: String,

    /// Document content, never carries the identifier field
    pub(super) body: serde_json::Value,
}

impl DocumentRecord {
    pub fn new(collection_name: &str, mut body: repo::Document) -> Self {
        body.remove(crate::params::DOCUMENT_ID_FIELD);
        Self {
            document_uuid: uuid::Uuid::new_v4(),
            collection_name: collection_name.to_owned(),
            body: serde_json::Value::Object(body),
        }
    }

    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }

    /// Converts the record into a document carrying its identifier
    pub fn into_document(self) -> Result<repo::Document, repo::Error> {
        match self.body {
            serde_json::Value::Object(map) => Ok(repo::with_document_id(map, self.document_uuid)),
            other => Err(repo::Error::MalformedDocument(format!(
                "document `{}` is not an object: {}",
                self.document_uuid, other
            ))),
        }
    }

    pub(crate) fn from_row(row: PgRow) -> Result<Self, repo::Error> {
        Ok(Self {
            document_uuid: row.try_get("document_uuid")?,
            collection_name: row.try_get("collection_name")?,
            body: row.try_get("body")?,
        })
    }
}

/// Index registered over a logical collection
#[derive(Debug, Clone)]
pub struct CollectionIndexRecord {
    pub index_name: String,
    pub collection_name: String,
    pub(super) index_spec: serde_json::Value,
}

impl CollectionIndexRecord {
    pub fn try_new(collection_name: &str, spec: &repo::IndexSpec) -> Result<Self, repo::Error> {
        Ok(Self {
            index_name: format!("document_ix_{}", uuid::Uuid::new_v4().simple()),
            collection_name: collection_name.to_owned(),
            index_spec: serde_json::to_value(spec)?,
        })
    }

    pub fn spec(&self) -> Result<repo::IndexSpec, repo::Error> {
        Ok(serde_json::from_value(self.index_spec.clone())?)
    }

    pub(crate) fn from_row(row: PgRow) -> Result<Self, repo::Error> {
        Ok(Self {
            index_name: row.try_get("index_name")?,
            collection_name: row.try_get("collection_name")?,
            index_spec: row.try_get("index_spec")?,
        })
    }
}
