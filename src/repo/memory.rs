use async_trait::async_trait;
use log::trace;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{Document, DocumentId, DocumentStore, Error, FindQuery, IndexSpec};
use crate::query;

#[derive(Default)]
struct Collection {
    docs: Vec<(DocumentId, Document)>,
    indexes: Vec<IndexSpec>,
}

/// Process local document store.
///
/// Behaves like the database backed store (insertion order, projections,
/// index validation) without persisting anything.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the collections holding at least one document
    pub async fn collection_names(&self) -> Vec<String> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections
            .iter()
            .filter(|(_, c)| !c.docs.is_empty())
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    pub async fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default()
    }
}

fn strip_id(mut doc: Document) -> Document {
    doc.remove(crate::params::DOCUMENT_ID_FIELD);
    doc
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<DocumentId>, Error> {
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_owned()).or_default();

        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = uuid::Uuid::new_v4();
            entry.docs.push((id, strip_id(doc)));
            ids.push(id);
        }

        trace!("inserted {} documents into `{}`", ids.len(), collection);
        Ok(ids)
    }

    async fn find(&self, collection: &str, find: &FindQuery) -> Result<Vec<Document>, Error> {
        let collections = self.collections.read().await;
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for (id, doc) in &entry.docs {
            if find.limit.is_some_and(|l| found.len() >= l) {
                break;
            }
            if query::matches(&find.filter, doc)? {
                let doc = super::with_document_id(doc.clone(), *id);
                found.push(super::project(doc, find.projection.as_deref()));
            }
        }

        Ok(found)
    }

    async fn find_by_id(&self, collection: &str, id: DocumentId) -> Result<Option<Document>, Error> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|c| {
            c.docs
                .iter()
                .find(|(i, _)| *i == id)
                .map(|(i, d)| super::with_document_id(d.clone(), *i))
        }))
    }

    async fn count(&self, collection: &str, filter: &query::Filter) -> Result<usize, Error> {
        let collections = self.collections.read().await;
        let Some(entry) = collections.get(collection) else {
            return Ok(0);
        };

        let mut n = 0;
        for (_, doc) in &entry.docs {
            if query::matches(filter, doc)? {
                n += 1;
            }
        }
        Ok(n)
    }

    async fn replace_by_id(&self, collection: &str, id: DocumentId, doc: Document) -> Result<bool, Error> {
        let mut collections = self.collections.write().await;
        let slot = collections
            .get_mut(collection)
            .and_then(|c| c.docs.iter_mut().find(|(i, _)| *i == id));

        match slot {
            Some((_, existing)) => {
                *existing = strip_id(doc);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_id(&self, collection: &str, id: DocumentId) -> Result<bool, Error> {
        let mut collections = self.collections.write().await;
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(false);
        };

        let before = entry.docs.len();
        entry.docs.retain(|(i, _)| *i != id);
        Ok(entry.docs.len() != before)
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool, Error> {
        let removed = self.collections.write().await.remove(collection);
        Ok(removed.is_some_and(|c| !c.docs.is_empty()))
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<(), Error> {
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_owned()).or_default();

        if entry.indexes.contains(spec) {
            return Ok(());
        }

        for field in spec.geo_fields() {
            let invalid = entry
                .docs
                .iter()
                .filter_map(|(_, d)| d.get(field))
                .filter(|v| !v.is_null() && !super::is_geojson(v))
                .count();
            if invalid > 0 {
                return Err(Error::IndexCreation {
                    field: field.to_owned(),
                    msg: format!("{invalid} values are not valid GeoJSON objects"),
                });
            }
        }

        entry.indexes.push(spec.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::IndexOrder;

    fn doc(v: serde_json::Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_find_replace_delete() {
        let db = MemoryDocumentStore::new();
        let ids = db
            .insert_many(
                "c",
                vec![doc(serde_json::json!({"a": 1})), doc(serde_json::json!({"a": 2}))],
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let found = db
            .find("c", &FindQuery::new().with_filter(query::Filter::new().gt("a", 1).unwrap()))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(super::super::document_id(&found[0]), Some(ids[1]));

        assert!(db.replace_by_id("c", ids[0], doc(serde_json::json!({"a": 5}))).await.unwrap());
        let first = db.find_by_id("c", ids[0]).await.unwrap().unwrap();
        assert_eq!(first.get("a"), Some(&serde_json::json!(5)));

        assert!(db.delete_by_id("c", ids[0]).await.unwrap());
        assert_eq!(db.count("c", &query::Filter::new()).await.unwrap(), 1);

        assert!(db.drop_collection("c").await.unwrap());
        assert!(!db.exists("c").await.unwrap());
        assert!(!db.drop_collection("c").await.unwrap());
    }

    #[tokio::test]
    async fn geo_index_requires_geojson() {
        let db = MemoryDocumentStore::new();
        db.insert_many("c", vec![doc(serde_json::json!({"loc": [1, 2]}))])
            .await
            .unwrap();

        let spec = IndexSpec::new(vec![crate::repo::IndexKey::new("loc", IndexOrder::Geo)]);
        let err = db.create_index("c", &spec).await.unwrap_err();
        assert!(matches!(err, Error::IndexCreation { .. }));
        assert!(db.indexes("c").await.is_empty());

        let ok = IndexSpec::ascending(&["loc"]);
        db.create_index("c", &ok).await.unwrap();
        db.create_index("c", &ok).await.unwrap();
        assert_eq!(db.indexes("c").await.len(), 1);
    }
}
