use async_trait::async_trait;
use log::{debug, trace};

use super::{
    Document, DocumentId, DocumentStore, Error, FindQuery, IndexSpec, Repository, sql_models,
};
use crate::query;

/// Document store over a single Postgres `jsonb` table.
///
/// Migrations run on first use, so building the store never touches the
/// database.
pub struct PgDocumentStore {
    repo: Repository,
    migrated: tokio::sync::OnceCell<()>,
}

impl PgDocumentStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            repo: Repository::new(pool),
            migrated: tokio::sync::OnceCell::new(),
        }
    }

    async fn ready(&self) -> Result<&Repository, Error> {
        self.migrated
            .get_or_try_init(|| async {
                debug!("running document store migrations");
                self.repo.migrate().await
            })
            .await?;
        Ok(&self.repo)
    }

    pub async fn close(&self) {
        self.repo.close().await;
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<DocumentId>, Error> {
        let repo = self.ready().await?;

        let records: Vec<sql_models::DocumentRecord> = docs
            .into_iter()
            .map(|doc| sql_models::DocumentRecord::new(collection, doc))
            .collect();

        let mut cx = repo.connection();
        let inserted = super::documents_create(&mut cx, &records).await?;
        trace!("inserted {} documents into `{}`", inserted, collection);

        Ok(records.into_iter().map(|r| r.document_uuid).collect())
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>, Error> {
        let repo = self.ready().await?;
        let mut cx = repo.connection();

        super::documents_find(&mut cx, collection, query)
            .await?
            .into_iter()
            .map(sql_models::DocumentRecord::into_document)
            .collect()
    }

    async fn find_by_id(&self, collection: &str, id: DocumentId) -> Result<Option<Document>, Error> {
        let repo = self.ready().await?;
        let mut cx = repo.connection();

        super::document_find_by_uuid(&mut cx, collection, &id)
            .await?
            .map(sql_models::DocumentRecord::into_document)
            .transpose()
    }

    async fn count(&self, collection: &str, filter: &query::Filter) -> Result<usize, Error> {
        let repo = self.ready().await?;
        let mut cx = repo.connection();

        let n = super::documents_count(&mut cx, collection, filter).await?;
        Ok(n.max(0) as usize)
    }

    async fn replace_by_id(&self, collection: &str, id: DocumentId, doc: Document) -> Result<bool, Error> {
        let repo = self.ready().await?;
        let mut cx = repo.connection();

        let record = sql_models::DocumentRecord::new(collection, doc);
        let updated = super::document_update_body(&mut cx, collection, &id, record.body()).await?;
        Ok(updated > 0)
    }

    async fn delete_by_id(&self, collection: &str, id: DocumentId) -> Result<bool, Error> {
        let repo = self.ready().await?;
        let mut cx = repo.connection();

        Ok(super::document_delete(&mut cx, collection, &id).await? > 0)
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool, Error> {
        let repo = self.ready().await?;
        let mut tx = repo.transaction().await?;

        let indexes = super::collection_indexes_delete(&mut tx, collection).await?;
        let deleted = super::collection_delete(&mut tx, collection).await?;
        tx.commit().await?;

        trace!(
            "dropped collection `{}` ({} documents, {} indexes)",
            collection, deleted, indexes
        );
        Ok(deleted > 0)
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<(), Error> {
        let repo = self.ready().await?;
        let mut cx = repo.connection();

        for existing in super::collection_indexes(&mut cx, collection).await? {
            if existing.spec()? == *spec {
                trace!("index already exists on `{}`", collection);
                return Ok(());
            }
        }

        for field in spec.geo_fields() {
            let invalid = super::documents_count_invalid_geojson(&mut cx, collection, field).await?;
            if invalid > 0 {
                return Err(Error::IndexCreation {
                    field: field.to_owned(),
                    msg: format!("{invalid} values are not valid GeoJSON objects"),
                });
            }
        }

        let record = sql_models::CollectionIndexRecord::try_new(collection, spec)?;
        let mut tx = repo.transaction().await?;
        super::collection_index_create(&mut tx, &record)
            .await
            .map_err(|e| Error::IndexCreation {
                field: spec
                    .keys
                    .iter()
                    .map(|k| k.field.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                msg: e.to_string(),
            })?;
        tx.commit().await?;

        Ok(())
    }
}
