//! Flat-document strategy: arbitrary structured data wrapped in a document.
use async_trait::async_trait;
use log::trace;

use super::{Backend, Context, Error, GetOptions, Outcome, PutOptions};
use crate::catalog::{Location, MetadataRecord, MetadataUpdate};
use crate::params;
use crate::repo::{Document, FindQuery};
use crate::types::{Kind, Object, Retrieved};

pub struct DocumentBackend;

impl DocumentBackend {
    async fn stored(cx: &Context, record: &MetadataRecord) -> Result<Option<Document>, Error> {
        let Location::Collection { name, objid } = record.location()? else {
            return Err(Error::MalformedMetadata {
                name: record.name.clone(),
                msg: "document stored as a blob".to_owned(),
            });
        };

        match objid {
            Some(id) => Ok(cx.db.find_by_id(&name, id).await?),
            None => Ok(cx
                .db
                .find(&name, &FindQuery::new().with_limit(1))
                .await?
                .into_iter()
                .next()),
        }
    }
}

#[async_trait]
impl Backend for DocumentBackend {
    fn kinds(&self) -> Vec<Kind> {
        vec![Kind::DOCUMENT]
    }

    fn supports(&self, obj: &Object, _name: &str, _options: &PutOptions) -> bool {
        obj.is_composite()
    }

    /// Appends unless `append` is explicitly false
    async fn put(&self, cx: &Context, obj: Object, name: &str, options: &PutOptions) -> Result<Outcome, Error> {
        let value = match obj {
            Object::Data(value) if value.is_object() || value.is_array() => value,
            other => return Err(Error::UnsupportedType(other.type_name().to_owned())),
        };

        let mut doc = Document::new();
        doc.insert(params::DOCUMENT_PAYLOAD_FIELD.to_owned(), value);

        let collection = cx.collection_name(name);
        if options.append == Some(false) {
            trace!("replacing `{}`", collection);
            cx.db.drop_collection(&collection).await?;
        }

        let objid = match cx.db.insert_many(&collection, vec![doc]).await {
            Ok(ids) => ids.into_iter().next(),
            Err(e) => {
                if options.append == Some(false) {
                    cx.forget(name, &collection).await?;
                }
                return Err(e.into());
            }
        };

        let update = MetadataUpdate::new(
            name,
            Kind::DOCUMENT,
            Location::Collection {
                name: collection,
                objid,
            },
        );

        Ok(Outcome::stored(update))
    }

    async fn get(&self, cx: &Context, record: &MetadataRecord, _options: &GetOptions) -> Result<Retrieved, Error> {
        let payload = Self::stored(cx, record)
            .await?
            .and_then(|mut doc| doc.remove(params::DOCUMENT_PAYLOAD_FIELD))
            .ok_or_else(|| Error::NotFound(format!("document of `{}`", record.name)))?;
        Ok(Retrieved::Data(payload))
    }

    async fn get_raw(&self, cx: &Context, record: &MetadataRecord, options: &GetOptions) -> Result<Retrieved, Error> {
        self.get(cx, record, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::testing;
    use crate::query::Filter;
    use serde_json::json;

    #[tokio::test]
    async fn payload_roundtrip() {
        let cx = testing::context("data");
        let value = json!({"layers": [64, 32], "activation": {"name": "relu"}});

        let (record, _) = testing::put(&DocumentBackend, &cx, value.clone(), "cfg", &PutOptions::new()).await;
        let record = record.unwrap();

        let back = DocumentBackend
            .get(&cx, &record, &GetOptions::new())
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(back, value);
    }

    #[tokio::test]
    async fn append_or_replace() {
        let cx = testing::context("data");
        let collection = cx.collection_name("log");

        testing::put(&DocumentBackend, &cx, json!([1]), "log", &PutOptions::new()).await;
        let (record, _) = testing::put(&DocumentBackend, &cx, json!([2]), "log", &PutOptions::new()).await;
        assert_eq!(cx.db.count(&collection, &Filter::new()).await.unwrap(), 2);

        // the record points at the latest document
        let back = DocumentBackend
            .get(&cx, &record.unwrap(), &GetOptions::new())
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(back, json!([2]));

        testing::put(&DocumentBackend, &cx, json!([3]), "log", &PutOptions::new().with_append(false)).await;
        assert_eq!(cx.db.count(&collection, &Filter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scalars_rejected() {
        let cx = testing::context("data");
        let err = DocumentBackend
            .put(&cx, json!(1).into(), "x", &PutOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(_)));
    }
}
