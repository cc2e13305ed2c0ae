//! Model strategy: a packaged model stored as a compressed blob.
use async_trait::async_trait;
use log::trace;
use serde_json::json;

use super::{Backend, Context, Error, GetOptions, Outcome, PutOptions};
use crate::catalog::{Location, MetadataRecord, MetadataUpdate};
use crate::types::{Kind, Object, Retrieved};
use crate::{params, rw, store};

pub struct ModelBackend;

impl ModelBackend {
    async fn read(cx: &Context, record: &MetadataRecord) -> Result<bytes::Bytes, Error> {
        let Location::Blob { key } = record.location()? else {
            return Err(Error::MalformedMetadata {
                name: record.name.clone(),
                msg: "model stored as documents".to_owned(),
            });
        };

        match cx.blobs.read(cx.bucket(), &key).await {
            Ok(content) => Ok(content),
            Err(store::Error::NotFound(path)) => Err(Error::NotFound(path)),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Backend for ModelBackend {
    fn kinds(&self) -> Vec<Kind> {
        vec![Kind::MODEL]
    }

    fn supports(&self, obj: &Object, _name: &str, _options: &PutOptions) -> bool {
        matches!(obj, Object::Model(_))
    }

    async fn put(&self, cx: &Context, obj: Object, name: &str, _options: &PutOptions) -> Result<Outcome, Error> {
        let model = match obj {
            Object::Model(model) => model,
            other => return Err(Error::UnsupportedType(other.type_name().to_owned())),
        };

        let content = rw::encode_model(&model)?;
        let key = cx.blob_key(name, params::ext::MODEL);

        trace!("writing {} bytes model to `{}`", content.len(), key);
        cx.blobs.write(cx.bucket(), &key, content).await?;

        let update = MetadataUpdate::new(name, Kind::MODEL, Location::Blob { key })
            .with_kind_meta(json!({ "estimator": model.estimator }));

        Ok(Outcome::stored(update))
    }

    async fn get(&self, cx: &Context, record: &MetadataRecord, _options: &GetOptions) -> Result<Retrieved, Error> {
        let content = Self::read(cx, record).await?;
        Ok(Retrieved::Model(rw::decode_model(&content)?))
    }

    async fn get_raw(&self, cx: &Context, record: &MetadataRecord, _options: &GetOptions) -> Result<Retrieved, Error> {
        Ok(Retrieved::Blob(Self::read(cx, record).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::testing;
    use crate::types::Model;

    #[tokio::test]
    async fn model_roundtrip() {
        let cx = testing::context("models");
        let model = Model::new("random_forest")
            .with_param("n_estimators", "100")
            .with_state(vec![1, 2, 3]);

        let (record, _) = testing::put(&ModelBackend, &cx, model.clone(), "rf", &PutOptions::new()).await;
        let record = record.unwrap();
        assert_eq!(
            record.location().unwrap(),
            Location::Blob {
                key: "store.models.rf.omm".to_owned()
            }
        );
        assert_eq!(record.kind_meta, json!({"estimator": "random_forest"}));

        let back = ModelBackend
            .get(&cx, &record, &GetOptions::new())
            .await
            .unwrap()
            .into_model()
            .unwrap();
        assert_eq!(back, model);

        let raw = ModelBackend
            .get_raw(&cx, &record, &GetOptions::new())
            .await
            .unwrap()
            .into_blob()
            .unwrap();
        assert_eq!(rw::decode_model(&raw).unwrap(), model);
    }

    #[tokio::test]
    async fn overwrites_blob() {
        let cx = testing::context("models");
        testing::put(&ModelBackend, &cx, Model::new("a"), "m", &PutOptions::new()).await;
        let (record, _) = testing::put(&ModelBackend, &cx, Model::new("b"), "m", &PutOptions::new()).await;

        let back = ModelBackend
            .get(&cx, &record.unwrap(), &GetOptions::new())
            .await
            .unwrap()
            .into_model()
            .unwrap();
        assert_eq!(back.estimator, "b");
        assert_eq!(cx.blobs.keys("store").await.unwrap(), vec!["store.models.m.omm"]);
    }
}
