//! Binary-container strategy: a table packaged as a Parquet blob.
use async_trait::async_trait;
use log::{trace, warn};
use serde_json::json;

use super::{Backend, Context, Error, GetOptions, Outcome, PutOptions, Warning, select_columns, tabular};
use crate::catalog::{Location, MetadataRecord, MetadataUpdate};
use crate::types::{Kind, Object, Retrieved};
use crate::{rw, store, traits::AsExtension};

/// `kind_meta` key recording the input shape, series are returned as such
const SOURCE_FIELD: &str = "source";

pub struct ParquetBackend;

impl ParquetBackend {
    fn blob_key(record: &MetadataRecord) -> Result<String, Error> {
        match record.location()? {
            Location::Blob { key } => Ok(key),
            Location::Collection { .. } => Err(Error::MalformedMetadata {
                name: record.name.clone(),
                msg: "binary container stored as documents".to_owned(),
            }),
        }
    }

    async fn read(cx: &Context, record: &MetadataRecord) -> Result<bytes::Bytes, Error> {
        let key = Self::blob_key(record)?;
        match cx.blobs.read(cx.bucket(), &key).await {
            Ok(content) => Ok(content),
            Err(store::Error::NotFound(path)) => Err(Error::NotFound(path)),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Backend for ParquetBackend {
    fn kinds(&self) -> Vec<Kind> {
        vec![Kind::FRAME_PARQUET]
    }

    fn supports(&self, obj: &Object, _name: &str, _options: &PutOptions) -> bool {
        obj.is_tabular() || obj.is_composite() || matches!(obj, Object::Array(_))
    }

    async fn put(&self, cx: &Context, obj: Object, name: &str, options: &PutOptions) -> Result<Outcome, Error> {
        let source = obj.type_name();
        let empty = match &obj {
            Object::Array(arr) => arr.is_empty(),
            _ => false,
        };
        let df = tabular(obj)?;

        if empty || df.is_empty() {
            warn!("`{}` is empty, nothing stored", name);
            return Ok(Outcome::skipped(Warning::EmptyInput { name: name.to_owned() }));
        }

        let content = rw::frame_to_container(&df, options.format)?;
        let key = cx.blob_key(name, &options.format.as_extension());

        trace!("writing {} bytes container to `{}`", content.len(), key);
        cx.blobs.write(cx.bucket(), &key, content).await?;

        let update = MetadataUpdate::new(name, Kind::FRAME_PARQUET, Location::Blob { key })
            .with_kind_meta(json!({
                "format": options.format.to_string(),
                SOURCE_FIELD: source,
            }));

        Ok(Outcome::stored(update))
    }

    async fn get(&self, cx: &Context, record: &MetadataRecord, options: &GetOptions) -> Result<Retrieved, Error> {
        let content = Self::read(cx, record).await?;
        let df = select_columns(rw::container_to_frame(content)?, options.columns.as_deref())?;

        let is_series = record
            .kind_meta
            .get(SOURCE_FIELD)
            .and_then(|s| s.as_str())
            .is_some_and(|s| s == "series");

        if is_series && df.num_columns() == 1 {
            Ok(Retrieved::Series(df.into_series()?))
        } else {
            Ok(Retrieved::Frame(df))
        }
    }

    async fn get_raw(&self, cx: &Context, record: &MetadataRecord, _options: &GetOptions) -> Result<Retrieved, Error> {
        Ok(Retrieved::Blob(Self::read(cx, record).await?))
    }
}
