//! Row-document strategy: one document per row.
use async_trait::async_trait;
use log::{trace, warn};

use super::{Backend, Context, Error, GetOptions, Outcome, PutOptions, Warning, with_timestamp};
use crate::catalog::{Location, MetadataRecord, MetadataUpdate};
use crate::marshal::{self, RowsKindMeta};
use crate::query::LazyFrame;
use crate::repo::{self, Document, IndexSpec};
use crate::types::{Kind, Object, Retrieved};

pub struct RowsBackend;

impl RowsBackend {
    fn lazy_frame(cx: &Context, record: &MetadataRecord, options: &GetOptions) -> Result<LazyFrame, Error> {
        let meta = RowsKindMeta::from_value(&record.kind_meta)?;
        let collection = match record.location()? {
            Location::Collection { name, .. } => name,
            Location::Blob { .. } => {
                return Err(Error::MalformedMetadata {
                    name: record.name.clone(),
                    msg: "row documents stored as a blob".to_owned(),
                });
            }
        };

        let lazy = LazyFrame::new(cx.db.clone(), &collection, meta)
            .as_series(record.kind == Kind::SERIES_ROWS)
            .filter(options.filter.clone());

        Ok(match &options.columns {
            Some(columns) => lazy.select(columns),
            None => lazy,
        })
    }

    fn check_geo_fields(spec: &IndexSpec, docs: &[Document]) -> Result<(), Error> {
        for field in spec.geo_fields() {
            if docs
                .iter()
                .filter_map(|doc| doc.get(field))
                .any(|v| !repo::is_geojson(v))
            {
                return Err(repo::Error::IndexCreation {
                    field: field.to_owned(),
                    msg: "values must be GeoJSON objects".to_owned(),
                }
                .into());
            }
        }
        Ok(())
    }

    async fn write(
        cx: &Context,
        collection: &str,
        spec: Option<IndexSpec>,
        meta: &RowsKindMeta,
        docs: Vec<Document>,
    ) -> Result<(), Error> {
        if let Some(spec) = spec {
            cx.db.create_index(collection, &spec).await?;
        }

        let idx_columns: Vec<&str> = meta.idx_meta.columns().collect();
        if !idx_columns.is_empty() {
            cx.db
                .create_index(collection, &IndexSpec::ascending(&idx_columns))
                .await?;
        }

        trace!("inserting {} rows into `{}`", docs.len(), collection);
        cx.db.insert_many(collection, docs).await?;
        Ok(())
    }

    /// `kind_meta` describing the documents already in the collection
    async fn previous_meta(cx: &Context, name: &str) -> Result<Option<RowsKindMeta>, Error> {
        match cx.catalog.find(name).await? {
            Some(record) if record.kind.is_rows() => Ok(Some(RowsKindMeta::from_value(&record.kind_meta)?)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Backend for RowsBackend {
    fn kinds(&self) -> Vec<Kind> {
        vec![Kind::FRAME_ROWS, Kind::SERIES_ROWS]
    }

    fn supports(&self, obj: &Object, _name: &str, _options: &PutOptions) -> bool {
        obj.is_tabular()
    }

    async fn put(&self, cx: &Context, obj: Object, name: &str, options: &PutOptions) -> Result<Outcome, Error> {
        let (df, kind) = match obj {
            Object::Frame(df) => (df, Kind::FRAME_ROWS),
            Object::Series(series) => (series.into_frame()?, Kind::SERIES_ROWS),
            other => return Err(Error::UnsupportedType(other.type_name().to_owned())),
        };

        if df.is_empty() {
            warn!("`{}` is empty, nothing stored", name);
            return Ok(Outcome::skipped(Warning::EmptyInput { name: name.to_owned() }));
        }

        let df = with_timestamp(df, options.timestamp.as_ref())?;
        let (docs, meta) = marshal::frame_to_documents(&df)?;

        let spec = options.index_spec(|column| {
            meta.stored_name(column)
                .map(str::to_owned)
                .unwrap_or_else(|| marshal::escape_key(column))
        })?;
        if let Some(spec) = &spec {
            Self::check_geo_fields(spec, &docs)?;
        }

        // existing rows are only touched once the new ones are known to be valid
        let collection = cx.collection_name(name);
        let mut warnings = Vec::new();
        let mut previous = None;

        match options.append {
            Some(false) => {
                trace!("replacing `{}`", collection);
                cx.db.drop_collection(&collection).await?;
            }
            Some(true) => previous = Self::previous_meta(cx, name).await?,
            None => {
                if cx.db.exists(&collection).await? {
                    let warning = Warning::AmbiguousAppend { name: name.to_owned() };
                    warn!("{}", warning);
                    warnings.push(warning);
                    previous = Self::previous_meta(cx, name).await?;
                }
            }
        }

        if let Err(e) = Self::write(cx, &collection, spec, &meta, docs).await {
            if options.append == Some(false) {
                cx.forget(name, &collection).await?;
            }
            return Err(e);
        }

        let meta = match previous {
            Some(previous) => previous.union(&meta),
            None => meta,
        };

        let update = MetadataUpdate::new(
            name,
            kind,
            Location::Collection {
                name: collection,
                objid: None,
            },
        )
        .with_kind_meta(meta.to_value()?);

        Ok(Outcome::stored(update).with_warnings(warnings))
    }

    async fn get(&self, cx: &Context, record: &MetadataRecord, options: &GetOptions) -> Result<Retrieved, Error> {
        let lazy = Self::lazy_frame(cx, record, options)?;
        if options.lazy {
            return Ok(Retrieved::Lazy(lazy));
        }
        Ok(lazy.materialize().await?)
    }

    async fn get_raw(&self, cx: &Context, record: &MetadataRecord, options: &GetOptions) -> Result<Retrieved, Error> {
        let lazy = Self::lazy_frame(cx, record, options)?;
        Ok(Retrieved::Documents(lazy.documents().await?))
    }
}
