//! Grouped-document strategy: one document per distinct group key.
use async_trait::async_trait;
use log::{debug, trace, warn};

use super::{Backend, Context, Error, GetOptions, Outcome, PutOptions, Warning, select_columns};
use crate::catalog::{Location, MetadataRecord, MetadataUpdate};
use crate::marshal::{self, GroupsKindMeta};
use crate::query::Filter;
use crate::repo::{Document, FindQuery};
use crate::params;
use crate::types::{Kind, Object, Retrieved};

pub struct GroupsBackend;

impl GroupsBackend {
    fn collection(record: &MetadataRecord) -> Result<String, Error> {
        match record.location()? {
            Location::Collection { name, .. } => Ok(name),
            Location::Blob { .. } => Err(Error::MalformedMetadata {
                name: record.name.clone(),
                msg: "grouped documents stored as a blob".to_owned(),
            }),
        }
    }

    /// Group key fields are matched on the group document, any other field
    /// on the elements of its nested rows.
    fn stored_filter(filter: &Filter, meta: &GroupsKindMeta) -> Result<Filter, Error> {
        let filter = filter
            .clone()
            .map_roots(|root| meta.stored_name(root).map(str::to_owned));
        Ok(filter.nest_into(params::GROUP_DATA_FIELD, |root| meta.is_key(root))?)
    }

    async fn find(
        cx: &Context,
        record: &MetadataRecord,
        options: &GetOptions,
    ) -> Result<(Vec<Document>, GroupsKindMeta), Error> {
        let meta = GroupsKindMeta::from_value(&record.kind_meta)?;
        let collection = Self::collection(record)?;
        let query = FindQuery::new().with_filter(Self::stored_filter(&options.filter, &meta)?);

        let docs = cx.db.find(&collection, &query).await?;
        trace!("found {} groups in `{}`", docs.len(), collection);
        Ok((docs, meta))
    }
}

#[async_trait]
impl Backend for GroupsBackend {
    fn kinds(&self) -> Vec<Kind> {
        vec![Kind::FRAME_GROUPS]
    }

    fn supports(&self, obj: &Object, _name: &str, options: &PutOptions) -> bool {
        obj.is_tabular() && options.groupby.is_some()
    }

    async fn put(&self, cx: &Context, obj: Object, name: &str, options: &PutOptions) -> Result<Outcome, Error> {
        let df = match obj {
            Object::Frame(df) => df,
            Object::Series(series) => series.into_frame()?,
            other => return Err(Error::UnsupportedType(other.type_name().to_owned())),
        };
        let groupby = options
            .groupby
            .as_deref()
            .filter(|g| !g.is_empty())
            .ok_or_else(|| Error::InvalidOption("grouped documents need groupby columns".to_owned()))?;

        if df.is_empty() {
            warn!("`{}` is empty, nothing stored", name);
            return Ok(Outcome::skipped(Warning::EmptyInput { name: name.to_owned() }));
        }

        let (docs, meta) = marshal::frame_to_group_documents(&df, groupby)?;

        // groups are always replaced as a whole
        let collection = cx.collection_name(name);
        cx.db.drop_collection(&collection).await?;

        trace!("inserting {} groups into `{}`", docs.len(), collection);
        cx.db.insert_many(&collection, docs).await?;

        let update = MetadataUpdate::new(
            name,
            Kind::FRAME_GROUPS,
            Location::Collection {
                name: collection,
                objid: None,
            },
        )
        .with_kind_meta(meta.to_value()?);

        Ok(Outcome::stored(update))
    }

    async fn get(&self, cx: &Context, record: &MetadataRecord, options: &GetOptions) -> Result<Retrieved, Error> {
        if options.lazy {
            debug!("grouped documents of `{}` are read eagerly", record.name);
        }

        let (docs, meta) = Self::find(cx, record, options).await?;
        let df = marshal::group_documents_to_frame(&docs, &meta)?;
        Ok(Retrieved::Frame(select_columns(df, options.columns.as_deref())?))
    }

    async fn get_raw(&self, cx: &Context, record: &MetadataRecord, options: &GetOptions) -> Result<Retrieved, Error> {
        let (docs, _) = Self::find(cx, record, options).await?;
        Ok(Retrieved::Documents(docs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::testing;
    use crate::types::DataFrame;
    use arrow::array::{Array, ArrayRef, Int64Array, StringArray};
    use std::sync::Arc;

    fn frame() -> DataFrame {
        DataFrame::try_from_columns([
            ("g", Arc::new(StringArray::from(vec!["a", "b", "a", "b", "c"])) as ArrayRef),
            ("x", Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5])) as ArrayRef),
        ])
        .unwrap()
    }

    fn column<T: 'static>(df: &DataFrame, name: &str) -> T
    where
        T: Clone,
    {
        df.column(name)
            .unwrap()
            .as_any()
            .downcast_ref::<T>()
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn grouped_roundtrip() {
        let cx = testing::context("data");
        let options = PutOptions::new().with_groupby(&["g"]);

        let (record, _) = testing::put(&GroupsBackend, &cx, frame(), "grp", &options).await;
        let record = record.unwrap();
        assert_eq!(record.kind, Kind::FRAME_GROUPS);
        assert_eq!(
            cx.db
                .count(&cx.collection_name("grp"), &Filter::new())
                .await
                .unwrap(),
            3
        );

        let back = GroupsBackend
            .get(&cx, &record, &GetOptions::new())
            .await
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(back.column_names(), vec!["g", "x"]);
        assert_eq!(
            column::<StringArray>(&back, "g"),
            StringArray::from(vec!["a", "a", "b", "b", "c"])
        );
        assert_eq!(
            column::<Int64Array>(&back, "x"),
            Int64Array::from(vec![1, 3, 2, 4, 5])
        );
    }

    #[tokio::test]
    async fn replaced_on_every_put() {
        let cx = testing::context("data");
        let options = PutOptions::new().with_groupby(&["g"]);

        testing::put(&GroupsBackend, &cx, frame(), "grp", &options).await;
        let (record, _) = testing::put(&GroupsBackend, &cx, frame(), "grp", &options).await;

        let back = GroupsBackend
            .get(&cx, &record.unwrap(), &GetOptions::new())
            .await
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(back.num_rows(), 5);
    }

    #[tokio::test]
    async fn filters_translate_to_groups() {
        let cx = testing::context("data");
        let options = PutOptions::new().with_groupby(&["g"]);
        let (record, _) = testing::put(&GroupsBackend, &cx, frame(), "grp", &options).await;
        let record = record.unwrap();

        // key field, matched on the group
        let by_key = GetOptions::new().with_filter(Filter::new().eq("g", "b").unwrap());
        let back = GroupsBackend
            .get(&cx, &record, &by_key)
            .await
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(column::<Int64Array>(&back, "x"), Int64Array::from(vec![2, 4]));

        // data field, any row of the group matching selects the group
        let by_row = GetOptions::new()
            .with_filter(Filter::new().gt("x", 4).unwrap())
            .with_columns(&["x"]);
        let back = GroupsBackend
            .get(&cx, &record, &by_row)
            .await
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(back.column_names(), vec!["x"]);
        assert_eq!(column::<Int64Array>(&back, "x"), Int64Array::from(vec![5]));

        let raw = GroupsBackend
            .get_raw(&cx, &record, &GetOptions::new())
            .await
            .unwrap()
            .into_documents()
            .unwrap();
        assert_eq!(raw.len(), 3);
        assert!(raw[0].contains_key(params::GROUP_DATA_FIELD));
    }

    #[tokio::test]
    async fn dotted_columns_filter() {
        let cx = testing::context("data");
        let df = DataFrame::try_from_columns([
            ("site.id", Arc::new(StringArray::from(vec!["a", "b", "a"])) as ArrayRef),
            ("unit.price", Arc::new(Int64Array::from(vec![1, 5, 3])) as ArrayRef),
        ])
        .unwrap();

        let options = PutOptions::new().with_groupby(&["site.id"]);
        let (record, _) = testing::put(&GroupsBackend, &cx, df, "grp", &options).await;
        let record = record.unwrap();

        let by_row = GetOptions::new().with_filter(Filter::new().gt("unit.price", 4).unwrap());
        let back = GroupsBackend
            .get(&cx, &record, &by_row)
            .await
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(column::<StringArray>(&back, "site.id"), StringArray::from(vec!["b"]));

        let by_key = GetOptions::new().with_filter(Filter::new().eq("site.id", "a").unwrap());
        let back = GroupsBackend
            .get(&cx, &record, &by_key)
            .await
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(column::<Int64Array>(&back, "unit.price"), Int64Array::from(vec![1, 3]));
    }

    #[tokio::test]
    async fn groupby_required() {
        let cx = testing::context("data");
        let err = GroupsBackend
            .put(&cx, frame().into(), "grp", &PutOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOption(_)));

        let err = GroupsBackend
            .put(&cx, frame().into(), "grp", &PutOptions::new().with_groupby(&["nope"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Marshal(marshal::Error::MissingColumn(c)) if c == "nope"));
    }
}
