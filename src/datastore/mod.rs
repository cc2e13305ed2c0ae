//! Datastore, the storage engine entry point.
//!
//! A [`Datastore`] is bound to one (bucket, prefix) scope. It dispatches
//! every `put` to a backend, commits the metadata returned by the backend
//! once the physical write succeeded and reads objects back through the
//! backend owning their kind.
use log::{debug, info, trace, warn};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::backends::{BackendRef, BackendRegistry, Context, GetOptions, PutOptions, Warning};
use crate::catalog::{Catalog, Location, MetadataRecord, NameMatcher, StoreKeys};
use crate::connection::Connection;
use crate::params;
use crate::types::{Attributes, Kind, Object, Retrieved};

mod error;
pub use error::*;

/// Hooks notified by the datastore, e.g. for auditing or cache invalidation
pub trait Observer: Send + Sync {
    /// Called once the metadata of `name` was committed
    fn on_put(&self, _name: &str, _record: &MetadataRecord) {}

    /// Called after `name` was successfully read
    fn on_get(&self, _name: &str) {}

    fn on_warning(&self, _warning: &Warning) {}
}

pub type ObserverRef = Arc<dyn Observer>;

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pattern: Option<String>,
    regexp: Option<String>,
    kinds: Vec<Kind>,
    include_temp: bool,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shell glob over names, e.g. `a*`
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_owned());
        self
    }

    /// Regular expression matched at the start of names, takes precedence
    /// over the glob pattern
    pub fn with_regexp(mut self, regexp: &str) -> Self {
        self.regexp = Some(regexp.to_owned());
        self
    }

    pub fn with_kinds(mut self, kinds: &[Kind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn include_temp(mut self) -> Self {
        self.include_temp = true;
        self
    }

    fn matcher(&self) -> Result<NameMatcher, DatastoreError> {
        Ok(NameMatcher::new(
            self.pattern.as_deref(),
            self.regexp.as_deref(),
        )?)
    }
}

type Extensions = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

pub struct DatastoreBuilder {
    connection: Option<Arc<Connection>>,
    bucket: Option<String>,
    prefix: String,
    kinds: Vec<Kind>,
    registry: BackendRegistry,
    extensions: Extensions,
    observers: Vec<ObserverRef>,
}

impl Default for DatastoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DatastoreBuilder {
    pub fn new() -> Self {
        Self {
            connection: None,
            bucket: None,
            prefix: params::DEFAULT_PREFIX.to_owned(),
            kinds: Vec::new(),
            registry: BackendRegistry::new(),
            extensions: HashMap::new(),
            observers: Vec::new(),
        }
    }

    /// Shares `connection` with other datastores, e.g. one per prefix
    pub fn with_connection(mut self, connection: Arc<Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn with_urls(self, database_url: &str, blob_url: &str) -> Self {
        self.with_connection(Arc::new(Connection::new(database_url, blob_url)))
    }

    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.bucket = Some(bucket.to_owned());
        self
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_owned();
        self
    }

    /// Restricts listing to `kinds` unless a listing asks for others
    pub fn with_kinds(mut self, kinds: &[Kind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn with_backend(mut self, kind: Kind, backend: BackendRef) -> Self {
        self.registry.register(kind, backend);
        self
    }

    pub fn with_extension<T: Any + Send + Sync>(mut self, extension: T) -> Self {
        self.extensions.insert(TypeId::of::<T>(), Box::new(extension));
        self
    }

    pub fn with_observer(mut self, observer: ObserverRef) -> Self {
        self.observers.push(observer);
        self
    }

    /// Builds the datastore, missing connection and bucket are taken from
    /// the process configurables. No connection is established here.
    pub fn build(self) -> Datastore {
        let bucket = self
            .bucket
            .unwrap_or_else(|| params::configurables().default_bucket.clone());
        let connection = self
            .connection
            .unwrap_or_else(|| Arc::new(Connection::from_configurables()));

        Datastore {
            connection,
            keys: StoreKeys::new(&bucket, &self.prefix),
            kinds: self.kinds,
            registry: self.registry,
            extensions: self.extensions,
            observers: self.observers,
        }
    }
}

pub struct Datastore {
    connection: Arc<Connection>,
    keys: StoreKeys,
    kinds: Vec<Kind>,
    registry: BackendRegistry,
    extensions: Extensions,
    observers: Vec<ObserverRef>,
}

impl Datastore {
    pub fn builder() -> DatastoreBuilder {
        DatastoreBuilder::new()
    }

    pub fn bucket(&self) -> &str {
        self.keys.bucket()
    }

    pub fn prefix(&self) -> &str {
        self.keys.prefix()
    }

    pub fn kinds(&self) -> &[Kind] {
        &self.kinds
    }

    async fn context(&self) -> Result<Context, DatastoreError> {
        let db = self.connection.database().await?;
        let blobs = self.connection.blob_store().await?;
        let catalog = Catalog::new(db.clone(), self.keys.clone());
        Ok(Context::new(db, blobs, catalog))
    }

    fn notify_warnings(&self, warnings: &[Warning]) {
        for warning in warnings {
            self.observers.iter().for_each(|o| o.on_warning(warning));
        }
    }

    /// Stores `obj` as `name`.
    ///
    /// Returns `None` when nothing was stored, e.g. on empty input. The
    /// metadata is committed only after the physical write succeeded.
    pub async fn put(
        &self,
        obj: impl Into<Object>,
        name: &str,
        attributes: Option<Attributes>,
        options: &PutOptions,
    ) -> Result<Option<MetadataRecord>, DatastoreError> {
        info!("storing `{}` in {}.{}", name, self.bucket(), self.prefix());

        let obj = obj.into();
        let backend = self.registry.backend_for_object(&obj, name, options)?;
        trace!("`{}` handled by backend of {:?}", name, backend.kinds());

        let cx = self.context().await?;
        let outcome = backend.put(&cx, obj, name, options).await?;
        self.notify_warnings(&outcome.warnings);

        let Some(update) = outcome.update else {
            debug!("nothing stored for `{}`", name);
            return Ok(None);
        };

        let record = cx.catalog.upsert(update.with_attributes(attributes)).await?;
        self.observers.iter().for_each(|o| o.on_put(name, &record));

        Ok(Some(record))
    }

    /// Reads `name` back, `None` if nothing is stored under that name.
    pub async fn get(&self, name: &str, options: &GetOptions) -> Result<Option<Retrieved>, DatastoreError> {
        info!("reading `{}` from {}.{}", name, self.bucket(), self.prefix());

        let cx = self.context().await?;
        let Some(record) = cx.catalog.find(name).await? else {
            debug!("`{}` not found", name);
            return Ok(None);
        };

        let backend = self
            .registry
            .backend_for_kind(&record.kind)
            .ok_or_else(|| DatastoreError::UnsupportedKind(record.kind.clone()))?;

        let retrieved = if options.force_python {
            backend.get_raw(&cx, &record, options).await?
        } else {
            backend.get(&cx, &record, options).await?
        };

        self.observers.iter().for_each(|o| o.on_get(name));
        Ok(Some(retrieved))
    }

    /// Same as [`Datastore::get`] with lazy retrieval forced. Only row
    /// kinds defer their query, other kinds are materialized.
    pub async fn getl(&self, name: &str, options: &GetOptions) -> Result<Option<Retrieved>, DatastoreError> {
        self.get(name, &options.clone().lazy()).await
    }

    /// Metadata record of `name` in this scope
    pub async fn metadata(&self, name: &str) -> Result<Option<MetadataRecord>, DatastoreError> {
        Ok(self.context().await?.catalog.find(name).await?)
    }

    async fn records(&self, options: &ListOptions) -> Result<Vec<MetadataRecord>, DatastoreError> {
        let kinds = if options.kinds.is_empty() {
            &self.kinds
        } else {
            &options.kinds
        };

        let matcher = options.matcher()?;
        Ok(self
            .context()
            .await?
            .catalog
            .list(kinds)
            .await?
            .into_iter()
            .filter(|r| matcher.is_match(&r.name))
            .collect())
    }

    /// Sorted names of the stored objects matching `options`
    pub async fn list(&self, options: &ListOptions) -> Result<Vec<String>, DatastoreError> {
        let mut names: Vec<String> = self
            .records(options)
            .await?
            .into_iter()
            .map(|r| match r.name.strip_suffix(params::LIST_NAME_SUFFIX) {
                Some(stripped) => stripped.to_owned(),
                None => r.name,
            })
            .filter(|name| options.include_temp || !name.starts_with(params::TEMP_NAME_PREFIX))
            .collect();

        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Metadata records matching `options`, temporary objects included
    pub async fn list_raw(&self, options: &ListOptions) -> Result<Vec<MetadataRecord>, DatastoreError> {
        self.records(options).await
    }

    /// Deletes `name` with its payload.
    ///
    /// A missing name is an error unless `force` is set, in which case the
    /// derived collection is dropped anyway. The payload is removed before
    /// the metadata.
    pub async fn drop(&self, name: &str, force: bool) -> Result<bool, DatastoreError> {
        warn!("dropping `{}` from {}.{}", name, self.bucket(), self.prefix());

        let cx = self.context().await?;
        let record = cx.catalog.find(name).await?;
        if record.is_none() && !force {
            return Err(DatastoreError::NotFound(name.to_owned()));
        }

        let derived = cx.collection_name(name);
        if cx.db.drop_collection(&derived).await? {
            trace!("dropped collection `{}`", derived);
        }

        let Some(record) = record else {
            debug!("`{}` has no metadata, nothing else to drop", name);
            return Ok(true);
        };

        match record.location()? {
            Location::Collection { name: collection, .. } => {
                if collection != derived {
                    cx.db.drop_collection(&collection).await?;
                }
            }
            Location::Blob { key } => {
                cx.blobs.delete(cx.bucket(), &key).await?;
                trace!("deleted blob `{}`", key);
            }
        }

        cx.catalog.delete(&record).await?;
        Ok(true)
    }

    /// Binds `kind` to `backend`, the backend is asked first on every put
    pub fn register_backend(&mut self, kind: Kind, backend: BackendRef) {
        debug!("registering backend for kind `{}`", kind);
        self.registry.register(kind, backend);
    }

    pub fn register_extension<T: Any + Send + Sync>(&mut self, extension: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(extension));
    }

    pub fn extension<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|ext| ext.downcast_ref::<T>())
    }

    /// Backend reading the object stored as `name`
    pub async fn get_backend(&self, name: &str) -> Result<Option<BackendRef>, DatastoreError> {
        Ok(self
            .metadata(name)
            .await?
            .and_then(|record| self.registry.backend_for_kind(&record.kind)))
    }

    pub fn get_backend_by_kind(&self, kind: &Kind) -> Option<BackendRef> {
        self.registry.backend_for_kind(kind)
    }

    /// Blob key of `name` in this scope
    pub fn object_store_key(&self, name: &str, ext: &str) -> String {
        self.keys.key(name, ext)
    }

    /// Collection holding the documents of `name` in this scope
    pub fn collection_name(&self, name: &str) -> String {
        self.keys.collection_name(name)
    }

    pub async fn close(&self) {
        self.connection.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{Backend, Outcome};
    use crate::catalog::MetadataUpdate;
    use crate::query::Filter;
    use crate::types::{DataFrame, Index, IndexLevel, Model, Series};
    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn builder() -> DatastoreBuilder {
        init_logger();
        let db = format!("memory://ds{}", uuid::Uuid::new_v4().simple());
        Datastore::builder()
            .with_urls(&db, "memory:///")
            .with_bucket("store")
            .with_prefix("data")
    }

    fn datastore() -> Datastore {
        builder().build()
    }

    fn attrs(v: serde_json::Value) -> Option<Attributes> {
        v.as_object().cloned()
    }

    fn frame() -> DataFrame {
        DataFrame::try_from_columns([
            ("x", Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef),
            ("label", Arc::new(StringArray::from(vec!["a", "b", "c"])) as ArrayRef),
            ("score", Arc::new(Float64Array::from(vec![0.5, 1.5, 2.5])) as ArrayRef),
        ])
        .unwrap()
        .with_index(Index::new(vec![
            IndexLevel::new(Some("region"), Arc::new(StringArray::from(vec!["eu", "eu", "us"]))),
            IndexLevel::new(Some("id"), Arc::new(Int64Array::from(vec![10, 11, 12]))),
        ]))
        .unwrap()
    }

    #[tokio::test]
    async fn frame_roundtrip() {
        let store = datastore();
        let df = frame();

        let record = store
            .put(df.clone(), "sales", None, &PutOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.kind, Kind::FRAME_ROWS);
        assert_eq!(record.bucket, "store");
        assert_eq!(record.prefix, "data");

        let back = store
            .get("sales", &GetOptions::new())
            .await
            .unwrap()
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(back.column_names(), df.column_names());
        assert_eq!(back.data().columns(), df.data().columns());
        assert_eq!(back.index(), df.index());
    }

    #[tokio::test]
    async fn series_roundtrip() {
        let store = datastore();
        let series = Series::new(Some("temperature"), Arc::new(Float64Array::from(vec![20.5, 21.0])))
            .with_index(Index::single(Some("t"), Arc::new(Int64Array::from(vec![100, 200]))))
            .unwrap();

        let record = store
            .put(series.clone(), "temps", None, &PutOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.kind, Kind::SERIES_ROWS);

        let back = store
            .get("temps", &GetOptions::new())
            .await
            .unwrap()
            .unwrap()
            .into_series()
            .unwrap();
        assert_eq!(back, series);
    }

    #[tokio::test]
    async fn grouped_roundtrip() {
        let store = datastore();
        let df = DataFrame::try_from_columns([
            ("g", Arc::new(StringArray::from(vec!["a", "b", "a", "b"])) as ArrayRef),
            ("x", Arc::new(Int64Array::from(vec![1, 2, 3, 4])) as ArrayRef),
        ])
        .unwrap();

        let options = PutOptions::new().with_groupby(&["g"]);
        let record = store.put(df, "groups", None, &options).await.unwrap().unwrap();
        assert_eq!(record.kind, Kind::FRAME_GROUPS);

        let back = store
            .get("groups", &GetOptions::new())
            .await
            .unwrap()
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(back.column_names(), vec!["g", "x"]);

        // grouped, order within a group preserved
        let x = back.column("x").unwrap();
        let x = x.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(x.values().to_vec(), vec![1, 3, 2, 4]);
    }

    #[tokio::test]
    async fn attribute_merge_law() {
        let store = datastore();
        let data = json!({"a": 1});
        let none = PutOptions::new();

        store.put(data.clone(), "cfg", attrs(json!({"a": 1})), &none).await.unwrap();
        let record = store
            .put(data.clone(), "cfg", attrs(json!({"b": 2})), &none)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.attributes, attrs(json!({"a": 1, "b": 2})).unwrap());

        let record = store.put(data.clone(), "cfg", None, &none).await.unwrap().unwrap();
        assert_eq!(record.attributes, attrs(json!({"a": 1, "b": 2})).unwrap());

        let record = store
            .put(data.clone(), "cfg", attrs(json!({})), &none)
            .await
            .unwrap()
            .unwrap();
        assert!(record.attributes.is_empty());

        let stored = store.metadata("cfg").await.unwrap().unwrap();
        assert!(stored.attributes.is_empty());
    }

    #[tokio::test]
    async fn one_record_per_name() {
        let store = datastore();
        let first = store
            .put(frame(), "sales", None, &PutOptions::new())
            .await
            .unwrap()
            .unwrap();
        let second = store
            .put(frame(), "sales", None, &PutOptions::new().with_append(false))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created(), second.created());
        assert_eq!(store.list_raw(&ListOptions::new()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scopes_are_separate() {
        let connection = Arc::new(Connection::new(
            &format!("memory://ds{}", uuid::Uuid::new_v4().simple()),
            "memory:///",
        ));
        let a = Datastore::builder()
            .with_connection(connection.clone())
            .with_bucket("store")
            .with_prefix("data")
            .build();
        let b = Datastore::builder()
            .with_connection(connection)
            .with_bucket("store")
            .with_prefix("other")
            .build();

        a.put(json!({"v": 1}), "cfg", None, &PutOptions::new()).await.unwrap();
        assert!(b.get("cfg", &GetOptions::new()).await.unwrap().is_none());
        assert_eq!(a.list(&ListOptions::new()).await.unwrap(), vec!["cfg"]);
        assert!(b.list(&ListOptions::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn drop_missing() {
        let store = datastore();
        assert!(store.drop("missing", true).await.unwrap());
        assert!(matches!(
            store.drop("missing", false).await,
            Err(DatastoreError::NotFound(name)) if name == "missing"
        ));
    }

    #[tokio::test]
    async fn drop_removes_payload() {
        let store = datastore();
        store.put(frame(), "rows", None, &PutOptions::new()).await.unwrap();
        store.put(Model::new("svm"), "model", None, &PutOptions::new()).await.unwrap();

        let cx = store.context().await.unwrap();
        let collection = store.collection_name("rows");
        assert!(cx.db.exists(&collection).await.unwrap());
        let key = store.object_store_key("model", params::ext::MODEL);
        assert!(cx.blobs.exists("store", &key).await.unwrap());

        assert!(store.drop("rows", false).await.unwrap());
        assert!(store.drop("model", false).await.unwrap());

        assert!(!cx.db.exists(&collection).await.unwrap());
        assert!(!cx.blobs.exists("store", &key).await.unwrap());
        assert!(store.metadata("rows").await.unwrap().is_none());
        assert!(store.get("model", &GetOptions::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn forced_drop_of_orphan_collection() {
        let store = datastore();
        let cx = store.context().await.unwrap();
        let collection = store.collection_name("orphan");
        cx.db
            .insert_many(&collection, vec![json!({"a": 1}).as_object().cloned().unwrap()])
            .await
            .unwrap();

        assert!(store.drop("orphan", true).await.unwrap());
        assert!(!cx.db.exists(&collection).await.unwrap());
    }

    #[tokio::test]
    async fn list_by_pattern() {
        let store = datastore();
        for name in ["abc", "abd", "zzz", "_temp_abx"] {
            store.put(json!({"n": name}), name, None, &PutOptions::new()).await.unwrap();
        }

        let names = store.list(&ListOptions::new().with_pattern("a*")).await.unwrap();
        assert_eq!(names, vec!["abc", "abd"]);

        let names = store.list(&ListOptions::new()).await.unwrap();
        assert_eq!(names, vec!["abc", "abd", "zzz"]);

        let names = store.list(&ListOptions::new().include_temp()).await.unwrap();
        assert_eq!(names, vec!["_temp_abx", "abc", "abd", "zzz"]);

        // regexp takes precedence over the pattern
        let names = store
            .list(&ListOptions::new().with_pattern("a*").with_regexp("z+"))
            .await
            .unwrap();
        assert_eq!(names, vec!["zzz"]);

        assert_eq!(store.list_raw(&ListOptions::new()).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn list_strips_suffix_and_filters_kinds() {
        let store = builder().with_kinds(&[Kind::MODEL]).build();
        store.put(Model::new("svm"), "clf.omm", None, &PutOptions::new()).await.unwrap();
        store.put(frame(), "sales", None, &PutOptions::new()).await.unwrap();

        assert_eq!(store.list(&ListOptions::new()).await.unwrap(), vec!["clf"]);

        let names = store
            .list(&ListOptions::new().with_kinds(&[Kind::FRAME_ROWS]))
            .await
            .unwrap();
        assert_eq!(names, vec!["sales"]);
    }

    #[tokio::test]
    async fn empty_put_stores_nothing() {
        let store = datastore();
        let empty = DataFrame::try_from_columns([("x", Arc::new(Int64Array::from(Vec::<i64>::new())) as ArrayRef)])
            .unwrap();

        let record = store.put(empty, "void", None, &PutOptions::new()).await.unwrap();
        assert!(record.is_none());

        let cx = store.context().await.unwrap();
        assert!(!cx.db.exists(&store.collection_name("void")).await.unwrap());
        assert!(store.metadata("void").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unsupported_object() {
        let store = datastore();
        let err = store
            .put(json!(42), "n", None, &PutOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DatastoreError::UnsupportedType(t) if t == "scalar"));
    }

    #[tokio::test]
    async fn geo_index_failure_leaves_nothing() {
        let store = datastore();
        let df = DataFrame::try_from_columns([(
            "loc",
            Arc::new(StringArray::from(vec!["not a point"])) as ArrayRef,
        )])
        .unwrap();

        let err = store
            .put(df, "places", None, &PutOptions::new().with_index(&["@loc"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DatastoreError::IndexCreation { .. }));
        assert!(store.metadata("places").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lazy_and_raw_reads() {
        let store = datastore();
        store.put(frame(), "sales", None, &PutOptions::new()).await.unwrap();

        let lazy = store
            .getl("sales", &GetOptions::new())
            .await
            .unwrap()
            .unwrap()
            .into_lazy()
            .unwrap();
        let filtered = lazy.filter(Filter::new().gt("x", 1i64).unwrap());
        assert_eq!(filtered.count().await.unwrap(), 2);

        let docs = store
            .get("sales", &GetOptions::new().force_python())
            .await
            .unwrap()
            .unwrap()
            .into_documents()
            .unwrap();
        assert_eq!(docs.len(), 3);

        store.put(Model::new("svm"), "clf", None, &PutOptions::new()).await.unwrap();
        let blob = store
            .get("clf", &GetOptions::new().force_python())
            .await
            .unwrap()
            .unwrap()
            .into_blob()
            .unwrap();
        assert_eq!(crate::rw::decode_model(&blob).unwrap().estimator, "svm");
    }

    /// Stores strings as flat documents under its own kind
    struct Text;

    const TEXT: Kind = Kind::from_static("custom.text");

    #[async_trait]
    impl Backend for Text {
        fn kinds(&self) -> Vec<Kind> {
            vec![TEXT]
        }

        fn supports(&self, obj: &Object, _name: &str, _options: &PutOptions) -> bool {
            matches!(obj, Object::Other(other) if other.is::<String>())
        }

        async fn put(
            &self,
            cx: &Context,
            obj: Object,
            name: &str,
            options: &PutOptions,
        ) -> Result<Outcome, crate::backends::Error> {
            let mut text = match obj {
                Object::Other(other) => other.downcast::<String>().map(|s| *s).unwrap_or_default(),
                _ => String::new(),
            };
            if options.extra.get("uppercase").and_then(|v| v.as_bool()) == Some(true) {
                text = text.to_uppercase();
            }
            let collection = cx.collection_name(name);
            cx.db.drop_collection(&collection).await?;
            let doc = json!({ "text": text }).as_object().cloned().unwrap_or_default();
            cx.db.insert_many(&collection, vec![doc]).await?;

            Ok(Outcome::stored(MetadataUpdate::new(
                name,
                TEXT,
                Location::Collection {
                    name: collection,
                    objid: None,
                },
            )))
        }

        async fn get(
            &self,
            cx: &Context,
            record: &MetadataRecord,
            _options: &GetOptions,
        ) -> Result<Retrieved, crate::backends::Error> {
            let docs = cx
                .db
                .find(&cx.collection_name(&record.name), &Default::default())
                .await?;
            Ok(Retrieved::Data(
                docs.first().and_then(|d| d.get("text")).cloned().unwrap_or_default(),
            ))
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Observer for Recorder {
        fn on_put(&self, name: &str, record: &MetadataRecord) {
            self.events.lock().unwrap().push(format!("put {} {}", name, record.kind));
        }

        fn on_get(&self, name: &str) {
            self.events.lock().unwrap().push(format!("get {}", name));
        }

        fn on_warning(&self, warning: &Warning) {
            self.events.lock().unwrap().push(format!("warn {}", warning));
        }
    }

    #[tokio::test]
    async fn registered_backend() {
        let mut store = datastore();
        store.register_backend(TEXT, Arc::new(Text));

        let text = Object::Other(Box::new("hello".to_owned()));
        let record = store.put(text, "greeting", None, &PutOptions::new()).await.unwrap().unwrap();
        assert_eq!(record.kind, TEXT);

        let back = store
            .get("greeting", &GetOptions::new())
            .await
            .unwrap()
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(back, json!("hello"));

        assert_eq!(
            store.get_backend("greeting").await.unwrap().unwrap().kinds(),
            vec![TEXT]
        );
        assert!(store.get_backend("missing").await.unwrap().is_none());
        assert!(store.get_backend_by_kind(&Kind::MODEL).is_some());

        // the custom kind has no raw form
        let err = store
            .get("greeting", &GetOptions::new().force_python())
            .await
            .unwrap_err();
        assert!(matches!(err, DatastoreError::UnsupportedKindForPython(kind) if kind == TEXT));

        assert!(store.drop("greeting", false).await.unwrap());
    }

    #[tokio::test]
    async fn backend_reads_extra_options() {
        let mut store = datastore();
        store.register_backend(TEXT, Arc::new(Text));

        let options = PutOptions::new().with_extra("uppercase", json!(true));
        let text = Object::Other(Box::new("hello".to_owned()));
        store.put(text, "shout", None, &options).await.unwrap().unwrap();

        let back = store
            .get("shout", &GetOptions::new())
            .await
            .unwrap()
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(back, json!("HELLO"));

        // only a boolean switches it on
        let options = PutOptions::new().with_extra("uppercase", json!("yes"));
        let text = Object::Other(Box::new("hello".to_owned()));
        store.put(text, "shout", None, &options).await.unwrap().unwrap();
        let back = store
            .get("shout", &GetOptions::new())
            .await
            .unwrap()
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(back, json!("hello"));
    }

    #[tokio::test]
    async fn unknown_kind_on_read() {
        let store = datastore();
        let cx = store.context().await.unwrap();
        cx.catalog
            .upsert(MetadataUpdate::new(
                "legacy",
                Kind::new("legacy.kind"),
                Location::Blob {
                    key: store.object_store_key("legacy", "bin"),
                },
            ))
            .await
            .unwrap();

        let err = store.get("legacy", &GetOptions::new()).await.unwrap_err();
        assert!(matches!(err, DatastoreError::UnsupportedKind(_)));
    }

    #[tokio::test]
    async fn observers_and_extensions() {
        let recorder = Arc::new(Recorder::default());
        let mut store = builder()
            .with_observer(recorder.clone())
            .with_extension(42u32)
            .build();
        store.register_extension("audit".to_owned());

        store.put(frame(), "sales", None, &PutOptions::new()).await.unwrap();
        store.put(frame(), "sales", None, &PutOptions::new()).await.unwrap();
        store.get("sales", &GetOptions::new()).await.unwrap();
        store.get("missing", &GetOptions::new()).await.unwrap();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "put sales frame.rows".to_owned(),
                "warn `sales` already exists, will append rows".to_owned(),
                "put sales frame.rows".to_owned(),
                "get sales".to_owned(),
            ]
        );

        assert_eq!(store.extension::<u32>(), Some(&42));
        assert_eq!(store.extension::<String>().map(String::as_str), Some("audit"));
        assert!(store.extension::<i64>().is_none());
    }

    #[tokio::test]
    async fn derived_names() {
        let store = datastore();
        assert_eq!(store.object_store_key("clf", "omm"), "store.data.clf.omm");
        assert_eq!(
            store.object_store_key("clf.omm", "omm"),
            store.object_store_key("clf", "omm")
        );
        assert_eq!(store.collection_name("a/b"), store.collection_name("a/b"));
        store.close().await;
    }
}
