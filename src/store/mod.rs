//! Blob namespace.
//!
//! A thin wrapper around an [`ObjectStore`] rooted at a configured url
//! (`file://`, `s3://`, `memory://`). Every bucket gets its own top level
//! directory and blobs are addressed by their derived store key inside it.
use bytes::Bytes;
use futures::StreamExt;
use log::trace;
use object_store::{ObjectStore, PutPayload, path::Path};
use std::sync::Arc;

pub type StoreRef = Arc<Store>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("object store error :: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("invalid store url :: {0}")]
    Url(#[from] url::ParseError),
    #[error("unable to prepare local store :: {0}")]
    Io(#[from] std::io::Error),
    #[error("blob `{0}` not found")]
    NotFound(String),
}

pub struct Store {
    pub url_schema: url::Url,
    inner: Arc<dyn ObjectStore>,
}

impl Store {
    pub fn new(url_schema: url::Url, inner: Arc<dyn ObjectStore>) -> Self {
        Self { url_schema, inner }
    }

    /// Builds a store from its root url. Local directories are created if
    /// missing.
    pub fn try_from_url(url: &str) -> Result<Self, Error> {
        let url_schema = url::Url::parse(url)?;

        let inner: Arc<dyn ObjectStore> = if url_schema.scheme() == "file" {
            let root = std::path::PathBuf::from(url_schema.path());
            std::fs::create_dir_all(&root)?;
            Arc::new(object_store::local::LocalFileSystem::new_with_prefix(root)?)
        } else {
            let (store, prefix) = object_store::parse_url(&url_schema)?;
            let store: Arc<dyn ObjectStore> = Arc::from(store);
            if prefix.as_ref().is_empty() {
                store
            } else {
                Arc::new(object_store::prefix::PrefixStore::new(store, prefix))
            }
        };

        Ok(Self { url_schema, inner })
    }

    fn path(bucket: &str, key: &str) -> Path {
        Path::from_iter([bucket, key])
    }

    pub async fn write(&self, bucket: &str, key: &str, content: Bytes) -> Result<(), Error> {
        let path = Self::path(bucket, key);
        trace!("writing {} bytes to `{}`", content.len(), path);
        self.inner.put(&path, PutPayload::from(content)).await?;
        Ok(())
    }

    pub async fn read(&self, bucket: &str, key: &str) -> Result<Bytes, Error> {
        let path = Self::path(bucket, key);
        match self.inner.get(&path).await {
            Ok(res) => Ok(res.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => Err(Error::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool, Error> {
        match self.inner.head(&Self::path(bucket, key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes a blob, returns false if it did not exist
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<bool, Error> {
        if !self.exists(bucket, key).await? {
            return Ok(false);
        }

        let path = Self::path(bucket, key);
        trace!("deleting `{}`", path);
        match self.inner.delete(&path).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Keys of every blob stored in `bucket`, sorted
    pub async fn keys(&self, bucket: &str) -> Result<Vec<String>, Error> {
        let prefix = Path::from_iter([bucket]);
        let mut stream = self.inner.list(Some(&prefix));

        let mut keys = Vec::new();
        while let Some(meta) = stream.next().await {
            let meta = meta?;
            if let Some(key) = meta.location.filename() {
                keys.push(key.to_owned());
            }
        }
        keys.sort();

        Ok(keys)
    }
}

pub mod testing {
    use std::ops::Deref;
    use std::sync::Arc;

    /// Store rooted in a fresh temporary directory, removed on drop
    pub struct Store {
        store: super::StoreRef,
        root: std::path::PathBuf,
    }

    impl Store {
        pub fn new_random_on_tmp() -> Result<Self, super::Error> {
            let root = std::env::temp_dir().join(format!("mlstore-{}", uuid::Uuid::new_v4()));
            let url = url::Url::from_directory_path(&root).map_err(|_| {
                super::Error::Io(std::io::Error::other(format!(
                    "invalid temporary path {}",
                    root.display()
                )))
            })?;

            Ok(Self {
                store: Arc::new(super::Store::try_from_url(url.as_str())?),
                root,
            })
        }

        pub fn store_ref(&self) -> super::StoreRef {
            self.store.clone()
        }
    }

    impl Deref for Store {
        type Target = super::Store;

        fn deref(&self) -> &Self::Target {
            &self.store
        }
    }

    impl Drop for Store {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }
}
