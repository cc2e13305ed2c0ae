//! Connection Manager.
//!
//! Resolves the database and blob urls into live handles. Handles are created
//! on first use and memoized for the lifetime of the [`Connection`]; the
//! database pool connects lazily, so an unreachable host only surfaces on the
//! first query, bounded by the server selection timeout.
//!
//! A connection must not be shared across process boundaries, every process
//! builds its own.
use log::{debug, info};
use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use crate::{params, repo, store};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid connection url :: {0}")]
    Url(#[from] url::ParseError),
    #[error("unsupported database scheme `{0}`")]
    UnsupportedScheme(String),
    #[error("database error :: {0}")]
    Database(#[from] sqlx::Error),
    #[error("blob store error :: {0}")]
    Store(#[from] store::Error),
}

enum Handle {
    Postgres(Arc<repo::PgDocumentStore>),
    Memory(Arc<repo::MemoryDocumentStore>),
}

impl Handle {
    fn document_store(&self) -> repo::DocumentStoreRef {
        match self {
            Self::Postgres(h) => h.clone(),
            Self::Memory(h) => h.clone(),
        }
    }
}

/// In-memory databases are shared by name inside the process, like a server
/// would be.
fn memory_database(name: &str) -> Arc<repo::MemoryDocumentStore> {
    static DATABASES: OnceLock<Mutex<HashMap<String, Arc<repo::MemoryDocumentStore>>>> =
        OnceLock::new();

    let mut databases = DATABASES
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    databases
        .entry(name.to_owned())
        .or_insert_with(|| Arc::new(repo::MemoryDocumentStore::new()))
        .clone()
}

/// Url with the password masked, safe for logging
fn redacted(url: &url::Url) -> String {
    let mut url = url.clone();
    if url.password().is_some() {
        let _ = url.set_password(Some("***"));
    }
    url.to_string()
}

pub struct Connection {
    database_url: String,
    blob_url: String,
    server_selection_timeout: Duration,
    max_connections: u32,
    database: tokio::sync::Mutex<Option<Handle>>,
    blobs: tokio::sync::OnceCell<store::StoreRef>,
}

impl Connection {
    pub fn new(database_url: &str, blob_url: &str) -> Self {
        let conf = params::configurables();
        Self {
            database_url: database_url.to_owned(),
            blob_url: blob_url.to_owned(),
            server_selection_timeout: Duration::from_millis(conf.server_selection_timeout_ms),
            max_connections: conf.max_connections,
            database: tokio::sync::Mutex::new(None),
            blobs: tokio::sync::OnceCell::new(),
        }
    }

    /// Connection described by the process configurables
    pub fn from_configurables() -> Self {
        let conf = params::configurables();
        Self::new(&conf.database_url, &conf.blob_url)
    }

    pub fn with_server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Returns the document database handle, creating it on first access.
    pub async fn database(&self) -> Result<repo::DocumentStoreRef, Error> {
        let mut guard = self.database.lock().await;
        if let Some(handle) = guard.as_ref() {
            return Ok(handle.document_store());
        }

        let handle = self.open_database()?;
        let store = handle.document_store();
        *guard = Some(handle);
        Ok(store)
    }

    fn open_database(&self) -> Result<Handle, Error> {
        let url = url::Url::parse(&self.database_url)?;

        match url.scheme() {
            "postgres" | "postgresql" => {
                info!("connecting to {}", redacted(&url));
                // credentials are part of the options, applied to every
                // pooled connection
                let options = PgConnectOptions::from_url(&url)?;
                let pool = PgPoolOptions::new()
                    .max_connections(self.max_connections)
                    .acquire_timeout(self.server_selection_timeout)
                    .connect_lazy_with(options);
                Ok(Handle::Postgres(Arc::new(repo::PgDocumentStore::new(pool))))
            }
            "memory" => {
                let name = url.host_str().unwrap_or("default");
                debug!("using in-memory database `{}`", name);
                Ok(Handle::Memory(memory_database(name)))
            }
            scheme => Err(Error::UnsupportedScheme(scheme.to_owned())),
        }
    }

    /// Returns the blob namespace, creating it on first access.
    pub async fn blob_store(&self) -> Result<store::StoreRef, Error> {
        let store = self
            .blobs
            .get_or_try_init(|| async {
                debug!("opening blob store at {}", self.blob_url);
                store::Store::try_from_url(&self.blob_url).map(Arc::new)
            })
            .await?;
        Ok(store.clone())
    }

    /// Releases the database handle. A later access opens a new one.
    pub async fn close(&self) {
        let handle = self.database.lock().await.take();
        if let Some(Handle::Postgres(pg)) = handle {
            info!("closing database connection");
            pg.close().await;
        }
    }
}
