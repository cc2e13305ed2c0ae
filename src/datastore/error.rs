use crate::types::Kind;
use crate::{backends, catalog, connection, repo, store};

#[derive(thiserror::Error, Debug)]
pub enum DatastoreError {
    #[error("unable to find `{0}`")]
    NotFound(String),
    #[error("unsupported object type `{0}`")]
    UnsupportedType(String),
    #[error("no backend registered for kind `{0}`")]
    UnsupportedKind(Kind),
    #[error("kind `{0}` cannot be returned in its raw form")]
    UnsupportedKindForPython(Kind),
    #[error("unable to create index on `{field}` :: {msg}")]
    IndexCreation { field: String, msg: String },
    #[error("connection error :: {0}")]
    ConnectionError(#[from] connection::Error),
    #[error("catalog error :: {0}")]
    CatalogError(#[from] catalog::Error),
    #[error("store error :: {0}")]
    StoreError(#[from] store::Error),
    #[error("repository error :: {0}")]
    RepositoryError(repo::Error),
    #[error("backend error :: {0}")]
    BackendError(backends::Error),
}

impl From<repo::Error> for DatastoreError {
    fn from(e: repo::Error) -> Self {
        match e {
            repo::Error::IndexCreation { field, msg } => Self::IndexCreation { field, msg },
            e => Self::RepositoryError(e),
        }
    }
}

/// Lifts the conditions callers handle to the top level
impl From<backends::Error> for DatastoreError {
    fn from(e: backends::Error) -> Self {
        match e {
            backends::Error::NotFound(what) => Self::NotFound(what),
            backends::Error::UnsupportedType(t) => Self::UnsupportedType(t),
            backends::Error::UnsupportedKindForPython(kind) => Self::UnsupportedKindForPython(kind),
            backends::Error::Repository(e) => e.into(),
            e => Self::BackendError(e),
        }
    }
}
