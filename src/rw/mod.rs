mod format;
pub use format::*;

mod writer;
pub use writer::*;

mod reader;
pub use reader::*;

mod container;
pub use container::*;

mod model;
pub use model::*;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown format `{0}`")]
    UnknownFormat(String),
    #[error("parquet error :: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("arrow error :: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("marshal error :: {0}")]
    Marshal(#[from] crate::marshal::Error),
    #[error("model encoding error :: {0}")]
    ModelEncode(#[from] bincode::error::EncodeError),
    #[error("model decoding error :: {0}")]
    ModelDecode(#[from] bincode::error::DecodeError),
    #[error("compression error :: {0}")]
    Io(#[from] std::io::Error),
}
