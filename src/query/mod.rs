mod filter;
pub use filter::*;

mod builder;
pub use builder::*;

mod eval;
pub use eval::*;

mod lazy;
pub use lazy::*;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("bad field `{field}`")]
    BadField { field: String },
    #[error("unsupported operation `{op}` on field `{field}`")]
    UnsupportedOp { field: String, op: &'static str },
    #[error("invalid filter :: {0}")]
    InvalidFilter(String),
    #[error("operation error :: {0}")]
    OpError(#[from] OpError),
    #[error("invalid regular expression :: {0}")]
    Regex(#[from] regex::Error),
    #[error("unable to encode value :: {0}")]
    Encoding(#[from] serde_json::Error),
}
