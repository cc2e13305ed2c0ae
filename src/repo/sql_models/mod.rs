pub mod pg_queries;

mod document_record;
pub use document_record::*;
