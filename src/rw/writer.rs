use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use std::sync::Arc;

use super::{Error, Format};

pub enum Writer {
    /// Parquet file format <https://parquet.apache.org/docs/file-format/>
    Parquet(ArrowWriter<Vec<u8>>),
}

impl Writer {
    pub fn new(schema: &Arc<Schema>, format: Format) -> Result<Self, Error> {
        let props = format.strategy().properties()?;

        Ok(Self::Parquet(ArrowWriter::try_new(
            Vec::new(),
            schema.clone(),
            Some(props),
        )?))
    }

    pub fn write(&mut self, batch: &RecordBatch) -> Result<(), Error> {
        match self {
            Self::Parquet(w) => w.write(batch)?,
        }
        Ok(())
    }

    /// Closes the container and returns its content
    pub fn finish(self) -> Result<Bytes, Error> {
        match self {
            Self::Parquet(w) => Ok(Bytes::from(w.into_inner()?)),
        }
    }
}
