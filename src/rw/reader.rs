use arrow::array::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::Error;

/// Reads a whole Parquet container into a single record batch. The schema
/// metadata written with the container is preserved.
pub fn read_parquet(content: Bytes) -> Result<RecordBatch, Error> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(content)?;
    let schema = builder.schema().clone();

    let batches = builder
        .build()?
        .collect::<Result<Vec<RecordBatch>, _>>()?;

    Ok(arrow::compute::concat_batches(&schema, &batches)?)
}
