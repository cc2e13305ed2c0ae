//! Frames packaged as binary containers.
//!
//! The index is flattened into synthetic columns and its reconstruction data
//! is kept in the container schema metadata, so a container is self contained.
use arrow::datatypes::Schema;
use bytes::Bytes;
use std::sync::Arc;

use super::{Error, Format, Writer, read_parquet};
use crate::{marshal, params, types::DataFrame};

pub fn frame_to_container(df: &DataFrame, format: Format) -> Result<Bytes, Error> {
    let (batch, idx_meta) = marshal::unravel_index(df)?;

    let mut metadata = batch.schema().metadata().clone();
    metadata.insert(
        params::CONTAINER_INDEX_METADATA_KEY.to_owned(),
        idx_meta.to_json()?,
    );
    let schema = Arc::new(Schema::new_with_metadata(
        batch.schema().fields().clone(),
        metadata,
    ));
    let batch = batch.with_schema(schema.clone())?;

    let mut writer = Writer::new(&schema, format)?;
    writer.write(&batch)?;
    writer.finish()
}

pub fn container_to_frame(content: Bytes) -> Result<DataFrame, Error> {
    let batch = read_parquet(content)?;

    let idx_meta = match batch.schema().metadata().get(params::CONTAINER_INDEX_METADATA_KEY) {
        Some(raw) => marshal::IndexMeta::from_json(raw)?,
        None => marshal::IndexMeta::default(),
    };

    Ok(marshal::restore_index(batch, &idx_meta)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Index, IndexLevel};
    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};

    #[test]
    fn container_roundtrip() {
        let df = DataFrame::try_from_columns([
            ("a", Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef),
            (
                "b",
                Arc::new(Float64Array::from(vec![Some(1.0), None, Some(3.0)])) as ArrayRef,
            ),
        ])
        .unwrap()
        .with_index(Index::new(vec![IndexLevel::new(
            Some("when"),
            Arc::new(StringArray::from(vec!["x", "y", "z"])),
        )]))
        .unwrap();

        for format in [Format::Default, Format::Compressed, Format::Uncompressed] {
            let content = frame_to_container(&df, format).unwrap();
            let back = container_to_frame(content).unwrap();
            assert_eq!(back.column_names(), df.column_names());
            assert_eq!(back.data().columns(), df.data().columns());
            assert_eq!(back.index(), df.index());
        }
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(container_to_frame(Bytes::from_static(b"not a container")).is_err());
    }
}
