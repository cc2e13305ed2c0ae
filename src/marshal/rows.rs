use arrow::array::{ArrayRef, RecordBatch, RecordBatchOptions};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{Error, IndexMeta, escape_key, restore_index, unravel_index};
use crate::repo::Document;
use crate::types::DataFrame;

/// Stored column description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Document key
    pub stored: String,
    /// Column name as given by the caller
    pub original: String,
    pub dtype: DataType,
    pub nullable: bool,
}

impl ColumnMeta {
    fn stored_field(&self) -> Field {
        // documents may omit any key, decoding is always nullable
        Field::new(&self.stored, self.dtype.clone(), true)
    }
}

/// `kind_meta` of objects stored one document per row
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowsKindMeta {
    pub columns: Vec<ColumnMeta>,
    pub idx_meta: IndexMeta,
}

impl RowsKindMeta {
    pub fn to_value(&self) -> Result<serde_json::Value, Error> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(value.clone()).map_err(|e| Error::KindMeta(e.to_string()))
    }

    /// Document key of a column or of a named index level
    pub fn stored_name(&self, original: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.original == original)
            .map(|c| c.stored.as_str())
            .or_else(|| self.idx_meta.column_for(original))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.original.as_str()).collect()
    }

    /// Description covering the documents of both `self` and `newer`, as
    /// needed after an append. Shared columns take the description of `newer`.
    pub fn union(&self, newer: &RowsKindMeta) -> RowsKindMeta {
        let mut columns: Vec<ColumnMeta> = self
            .columns
            .iter()
            .map(|c| {
                newer
                    .columns
                    .iter()
                    .find(|n| n.stored == c.stored)
                    .unwrap_or(c)
                    .clone()
            })
            .collect();

        for c in &newer.columns {
            if !columns.iter().any(|e| e.stored == c.stored) {
                columns.push(c.clone());
            }
        }

        RowsKindMeta {
            columns,
            idx_meta: newer.idx_meta.clone(),
        }
    }
}

/// Converts a record batch into one JSON object per row. Null values are
/// omitted from the objects.
pub fn batch_to_documents(batch: &RecordBatch) -> Result<Vec<Document>, Error> {
    if batch.num_rows() == 0 {
        return Ok(Vec::new());
    }
    if batch.num_columns() == 0 {
        return Ok(vec![Document::new(); batch.num_rows()]);
    }

    let mut writer = arrow::json::ArrayWriter::new(Vec::new());
    writer.write(batch)?;
    writer.finish()?;

    Ok(serde_json::from_slice(&writer.into_inner())?)
}

/// Decodes JSON objects into a record batch with the given schema. Unknown
/// keys are ignored, missing keys become nulls.
pub fn documents_to_batch(docs: &[Document], schema: SchemaRef) -> Result<RecordBatch, Error> {
    if docs.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    if schema.fields().is_empty() {
        let options = RecordBatchOptions::new().with_row_count(Some(docs.len()));
        return Ok(RecordBatch::try_new_with_options(schema, Vec::new(), &options)?);
    }

    let mut decoder = arrow::json::ReaderBuilder::new(schema.clone())
        .with_batch_size(docs.len())
        .build_decoder()?;
    decoder.serialize(docs)?;

    Ok(decoder
        .flush()?
        .unwrap_or_else(|| RecordBatch::new_empty(schema)))
}

/// Maps a frame to one document per row.
///
/// Index levels become synthetic `_idx` columns, every key is escaped.
pub fn frame_to_documents(df: &DataFrame) -> Result<(Vec<Document>, RowsKindMeta), Error> {
    let (batch, mut idx_meta) = unravel_index(df)?;
    let schema = batch.schema();

    let mut meta = RowsKindMeta::default();
    let mut fields = Vec::with_capacity(schema.fields().len());

    for field in schema.fields().iter().take(df.num_columns()) {
        let stored = escape_key(field.name());
        fields.push(Field::new(&stored, field.data_type().clone(), true));
        meta.columns.push(ColumnMeta {
            stored,
            original: field.name().clone(),
            dtype: field.data_type().clone(),
            nullable: field.is_nullable(),
        });
    }

    for level in &mut idx_meta.levels {
        level.column = escape_key(&level.column);
        fields.push(Field::new(&level.column, level.dtype.clone(), true));
    }
    meta.idx_meta = idx_meta;

    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    let stored = RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        batch.columns().to_vec(),
        &options,
    )?;

    Ok((batch_to_documents(&stored)?, meta))
}

/// Rebuilds a frame from row documents.
///
/// `projection` restricts the returned columns (stored names), index levels
/// are always restored.
pub fn documents_to_frame(
    docs: &[Document],
    meta: &RowsKindMeta,
    projection: Option<&[String]>,
) -> Result<DataFrame, Error> {
    let columns: Vec<&ColumnMeta> = meta
        .columns
        .iter()
        .filter(|c| projection.is_none_or(|p| p.contains(&c.stored)))
        .collect();

    let mut fields: Vec<Field> = columns.iter().map(|c| c.stored_field()).collect();
    for level in &meta.idx_meta.levels {
        fields.push(Field::new(&level.column, level.dtype.clone(), true));
    }

    let batch = documents_to_batch(docs, Arc::new(Schema::new(fields)))?;

    // restore original names and nullability
    let mut fields = Vec::with_capacity(batch.num_columns());
    for (i, column) in batch.columns().iter().enumerate() {
        let field = match columns.get(i) {
            Some(c) => Field::new(&c.original, c.dtype.clone(), c.nullable || column.null_count() > 0),
            None => {
                let level = &meta.idx_meta.levels[i - columns.len()];
                Field::new(&level.column, level.dtype.clone(), true)
            }
        };
        fields.push(field);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    let columns: Vec<ArrayRef> = batch.columns().to_vec();
    let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &options)?;

    restore_index(batch, &meta.idx_meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Index, IndexLevel, Series};
    use arrow::array::{BooleanArray, Float64Array, Int64Array, StringArray};

    fn frame() -> DataFrame {
        DataFrame::try_from_columns([
            ("a.b", Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef),
            (
                "price",
                Arc::new(Float64Array::from(vec![Some(0.5), None, Some(2.5)])) as ArrayRef,
            ),
            (
                "label",
                Arc::new(StringArray::from(vec!["x", "y", "z"])) as ArrayRef,
            ),
            (
                "flag",
                Arc::new(BooleanArray::from(vec![true, false, true])) as ArrayRef,
            ),
        ])
        .unwrap()
        .with_index(Index::new(vec![
            IndexLevel::new(Some("k"), Arc::new(StringArray::from(vec!["a", "a", "b"]))),
            IndexLevel::new(Some("n"), Arc::new(Int64Array::from(vec![1, 2, 1]))),
        ]))
        .unwrap()
    }

    #[test]
    fn frame_roundtrip() {
        let df = frame();
        let (docs, meta) = frame_to_documents(&df).unwrap();

        assert_eq!(docs.len(), 3);
        assert!(docs[0].contains_key("a%2Eb"));
        assert!(docs[0].contains_key("_idx#0_k"));
        // nulls are omitted
        assert!(!docs[1].contains_key("price"));

        let back = documents_to_frame(&docs, &meta, None).unwrap();
        assert_eq!(back, df);
    }

    #[test]
    fn projection_keeps_index() {
        let df = frame();
        let (docs, meta) = frame_to_documents(&df).unwrap();

        let back = documents_to_frame(&docs, &meta, Some(&["label".to_owned()])).unwrap();
        assert_eq!(back.column_names(), vec!["label"]);
        assert_eq!(back.index(), df.index());
    }

    #[test]
    fn empty_documents_keep_schema() {
        let (_, meta) = frame_to_documents(&frame()).unwrap();
        let back = documents_to_frame(&[], &meta, None).unwrap();
        assert_eq!(back.num_rows(), 0);
        assert_eq!(back.column_names(), vec!["a.b", "price", "label", "flag"]);
    }

    #[test]
    fn series_roundtrip() {
        let series = Series::new(Some("s"), Arc::new(Float64Array::from(vec![1.0, 2.0])))
            .with_index(Index::single(None, Arc::new(Int64Array::from(vec![5, 6]))))
            .unwrap();

        let (docs, meta) = frame_to_documents(&series.clone().into_frame().unwrap()).unwrap();
        let back = documents_to_frame(&docs, &meta, None)
            .unwrap()
            .into_series()
            .unwrap();
        assert_eq!(back, series);
    }

    #[test]
    fn union_appends_new_columns() {
        let (_, a) = frame_to_documents(&frame()).unwrap();
        let b = RowsKindMeta {
            columns: vec![ColumnMeta {
                stored: "extra".to_owned(),
                original: "extra".to_owned(),
                dtype: DataType::Utf8,
                nullable: true,
            }],
            idx_meta: a.idx_meta.clone(),
        };

        let u = a.union(&b);
        assert_eq!(u.column_names(), vec!["a.b", "price", "label", "flag", "extra"]);
        assert_eq!(u.stored_name("k"), Some("_idx#0_k"));
    }
}
