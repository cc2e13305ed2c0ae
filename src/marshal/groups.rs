use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::{ColumnMeta, Error, IndexMeta, RowsKindMeta, documents_to_frame, escape_key, frame_to_documents};
use crate::params;
use crate::repo::Document;
use crate::types::DataFrame;

/// `kind_meta` of objects stored one document per group
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupsKindMeta {
    /// Stored names of the group key columns
    pub keys: Vec<String>,
    /// Every column, in the original order
    pub columns: Vec<ColumnMeta>,
}

impl GroupsKindMeta {
    pub fn to_value(&self) -> Result<serde_json::Value, Error> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(value.clone()).map_err(|e| Error::KindMeta(e.to_string()))
    }

    pub fn is_key(&self, stored: &str) -> bool {
        self.keys.iter().any(|k| k == stored)
    }

    pub fn stored_name(&self, original: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.original == original)
            .map(|c| c.stored.as_str())
    }
}

/// Partitions the rows of `df` by the `groupby` columns.
///
/// Each distinct key tuple yields one document holding the key fields and
/// the remaining columns of its rows under the group data field, in row order.
/// Groups are emitted in order of first appearance. The frame index is not
/// stored.
pub fn frame_to_group_documents(
    df: &DataFrame,
    groupby: &[String],
) -> Result<(Vec<Document>, GroupsKindMeta), Error> {
    for key in groupby {
        if df.column(key).is_none() {
            return Err(Error::MissingColumn(key.clone()));
        }
    }

    let plain = DataFrame::new(df.data().clone());
    let (rows, rows_meta) = frame_to_documents(&plain)?;
    let keys: Vec<String> = groupby.iter().map(|k| escape_key(k)).collect();

    let mut groups: Vec<(Document, Vec<Value>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for mut row in rows {
        let mut key_doc = Document::new();
        for key in &keys {
            key_doc.insert(key.clone(), row.remove(key).unwrap_or(Value::Null));
        }

        let fingerprint = serde_json::to_string(&key_doc)?;
        let pos = *positions.entry(fingerprint).or_insert_with(|| {
            groups.push((key_doc, Vec::new()));
            groups.len() - 1
        });
        groups[pos].1.push(Value::Object(row));
    }

    let docs = groups
        .into_iter()
        .map(|(mut key_doc, data)| {
            key_doc.insert(params::GROUP_DATA_FIELD.to_owned(), Value::Array(data));
            key_doc
        })
        .collect();

    Ok((
        docs,
        GroupsKindMeta {
            keys,
            columns: rows_meta.columns,
        },
    ))
}

/// Expands group documents back into a flat frame, group by group.
pub fn group_documents_to_frame(docs: &[Document], meta: &GroupsKindMeta) -> Result<DataFrame, Error> {
    let mut rows = Vec::new();

    for doc in docs {
        let Some(Value::Array(data)) = doc.get(params::GROUP_DATA_FIELD) else {
            return Err(Error::Unsupported(format!(
                "group document without `{}` sequence",
                params::GROUP_DATA_FIELD
            )));
        };

        for row in data {
            let Value::Object(row) = row else {
                return Err(Error::Unsupported("group row is not an object".to_owned()));
            };
            let mut row = row.clone();
            for key in &meta.keys {
                if let Some(v) = doc.get(key) {
                    row.insert(key.clone(), v.clone());
                }
            }
            rows.push(row);
        }
    }

    let rows_meta = RowsKindMeta {
        columns: meta.columns.clone(),
        idx_meta: IndexMeta::default(),
    };
    documents_to_frame(&rows, &rows_meta, None)
}
