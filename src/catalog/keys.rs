use crate::params;

/// Store-Key Builder.
///
/// Derives physical names (collections, blob keys) from the logical
/// `(bucket, prefix, name)` triple. Derivation is pure: reads locate data by
/// recomputing the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    bucket: String,
    prefix: String,
}

impl StoreKeys {
    /// `prefix` is reduced to a single segment, surrounding slashes are removed
    pub fn new(bucket: &str, prefix: &str) -> Self {
        Self {
            bucket: bucket.to_owned(),
            prefix: prefix.trim_matches('/').to_owned(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns `bucket.prefix.name.ext`.
    ///
    /// The extension is not appended when `name` already ends with it. Path
    /// separators become `_` and empty segments collapse.
    pub fn key(&self, name: &str, ext: &str) -> String {
        let ext = ext.trim_start_matches('.');
        let name = if ext.is_empty() || name.ends_with(ext) {
            name.to_owned()
        } else {
            format!("{name}.{ext}")
        };

        format!("{}.{}.{}", self.bucket, self.prefix, name)
            .replace('/', "_")
            .replace("..", ".")
    }

    /// Document collection holding the payload of `name`
    pub fn collection_name(&self, name: &str) -> String {
        self.key(name, params::ext::DATASTORE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_derivation() {
        let keys = StoreKeys::new("store", "/data/");
        assert_eq!(keys.prefix(), "data");

        assert_eq!(keys.key("sales", "parquet"), "store.data.sales.parquet");
        assert_eq!(keys.key("sales", ".parquet"), "store.data.sales.parquet");
        // idempotent, extension not duplicated
        assert_eq!(keys.key("sales.parquet", "parquet"), keys.key("sales", "parquet"));
        assert_eq!(keys.key("sales", "parquet"), keys.key("sales", "parquet"));
        // separators never introduce nesting
        assert_eq!(keys.key("a/b", "omm"), "store.data.a_b.omm");
        assert_eq!(keys.collection_name("sales"), "store.data.sales.datastore");
    }

    #[test]
    fn empty_segments_collapse() {
        let keys = StoreKeys::new("store", "");
        assert_eq!(keys.key("x", "omm"), "store.x.omm");

        let nested = StoreKeys::new("store", "a/b");
        assert_eq!(nested.key("x", "omm"), "store.a_b.x.omm");
    }
}
