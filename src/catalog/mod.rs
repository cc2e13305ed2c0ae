//! Metadata Catalog.
//!
//! A single collection holding one record per stored object, scoped by
//! bucket and prefix. The catalog is the authoritative index of what is
//! stored: every payload is reachable from exactly one record.
use log::trace;
use regex::Regex;

use crate::types::{Attributes, Kind};
use crate::{params, query, repo};

mod keys;
pub use keys::*;

mod record;
pub use record::*;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("repository error :: {0}")]
    Repository(#[from] repo::Error),
    #[error("query error :: {0}")]
    Query(#[from] query::Error),
    #[error("json error :: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid name pattern :: {0}")]
    Pattern(#[from] regex::Error),
    #[error("malformed metadata record :: {0}")]
    MalformedRecord(String),
}

/// Applies the attribute update policy.
///
/// * `None` leaves `existing` untouched
/// * an empty mapping clears `existing`
/// * a non-empty mapping is merged key by key into `existing`
pub fn merge_attributes(existing: &mut Attributes, incoming: Option<Attributes>) {
    match incoming {
        None => {}
        Some(incoming) if incoming.is_empty() => existing.clear(),
        Some(incoming) => existing.extend(incoming),
    }
}

/// Translates a shell glob (`*`, `?`, `[seq]`, `[!seq]`) into an anchored
/// regular expression.
pub fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut re = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                let mut j = i;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    re.push_str("\\[");
                } else {
                    let mut class: String = chars[i..j].iter().collect();
                    class = class.replace('\\', "\\\\");
                    if let Some(rest) = class.strip_prefix('!') {
                        class = format!("^{rest}");
                    } else if class.starts_with('^') {
                        class = format!("\\{class}");
                    }
                    re.push('[');
                    re.push_str(&class);
                    re.push(']');
                    i = j + 1;
                }
            }
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }

    re.push('$');
    re
}

/// Name filter used by listings. A regular expression matches at the start
/// of the name, a glob must match the whole name.
pub struct NameMatcher {
    re: Option<Regex>,
}

impl NameMatcher {
    /// `regexp` takes precedence over `pattern`
    pub fn new(pattern: Option<&str>, regexp: Option<&str>) -> Result<Self, Error> {
        let re = match (regexp, pattern) {
            (Some(regexp), _) => Some(Regex::new(&format!("^(?:{regexp})"))?),
            (None, Some(pattern)) => Some(Regex::new(&glob_to_regex(pattern))?),
            (None, None) => None,
        };
        Ok(Self { re })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.re.as_ref().is_none_or(|re| re.is_match(name))
    }
}

pub struct Catalog {
    db: repo::DocumentStoreRef,
    keys: StoreKeys,
}

impl Catalog {
    pub fn new(db: repo::DocumentStoreRef, keys: StoreKeys) -> Self {
        Self { db, keys }
    }

    pub fn keys(&self) -> &StoreKeys {
        &self.keys
    }

    fn scope(&self) -> Result<query::Filter, Error> {
        Ok(query::Filter::new()
            .eq("bucket", self.keys.bucket())?
            .eq("prefix", self.keys.prefix())?)
    }

    /// Returns the record of `name`, the most recently written one if
    /// concurrent writers produced more than one.
    pub async fn find(&self, name: &str) -> Result<Option<MetadataRecord>, Error> {
        let filter = self.scope()?.eq("name", name)?;
        let docs = self
            .db
            .find(
                params::METADATA_COLLECTION,
                &repo::FindQuery::new().with_filter(filter),
            )
            .await?;

        docs.into_iter()
            .next_back()
            .map(MetadataRecord::from_document)
            .transpose()
    }

    /// Creates or updates the record of `update.name`.
    ///
    /// Updates keep the identity and creation time of the record and apply
    /// the attribute update policy; concurrent writers race, last write wins.
    pub async fn upsert(&self, update: MetadataUpdate) -> Result<MetadataRecord, Error> {
        match self.find(&update.name).await? {
            Some(mut record) => {
                record.kind = update.kind;
                record.kind_meta = update.kind_meta;
                record.set_location(update.location);
                merge_attributes(&mut record.attributes, update.attributes);
                record.touch();

                let id = record
                    .id
                    .ok_or_else(|| Error::MalformedRecord(format!("`{}` has no id", record.name)))?;
                let replaced = self
                    .db
                    .replace_by_id(params::METADATA_COLLECTION, id, record.to_document()?)
                    .await?;
                if !replaced {
                    // removed in the meantime, store it again
                    let ids = self
                        .db
                        .insert_many(params::METADATA_COLLECTION, vec![record.to_document()?])
                        .await?;
                    record.id = ids.into_iter().next();
                }

                trace!("updated metadata of `{}`", record.name);
                Ok(record)
            }
            None => {
                let mut record = MetadataRecord::new(
                    &update.name,
                    self.keys.bucket(),
                    self.keys.prefix(),
                    update.kind,
                    update.location,
                )
                .with_kind_meta(update.kind_meta)
                .with_attributes(update.attributes.unwrap_or_default());

                let ids = self
                    .db
                    .insert_many(params::METADATA_COLLECTION, vec![record.to_document()?])
                    .await?;
                record.id = ids.into_iter().next();

                trace!("created metadata of `{}`", record.name);
                Ok(record)
            }
        }
    }

    /// Every record in scope, optionally restricted to some kinds, in
    /// creation order
    pub async fn list(&self, kinds: &[Kind]) -> Result<Vec<MetadataRecord>, Error> {
        let mut filter = self.scope()?;
        if !kinds.is_empty() {
            filter = filter.with(
                "kind",
                query::Op::In(kinds.iter().map(|k| k.as_str().into()).collect()),
            )?;
        }

        self.db
            .find(
                params::METADATA_COLLECTION,
                &repo::FindQuery::new().with_filter(filter),
            )
            .await?
            .into_iter()
            .map(MetadataRecord::from_document)
            .collect()
    }

    pub async fn delete(&self, record: &MetadataRecord) -> Result<bool, Error> {
        match record.id {
            Some(id) => Ok(self.db.delete_by_id(params::METADATA_COLLECTION, id).await?),
            None => Ok(false),
        }
    }
}
