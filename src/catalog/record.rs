use serde::{Deserialize, Serialize};

use super::Error;
use crate::repo;
use crate::types::{Attributes, Kind, Timestamp};

/// Physical location of a stored payload
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// Document collection, optionally a single document in it
    Collection {
        name: String,
        objid: Option<repo::DocumentId>,
    },
    /// Blob store entry
    Blob { key: String },
}

/// Catalog entry describing one stored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(skip)]
    pub id: Option<repo::DocumentId>,

    pub name: String,
    pub bucket: String,
    pub prefix: String,
    pub kind: Kind,
    #[serde(default)]
    pub kind_meta: serde_json::Value,
    #[serde(default)]
    pub attributes: Attributes,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    objid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gridfile: Option<String>,

    /// UNIX timestamp in milliseconds from the creation
    created: i64,
    /// UNIX timestamp in milliseconds from the last update
    modified: i64,
}

impl MetadataRecord {
    pub fn new(name: &str, bucket: &str, prefix: &str, kind: Kind, location: Location) -> Self {
        let now: i64 = Timestamp::now().into();
        let mut record = Self {
            id: None,
            name: name.to_owned(),
            bucket: bucket.to_owned(),
            prefix: prefix.to_owned(),
            kind,
            kind_meta: serde_json::Value::Object(Default::default()),
            attributes: Attributes::new(),
            collection: None,
            objid: None,
            gridfile: None,
            created: now,
            modified: now,
        };
        record.set_location(location);
        record
    }

    pub fn with_kind_meta(mut self, kind_meta: serde_json::Value) -> Self {
        self.kind_meta = kind_meta;
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn set_location(&mut self, location: Location) {
        match location {
            Location::Collection { name, objid } => {
                self.collection = Some(name);
                self.objid = objid.map(|id| id.to_string());
                self.gridfile = None;
            }
            Location::Blob { key } => {
                self.collection = None;
                self.objid = None;
                self.gridfile = Some(key);
            }
        }
    }

    pub fn location(&self) -> Result<Location, Error> {
        match (&self.collection, &self.gridfile) {
            (Some(name), None) => {
                let objid = self
                    .objid
                    .as_deref()
                    .map(uuid::Uuid::parse_str)
                    .transpose()
                    .map_err(|e| Error::MalformedRecord(format!("`{}` objid: {e}", self.name)))?;
                Ok(Location::Collection {
                    name: name.clone(),
                    objid,
                })
            }
            (None, Some(key)) => Ok(Location::Blob { key: key.clone() }),
            _ => Err(Error::MalformedRecord(format!(
                "`{}` must reference exactly one of a collection or a blob",
                self.name
            ))),
        }
    }

    pub fn created(&self) -> Timestamp {
        Timestamp::from(self.created)
    }

    pub fn modified(&self) -> Timestamp {
        Timestamp::from(self.modified)
    }

    pub(super) fn touch(&mut self) {
        self.modified = Timestamp::now().into();
    }

    pub(super) fn to_document(&self) -> Result<repo::Document, Error> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(doc) => Ok(doc),
            _ => Err(Error::MalformedRecord(self.name.clone())),
        }
    }

    pub(super) fn from_document(doc: repo::Document) -> Result<Self, Error> {
        let id = repo::document_id(&doc);
        let mut record: Self = serde_json::from_value(serde_json::Value::Object(doc))?;
        record.id = id;
        Ok(record)
    }
}

/// Metadata produced by a backend put, committed by the catalog once the
/// physical write succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataUpdate {
    pub name: String,
    pub kind: Kind,
    pub kind_meta: serde_json::Value,
    /// `None` leaves existing attributes untouched
    pub attributes: Option<Attributes>,
    pub location: Location,
}

impl MetadataUpdate {
    pub fn new(name: &str, kind: Kind, location: Location) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            kind_meta: serde_json::Value::Object(Default::default()),
            attributes: None,
            location,
        }
    }

    pub fn with_kind_meta(mut self, kind_meta: serde_json::Value) -> Self {
        self.kind_meta = kind_meta;
        self
    }

    pub fn with_attributes(mut self, attributes: Option<Attributes>) -> Self {
        self.attributes = attributes;
        self
    }
}
