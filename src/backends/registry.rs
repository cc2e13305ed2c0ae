//! Backend Registry.
//!
//! Dispatch happens in two tiers: backends registered on the registry are
//! asked first, in registration order, whether they claim an object; if none
//! does, the input capability selects one of the built-in strategies.
use log::trace;
use std::sync::Arc;

use super::{
    BackendRef, DocumentBackend, Error, GroupsBackend, ModelBackend, ParquetBackend, PutOptions,
    RowsBackend,
};
use crate::types::{Kind, Object};

/// What an input object can be stored as, in dispatch order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Model,
    Tabular,
    Array,
    Composite,
}

impl Capability {
    pub fn of(obj: &Object) -> Option<Self> {
        match obj {
            Object::Model(_) => Some(Self::Model),
            Object::Frame(_) | Object::Series(_) => Some(Self::Tabular),
            Object::Array(_) => Some(Self::Array),
            obj if obj.is_composite() => Some(Self::Composite),
            _ => None,
        }
    }

    /// Built-in kind for this capability given the put options
    pub fn kind(&self, obj: &Object, options: &PutOptions) -> Kind {
        match self {
            Self::Model => Kind::MODEL,
            Self::Tabular if options.groupby.is_some() => Kind::FRAME_GROUPS,
            Self::Tabular if options.as_binary => Kind::FRAME_PARQUET,
            Self::Tabular if matches!(obj, Object::Series(_)) => Kind::SERIES_ROWS,
            Self::Tabular => Kind::FRAME_ROWS,
            Self::Array => Kind::FRAME_PARQUET,
            Self::Composite if options.as_binary => Kind::FRAME_PARQUET,
            Self::Composite => Kind::DOCUMENT,
        }
    }
}

pub struct BackendRegistry {
    registered: Vec<(Kind, BackendRef)>,
    builtins: Vec<BackendRef>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            registered: Vec::new(),
            builtins: vec![
                Arc::new(RowsBackend),
                Arc::new(GroupsBackend),
                Arc::new(ParquetBackend),
                Arc::new(DocumentBackend),
                Arc::new(ModelBackend),
            ],
        }
    }

    /// Binds `kind` to `backend`. Registering a kind again replaces its
    /// backend, keeping its dispatch position.
    pub fn register(&mut self, kind: Kind, backend: BackendRef) {
        match self.registered.iter_mut().find(|(k, _)| *k == kind) {
            Some(entry) => entry.1 = backend,
            None => self.registered.push((kind, backend)),
        }
    }

    /// Registered kinds, in dispatch order
    pub fn kinds(&self) -> impl Iterator<Item = &Kind> {
        self.registered.iter().map(|(k, _)| k)
    }

    fn builtin_for_kind(&self, kind: &Kind) -> Option<BackendRef> {
        self.builtins
            .iter()
            .find(|b| b.kinds().contains(kind))
            .cloned()
    }

    /// Backend reading `kind`, registered backends take precedence
    pub fn backend_for_kind(&self, kind: &Kind) -> Option<BackendRef> {
        self.registered
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, b)| b.clone())
            .or_else(|| self.builtin_for_kind(kind))
    }

    /// Selects the backend storing `obj`.
    ///
    /// Fails with [`Error::UnsupportedType`] when no backend claims it.
    pub fn backend_for_object(
        &self,
        obj: &Object,
        name: &str,
        options: &PutOptions,
    ) -> Result<BackendRef, Error> {
        if let Some((kind, backend)) = self
            .registered
            .iter()
            .find(|(_, b)| b.supports(obj, name, options))
        {
            trace!("`{}` claimed by registered backend `{}`", name, kind);
            return Ok(backend.clone());
        }

        let kind = match (&options.kind, Capability::of(obj)) {
            (Some(kind), _) => kind.clone(),
            (None, Some(capability)) => capability.kind(obj, options),
            (None, None) => return Err(Error::UnsupportedType(obj.type_name().to_owned())),
        };

        trace!("`{}` dispatched to built-in kind `{}`", name, kind);
        self.builtin_for_kind(&kind)
            .filter(|b| b.supports(obj, name, options))
            .ok_or_else(|| Error::UnsupportedType(obj.type_name().to_owned()))
    }
}
