//! Registry that turns serialized strategy data back into strategy objects.
//!
//! Both schedules and backoffs are persisted as JSON carrying a `"type"` tag
//! (or `null` for the "as soon as possible" variants). A [`Catalog`] holds an
//! ordered list of `(matcher, decoder)` pairs; the first matcher accepting the
//! data wins. New variants can be registered at runtime.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::backoff::{BackoffCatalog, BackoffStrategy};
use crate::error::CatalogError;
use crate::schedule::{ScheduleCatalog, ScheduleStrategy};

type Matcher = Box<dyn Fn(&Value) -> bool + Send + Sync>;
type Decoder<T> = Box<dyn Fn(&Value) -> Result<Box<T>, serde_json::Error> + Send + Sync>;

/// A strategy type that knows how to recognise and decode its serialized form.
pub trait Deserializable<T: ?Sized> {
    /// Discriminator written in the `"type"` field.
    const KIND: &'static str;

    fn deserializable(data: &Value) -> bool {
        has_type_tag(data, Self::KIND)
    }

    fn deserialize(data: &Value) -> Result<Box<T>, serde_json::Error>;
}

/// Whether `data` is an object whose `"type"` field equals `kind`.
#[inline]
pub fn has_type_tag(data: &Value, kind: &str) -> bool {
    data.get("type").and_then(Value::as_str) == Some(kind)
}

/// Result of probing a catalog.
#[derive(Debug)]
pub enum Lookup<T: ?Sized> {
    Found(Box<T>),
    NotFound,
}

impl<T: ?Sized> Lookup<T> {
    pub fn into_option(self) -> Option<Box<T>> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

struct Entry<T: ?Sized> {
    kind: String,
    matches: Matcher,
    decode: Decoder<T>,
}

/// Ordered registry of strategy decoders for one strategy family.
pub struct Catalog<T: ?Sized> {
    family: &'static str,
    entries: RwLock<Vec<Entry<T>>>,
}

impl<T: ?Sized + 'static> fmt::Debug for Catalog<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("family", &self.family)
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl<T: ?Sized + 'static> Catalog<T> {
    /// Create a catalog with no registered variants.
    pub fn empty(family: &'static str) -> Self {
        Self {
            family,
            entries: RwLock::new(Vec::new()),
        }
    }

    #[inline]
    pub fn family(&self) -> &'static str {
        self.family
    }

    /// Register a strategy type. Returns `false` if its kind is already known.
    pub fn register<D>(&self) -> bool
    where
        D: Deserializable<T> + 'static,
    {
        self.register_with(D::KIND, D::deserializable, D::deserialize)
    }

    /// Register a variant from a discriminator predicate and a decoder.
    /// Returns `false` if `kind` is already registered.
    pub fn register_with<M, F>(&self, kind: impl Into<String>, matches: M, decode: F) -> bool
    where
        M: Fn(&Value) -> bool + Send + Sync + 'static,
        F: Fn(&Value) -> Result<Box<T>, serde_json::Error> + Send + Sync + 'static,
    {
        let kind = kind.into();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.iter().any(|entry| entry.kind == kind) {
            return false;
        }
        entries.push(Entry {
            kind,
            matches: Box::new(matches),
            decode: Box::new(decode),
        });
        true
    }

    /// Registered kinds in resolution order.
    pub fn kinds(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| entry.kind.clone())
            .collect()
    }

    /// Find the first variant accepting `data` and decode it.
    ///
    /// An unknown discriminator is reported as [`Lookup::NotFound`]; only data
    /// that matches a variant but fails to decode is an error.
    pub fn probe(&self, data: &Value) -> Result<Lookup<T>, CatalogError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.iter().find(|entry| (entry.matches)(data)) else {
            return Ok(Lookup::NotFound);
        };

        (entry.decode)(data)
            .map(Lookup::Found)
            .map_err(|source| CatalogError::Malformed {
                family: self.family,
                kind: entry.kind.clone(),
                source,
            })
    }

    /// Decode data previously written by this system.
    ///
    /// Unlike [`Catalog::probe`], an unknown discriminator is an integrity
    /// failure here: silently substituting a default would change how the job
    /// is retried or rescheduled.
    pub fn rehydrate(&self, data: &Value) -> Result<Box<T>, CatalogError> {
        match self.probe(data)? {
            Lookup::Found(strategy) => Ok(strategy),
            Lookup::NotFound => Err(CatalogError::Unrecognized {
                family: self.family,
                data: data.clone(),
            }),
        }
    }
}

/// The schedule and backoff catalogs a backend rehydrates persisted jobs with.
#[derive(Debug, Clone, Default)]
pub struct StrategyCatalogs {
    pub schedules: Arc<ScheduleCatalog>,
    pub backoffs: Arc<BackoffCatalog>,
}

impl StrategyCatalogs {
    pub fn new(schedules: ScheduleCatalog, backoffs: BackoffCatalog) -> Self {
        Self {
            schedules: Arc::new(schedules),
            backoffs: Arc::new(backoffs),
        }
    }

    pub fn schedule(&self, data: &Value) -> Result<Box<dyn ScheduleStrategy>, CatalogError> {
        self.schedules.rehydrate(data)
    }

    pub fn backoff(&self, data: &Value) -> Result<Box<dyn BackoffStrategy>, CatalogError> {
        self.backoffs.rehydrate(data)
    }
}
