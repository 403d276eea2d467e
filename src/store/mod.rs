//! Keyed-record persistence.
//!
//! Every aggregate is stored as a JSON document under `(collection, key)`, with a
//! version that increments on each write. Writes can be made conditional on the
//! version (compare-and-swap), and each document can expose a few string fields that
//! [`RecordStore::query`] matches by equality.
//!
//! [`MemoryStore`] keeps everything in a map; [`crate::db::Database`] keeps it in SQLite.

mod memory;

pub use memory::MemoryStore;

use std::fmt;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::IntegrityError;

/// The logical collections the scheduling core persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Templates,
    Schedules,
    Instances,
    Attendance,
    Feedback,
    FeedbackTemplates,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Templates => "templates",
            Self::Schedules => "schedules",
            Self::Instances => "instances",
            Self::Attendance => "attendance",
            Self::Feedback => "feedback",
            Self::FeedbackTemplates => "feedback_templates",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Precondition for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// Write unconditionally.
    Any,
    /// The key must not exist yet.
    Absent,
    /// The stored version must be exactly this.
    Version(i64),
}

/// Raised (inside `anyhow::Error`) when a conditional write loses.
#[derive(Debug, thiserror::Error)]
#[error("version mismatch on {collection}/{key}: expected {expected:?}, found {actual:?}")]
pub struct VersionMismatch {
    pub collection: Collection,
    pub key: String,
    pub expected: Expected,
    pub actual: Option<i64>,
}

/// Whether `err` is a lost compare-and-swap.
pub fn is_version_mismatch(err: &anyhow::Error) -> bool {
    err.downcast_ref::<VersionMismatch>().is_some()
}

/// A stored document with its version.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub version: i64,
    pub body: Value,
}

/// An equality-indexed field of a stored document.
pub type IndexField = (&'static str, String);

/// The storage interface. Implementations must make `put` atomic with respect to its
/// version check.
pub trait RecordStore: Send + Sync {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<StoredRecord>>;

    /// Write `body` under `key`, replacing its indexed fields. Returns the new version.
    fn put(
        &self,
        collection: Collection,
        key: &str,
        body: &Value,
        index: &[IndexField],
        expected: Expected,
    ) -> Result<i64>;

    fn delete(&self, collection: Collection, key: &str) -> Result<bool>;

    /// Records whose indexed fields equal every `(field, value)` pair, ordered by key.
    /// An empty filter returns the whole collection.
    fn query(&self, collection: Collection, filters: &[(&str, &str)]) -> Result<Vec<StoredRecord>>;
}

/// A document type persisted through a [`RecordStore`].
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn key(&self) -> String;

    fn index(&self) -> Vec<IndexField> {
        Vec::new()
    }
}

/// A decoded record and the version it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<R> {
    pub version: i64,
    pub record: R,
}

fn decode<R: Record>(stored: StoredRecord) -> crate::Result<Versioned<R>> {
    let record = serde_json::from_value(stored.body).map_err(|e| IntegrityError::CorruptRecord {
        collection: R::COLLECTION.as_str(),
        key: stored.key.clone(),
        message: e.to_string(),
    })?;
    Ok(Versioned {
        version: stored.version,
        record,
    })
}

/// Typed access on top of any [`RecordStore`].
pub trait RecordStoreExt: RecordStore {
    fn load<R: Record>(&self, key: &str) -> crate::Result<Option<Versioned<R>>> {
        self.get(R::COLLECTION, key)?.map(decode).transpose()
    }

    fn save<R: Record>(&self, record: &R, expected: Expected) -> crate::Result<i64> {
        let body = serde_json::to_value(record).map_err(anyhow::Error::from)?;
        let version = self.put(R::COLLECTION, &record.key(), &body, &record.index(), expected)?;
        Ok(version)
    }

    /// Like [`save`](Self::save), but hands a lost version check back to the caller
    /// instead of treating it as a storage failure.
    fn compare_and_save<R: Record>(
        &self,
        record: &R,
        expected: Expected,
    ) -> crate::Result<std::result::Result<i64, VersionMismatch>> {
        let body = serde_json::to_value(record).map_err(anyhow::Error::from)?;
        match self.put(R::COLLECTION, &record.key(), &body, &record.index(), expected) {
            Ok(version) => Ok(Ok(version)),
            Err(err) => match err.downcast::<VersionMismatch>() {
                Ok(mismatch) => Ok(Err(mismatch)),
                Err(err) => Err(err.into()),
            },
        }
    }

    fn find<R: Record>(&self, filters: &[(&str, &str)]) -> crate::Result<Vec<Versioned<R>>> {
        self.query(R::COLLECTION, filters)?
            .into_iter()
            .map(decode)
            .collect()
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}
