use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde_json::Value;

use super::{Collection, Expected, IndexField, RecordStore, StoredRecord, VersionMismatch};

#[derive(Debug, Clone)]
struct Entry {
    version: i64,
    body: Value,
    index: Vec<(String, String)>,
}

/// A [`RecordStore`] held entirely in memory. Cloning shares the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<(Collection, String), Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<StoredRecord>> {
        let entries = self.entries.lock().expect("memory store lock poisoned");
        Ok(entries
            .get(&(collection, key.to_string()))
            .map(|entry| StoredRecord {
                key: key.to_string(),
                version: entry.version,
                body: entry.body.clone(),
            }))
    }

    fn put(
        &self,
        collection: Collection,
        key: &str,
        body: &Value,
        index: &[IndexField],
        expected: Expected,
    ) -> Result<i64> {
        let mut entries = self.entries.lock().expect("memory store lock poisoned");
        let slot = (collection, key.to_string());
        let actual = entries.get(&slot).map(|e| e.version);

        let allowed = match expected {
            Expected::Any => true,
            Expected::Absent => actual.is_none(),
            Expected::Version(v) => actual == Some(v),
        };
        if !allowed {
            return Err(VersionMismatch {
                collection,
                key: key.to_string(),
                expected,
                actual,
            }
            .into());
        }

        let version = actual.unwrap_or(0) + 1;
        entries.insert(
            slot,
            Entry {
                version,
                body: body.clone(),
                index: index
                    .iter()
                    .map(|(field, value)| (field.to_string(), value.clone()))
                    .collect(),
            },
        );
        Ok(version)
    }

    fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().expect("memory store lock poisoned");
        Ok(entries.remove(&(collection, key.to_string())).is_some())
    }

    fn query(&self, collection: Collection, filters: &[(&str, &str)]) -> Result<Vec<StoredRecord>> {
        let entries = self.entries.lock().expect("memory store lock poisoned");
        let records = entries
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .filter(|(_, entry)| {
                filters.iter().all(|(field, value)| {
                    entry
                        .index
                        .iter()
                        .any(|(f, v)| f == field && v == value)
                })
            })
            .map(|((_, key), entry)| StoredRecord {
                key: key.clone(),
                version: entry.version,
                body: entry.body.clone(),
            })
            .collect();
        Ok(records)
    }
}
