mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::store::{Collection, Expected, IndexField, RecordStore, StoredRecord, VersionMismatch};

/// SQLite-backed [`RecordStore`].
///
/// Documents live in `records`; their equality-indexed fields live in `record_fields`.
/// A single connection guarded by a mutex serializes all access, which is what makes
/// the version check in [`RecordStore::put`] atomic.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "rollcall")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("rollcall.db"))
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: Collection) -> Result<i64> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let count = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?",
            [collection.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl RecordStore for Database {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<StoredRecord>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT key, version, body FROM records WHERE collection = ? AND key = ?",
        )?;

        let mut rows = stmt.query((collection.as_str(), key))?;
        if let Some(row) = rows.next()? {
            Ok(Some(StoredRecord {
                key: row.get(0)?,
                version: row.get(1)?,
                body: parse_body(row.get::<_, String>(2)?)?,
            }))
        } else {
            Ok(None)
        }
    }

    fn put(
        &self,
        collection: Collection,
        key: &str,
        body: &Value,
        index: &[IndexField],
        expected: Expected,
    ) -> Result<i64> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        let actual: Option<i64> = tx
            .query_row(
                "SELECT version FROM records WHERE collection = ? AND key = ?",
                (collection.as_str(), key),
                |row| row.get(0),
            )
            .optional()?;

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
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO records (collection, key, version, body, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (collection, key)
             DO UPDATE SET version = excluded.version, body = excluded.body, updated_at = excluded.updated_at",
            (
                collection.as_str(),
                key,
                version,
                serde_json::to_string(body)?,
                &now,
            ),
        )?;

        tx.execute(
            "DELETE FROM record_fields WHERE collection = ? AND key = ?",
            (collection.as_str(), key),
        )?;
        for (field, value) in index {
            tx.execute(
                "INSERT INTO record_fields (collection, key, field, value) VALUES (?, ?, ?, ?)",
                (collection.as_str(), key, *field, value),
            )?;
        }

        tx.commit()?;
        Ok(version)
    }

    fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM record_fields WHERE collection = ? AND key = ?",
            (collection.as_str(), key),
        )?;
        let rows = tx.execute(
            "DELETE FROM records WHERE collection = ? AND key = ?",
            (collection.as_str(), key),
        )?;
        tx.commit()?;
        Ok(rows > 0)
    }

    fn query(&self, collection: Collection, filters: &[(&str, &str)]) -> Result<Vec<StoredRecord>> {
        let conn = self.conn.lock().expect("database lock poisoned");

        let mut sql = String::from("SELECT r.key, r.version, r.body FROM records r WHERE r.collection = ?");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(collection.as_str())];

        for (field, value) in filters {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM record_fields f
                   WHERE f.collection = r.collection AND f.key = r.key AND f.field = ? AND f.value = ?)",
            );
            params.push(Box::new(field.to_string()));
            params.push(Box::new(value.to_string()));
        }
        sql.push_str(" ORDER BY r.key");

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, version, body)| {
                Ok(StoredRecord {
                    key,
                    version,
                    body: parse_body(body)?,
                })
            })
            .collect()
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn parse_body(s: String) -> Result<Value> {
    Ok(serde_json::from_str(&s)?)
}
