//! Model persistence.
//!
//! Objects are stored as JSON bodies keyed by `(table, id)`, with the topic,
//! unique key and version lifted into columns for indexing.

use chrono::Utc;
use df_nb_core::{Model, UniqueKey, Version};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// A stored model object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Table name
    pub table: String,
    /// Object id
    pub id: String,
    /// Model topic, if topic-partitioned
    pub topic: Option<String>,
    /// Unique key, if keyed
    pub unique_key: Option<UniqueKey>,
    /// Version, if versioned
    pub version: Option<Version>,
    /// JSON-encoded object
    pub body: Vec<u8>,
}

impl StoredRecord {
    /// Encode a model object.
    ///
    /// # Errors
    ///
    /// Returns error if the object cannot be serialized.
    pub fn from_model<M: Model>(obj: &M) -> Result<Self, StoreError> {
        let body = serde_json::to_vec(obj).map_err(|e| StoreError::Codec(e.to_string()))?;
        Ok(Self {
            table: M::TABLE_NAME.to_string(),
            id: obj.id().to_string(),
            topic: obj.topic_name().map(str::to_string),
            unique_key: obj.assigned_key(),
            version: obj.current_version(),
            body,
        })
    }

    /// Decode the stored object.
    ///
    /// # Errors
    ///
    /// Returns error if the body does not decode as `M`.
    pub fn to_model<M: Model>(&self) -> Result<M, StoreError> {
        serde_json::from_slice(&self.body).map_err(|e| StoreError::Codec(e.to_string()))
    }
}

/// Storage backend for model objects.
pub trait ModelStore: Send + Sync {
    /// Insert a new object.
    ///
    /// # Errors
    ///
    /// Returns error if the id or the unique key is already taken in the table.
    fn insert(&self, record: &StoredRecord) -> Result<(), StoreError>;

    /// Replace an existing object whose stored version is still `expected`.
    ///
    /// # Errors
    ///
    /// Returns error if the object does not exist or another writer changed
    /// its version in the meantime.
    fn replace(
        &self,
        record: &StoredRecord,
        expected: Option<Version>,
    ) -> Result<(), StoreError>;

    /// Get an object.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn get(&self, table: &str, id: &str) -> Result<Option<StoredRecord>, StoreError>;

    /// Delete an object. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError>;

    /// List objects of a table, optionally restricted to one topic.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn list(&self, table: &str, topic: Option<&str>) -> Result<Vec<StoredRecord>, StoreError>;
}

/// Errors for store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Object id already present in the table
    #[error("{table}/{id} already exists")]
    Duplicate {
        /// Table name
        table: String,
        /// Object id
        id: String,
    },
    /// Unique key already used by another object of the table
    #[error("{table}: unique key {key} already in use")]
    DuplicateKey {
        /// Table name
        table: String,
        /// Conflicting key
        key: UniqueKey,
    },
    /// Object missing on replace
    #[error("{table}/{id} not found")]
    Missing {
        /// Table name
        table: String,
        /// Object id
        id: String,
    },
    /// Stored version moved on since the writer read it
    #[error("{table}/{id}: expected version {expected:?}, found {actual:?}")]
    Conflict {
        /// Table name
        table: String,
        /// Object id
        id: String,
        /// Version the writer read
        expected: Option<Version>,
        /// Version currently stored
        actual: Option<Version>,
    },
    /// Body encoding failed
    #[error("codec error: {0}")]
    Codec(String),
    /// Backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// In-memory model store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(String, String), StoredRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), StoredRecord>>, StoreError>
    {
        self.records
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }
}

impl ModelStore for MemoryStore {
    fn insert(&self, record: &StoredRecord) -> Result<(), StoreError> {
        let mut records = self.lock()?;
        let slot = (record.table.clone(), record.id.clone());
        if records.contains_key(&slot) {
            return Err(StoreError::Duplicate {
                table: record.table.clone(),
                id: record.id.clone(),
            });
        }
        if let Some(key) = record.unique_key {
            let taken = records
                .values()
                .any(|r| r.table == record.table && r.unique_key == Some(key));
            if taken {
                return Err(StoreError::DuplicateKey {
                    table: record.table.clone(),
                    key,
                });
            }
        }
        records.insert(slot, record.clone());
        Ok(())
    }

    fn replace(
        &self,
        record: &StoredRecord,
        expected: Option<Version>,
    ) -> Result<(), StoreError> {
        let mut records = self.lock()?;
        match records.get_mut(&(record.table.clone(), record.id.clone())) {
            Some(held) if held.version != expected => Err(StoreError::Conflict {
                table: record.table.clone(),
                id: record.id.clone(),
                expected,
                actual: held.version,
            }),
            Some(held) => {
                *held = record.clone();
                Ok(())
            }
            None => Err(StoreError::Missing {
                table: record.table.clone(),
                id: record.id.clone(),
            }),
        }
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self
            .lock()?
            .get(&(table.to_string(), id.to_string()))
            .cloned())
    }

    fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()?
            .remove(&(table.to_string(), id.to_string()))
            .is_some())
    }

    fn list(&self, table: &str, topic: Option<&str>) -> Result<Vec<StoredRecord>, StoreError> {
        let mut listed: Vec<_> = self
            .lock()?
            .values()
            .filter(|r| r.table == table)
            .filter(|r| topic.map_or(true, |t| r.topic.as_deref() == Some(t)))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listed)
    }
}

/// `SQLite`-backed model store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened or initialized.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be created.
    pub fn in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS nb_objects (
                table_name TEXT NOT NULL,
                id TEXT NOT NULL,
                topic TEXT,
                unique_key INTEGER,
                version INTEGER,
                body BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (table_name, id)
            );

            -- Keys are unique per table
            CREATE UNIQUE INDEX IF NOT EXISTS idx_nb_objects_unique_key
                ON nb_objects(table_name, unique_key) WHERE unique_key IS NOT NULL;

            CREATE INDEX IF NOT EXISTS idx_nb_objects_topic ON nb_objects(table_name, topic);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))
    }
}

impl ModelStore for SqliteStore {
    fn insert(&self, record: &StoredRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;

        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM nb_objects WHERE table_name = ?1 AND id = ?2",
                (&record.table, &record.id),
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::Duplicate {
                table: record.table.clone(),
                id: record.id.clone(),
            });
        }

        let result = conn.execute(
            r"
            INSERT INTO nb_objects (table_name, id, topic, unique_key, version, body, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            (
                &record.table,
                &record.id,
                &record.topic,
                to_i64(record.unique_key.map(UniqueKey::get))?,
                to_i64(record.version)?,
                &record.body,
                Utc::now().timestamp(),
            ),
        );

        match (result, record.unique_key) {
            (Ok(_), _) => Ok(()),
            (Err(rusqlite::Error::SqliteFailure(e, _)), Some(key))
                if e.code == ErrorCode::ConstraintViolation
                    && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(StoreError::DuplicateKey {
                    table: record.table.clone(),
                    key,
                })
            }
            (Err(e), _) => Err(e.into()),
        }
    }

    fn replace(
        &self,
        record: &StoredRecord,
        expected: Option<Version>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            r"
            UPDATE nb_objects
            SET topic = ?3, unique_key = ?4, version = ?5, body = ?6, updated_at = ?7
            WHERE table_name = ?1 AND id = ?2 AND version IS ?8
            ",
            (
                &record.table,
                &record.id,
                &record.topic,
                to_i64(record.unique_key.map(UniqueKey::get))?,
                to_i64(record.version)?,
                &record.body,
                Utc::now().timestamp(),
                to_i64(expected)?,
            ),
        )?;
        if updated > 0 {
            return Ok(());
        }

        let actual: Option<Option<i64>> = conn
            .query_row(
                "SELECT version FROM nb_objects WHERE table_name = ?1 AND id = ?2",
                (&record.table, &record.id),
                |row| row.get(0),
            )
            .optional()?;

        match actual {
            None => Err(StoreError::Missing {
                table: record.table.clone(),
                id: record.id.clone(),
            }),
            Some(actual) => Err(StoreError::Conflict {
                table: record.table.clone(),
                id: record.id.clone(),
                expected,
                actual: actual.map(from_i64).transpose()?,
            }),
        }
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r"
            SELECT table_name, id, topic, unique_key, version, body FROM nb_objects
            WHERE table_name = ?1 AND id = ?2
            ",
        )?;

        let record = stmt.query_row((table, id), read_record).optional()?;
        Ok(record)
    }

    fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        let deleted = self.lock()?.execute(
            "DELETE FROM nb_objects WHERE table_name = ?1 AND id = ?2",
            (table, id),
        )?;
        Ok(deleted > 0)
    }

    fn list(&self, table: &str, topic: Option<&str>) -> Result<Vec<StoredRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r"
            SELECT table_name, id, topic, unique_key, version, body FROM nb_objects
            WHERE table_name = ?1 AND (?2 IS NULL OR topic = ?2)
            ORDER BY id ASC
            ",
        )?;

        let records = stmt
            .query_map((table, topic), read_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    let unique_key: Option<i64> = row.get(3)?;
    let version: Option<i64> = row.get(4)?;
    Ok(StoredRecord {
        table: row.get(0)?,
        id: row.get(1)?,
        topic: row.get(2)?,
        unique_key: unique_key.map(from_i64).transpose()?.map(UniqueKey),
        version: version.map(from_i64).transpose()?,
        body: row.get(5)?,
    })
}

fn to_i64(value: Option<u64>) -> Result<Option<i64>, StoreError> {
    value
        .map(i64::try_from)
        .transpose()
        .map_err(|e| StoreError::Codec(e.to_string()))
}

fn from_i64(value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Integer, Box::new(e))
    })
}
