//! `SQLite`-backed allocation authority.

use crate::authority::{AllocationAuthority, AllocationError};
use df_nb_core::{PartitionName, UniqueKey};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Allocation authority persisting per-partition counters in `SQLite`.
///
/// All requests share one connection and are serialized by its lock.
pub struct SqliteAuthority {
    conn: Mutex<Connection>,
    max_key: Option<u64>,
}

impl SqliteAuthority {
    /// Open or create a counter database.
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
            CREATE TABLE IF NOT EXISTS unique_keys (
                partition TEXT PRIMARY KEY,
                last_key INTEGER NOT NULL
            );
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            max_key: None,
        })
    }

    /// Bound every partition's key space to `1..=max_key`.
    #[must_use]
    pub fn with_max_key(mut self, max_key: u64) -> Self {
        self.max_key = Some(max_key);
        self
    }

    /// Last key handed out in `partition`.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn last_key(&self, partition: &PartitionName) -> Result<Option<UniqueKey>, AllocationError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AllocationError::unavailable(partition, "connection lock poisoned"))?;

        let last: Option<i64> = conn
            .query_row(
                "SELECT last_key FROM unique_keys WHERE partition = ?1",
                [partition.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AllocationError::unavailable(partition, e.to_string()))?;

        last.map(|key| to_key(partition, key)).transpose()
    }

    fn allocate(&self, partition: &PartitionName) -> Result<UniqueKey, AllocationError> {
        let backend = |e: rusqlite::Error| AllocationError::unavailable(partition, e.to_string());

        let mut conn = self
            .conn
            .lock()
            .map_err(|_| AllocationError::unavailable(partition, "connection lock poisoned"))?;
        let tx = conn.transaction().map_err(backend)?;

        let next: i64 = tx
            .query_row(
                r"
                INSERT INTO unique_keys (partition, last_key) VALUES (?1, 1)
                ON CONFLICT(partition) DO UPDATE SET last_key = unique_keys.last_key + 1
                RETURNING last_key
                ",
                [partition.as_str()],
                |row| row.get(0),
            )
            .map_err(backend)?;
        let key = to_key(partition, next)?;

        if self.max_key.is_some_and(|max| key.get() > max) {
            tx.rollback().map_err(backend)?;
            return Err(AllocationError::exhausted(partition));
        }

        tx.commit().map_err(backend)?;
        Ok(key)
    }
}

impl AllocationAuthority for SqliteAuthority {
    async fn allocate_unique_key(
        &self,
        partition: &PartitionName,
    ) -> Result<UniqueKey, AllocationError> {
        let key = self.allocate(partition)?;
        tracing::debug!(partition = %partition, %key, "Allocated key from SQLite counter");
        Ok(key)
    }
}

fn to_key(partition: &PartitionName, value: i64) -> Result<UniqueKey, AllocationError> {
    u64::try_from(value)
        .map(UniqueKey)
        .map_err(|_| AllocationError::unavailable(partition, format!("corrupt counter {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lport() -> PartitionName {
        PartitionName::new("lport").unwrap()
    }

    #[tokio::test]
    async fn sqlite_allocates_sequential_keys() {
        let authority = SqliteAuthority::in_memory().unwrap();

        let first = authority.allocate_unique_key(&lport()).await.unwrap();
        let second = authority.allocate_unique_key(&lport()).await.unwrap();

        assert_eq!(first, UniqueKey(1));
        assert_eq!(second, UniqueKey(2));
        assert_eq!(authority.last_key(&lport()).unwrap(), Some(second));
    }

    #[tokio::test]
    async fn sqlite_counters_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.db");

        let first = {
            let authority = SqliteAuthority::open(&path).unwrap();
            authority.allocate_unique_key(&lport()).await.unwrap()
        };

        let authority = SqliteAuthority::open(&path).unwrap();
        let second = authority.allocate_unique_key(&lport()).await.unwrap();

        assert!(second > first);
    }

    #[tokio::test]
    async fn sqlite_exhaustion_does_not_consume() {
        let authority = SqliteAuthority::in_memory().unwrap().with_max_key(1);

        authority.allocate_unique_key(&lport()).await.unwrap();
        let err = authority.allocate_unique_key(&lport()).await.unwrap_err();

        assert!(matches!(err, AllocationError::Exhausted { .. }));
        assert_eq!(authority.last_key(&lport()).unwrap(), Some(UniqueKey(1)));
    }

    #[test]
    fn sqlite_partitions_are_independent() {
        let authority = SqliteAuthority::in_memory().unwrap();
        let lswitch = PartitionName::new("lswitch").unwrap();

        let (port_key, switch_key) = tokio_test::block_on(async {
            authority.allocate_unique_key(&lport()).await.unwrap();
            (
                authority.allocate_unique_key(&lport()).await.unwrap(),
                authority.allocate_unique_key(&lswitch).await.unwrap(),
            )
        });

        assert_eq!(port_key, UniqueKey(2));
        assert_eq!(switch_key, UniqueKey(1));
    }
}
