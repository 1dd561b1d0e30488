//! Process bootstrap: build the configured authority, store and publisher.

use crate::config::{ApiConfig, AuthorityKind, StoreKind};
use crate::publisher::{
    spawn_eventloop, BroadcastPublisher, MqttPublisher, PublishError, UpdatePublisher,
};
use crate::store::{MemoryStore, ModelStore, SqliteStore, StoreError, StoredRecord};
use anyhow::{Context, Result};
use df_nb_allocator::{
    AllocationAuthority, AllocationError, HttpAuthority, HttpAuthorityConfig, MemoryAuthority,
    SqliteAuthority,
};
use df_nb_core::{PartitionName, UniqueKey, Version};
use df_nb_proto::{DbUpdate, TopicScheme};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Any configured allocation authority.
pub enum AnyAuthority {
    /// In-process counters
    Memory(MemoryAuthority),
    /// `SQLite` counters
    Sqlite(SqliteAuthority),
    /// Remote allocation service
    Http(HttpAuthority),
}

impl AllocationAuthority for AnyAuthority {
    async fn allocate_unique_key(
        &self,
        partition: &PartitionName,
    ) -> Result<UniqueKey, AllocationError> {
        match self {
            Self::Memory(authority) => authority.allocate_unique_key(partition).await,
            Self::Sqlite(authority) => authority.allocate_unique_key(partition).await,
            Self::Http(authority) => authority.allocate_unique_key(partition).await,
        }
    }
}

/// Any configured model store.
pub enum AnyStore {
    /// In-process map
    Memory(MemoryStore),
    /// `SQLite` database
    Sqlite(SqliteStore),
}

impl AnyStore {
    fn inner(&self) -> &dyn ModelStore {
        match self {
            Self::Memory(store) => store,
            Self::Sqlite(store) => store,
        }
    }
}

impl ModelStore for AnyStore {
    fn insert(&self, record: &StoredRecord) -> Result<(), StoreError> {
        self.inner().insert(record)
    }

    fn replace(
        &self,
        record: &StoredRecord,
        expected: Option<Version>,
    ) -> Result<(), StoreError> {
        self.inner().replace(record, expected)
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<StoredRecord>, StoreError> {
        self.inner().get(table, id)
    }

    fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        self.inner().delete(table, id)
    }

    fn list(&self, table: &str, topic: Option<&str>) -> Result<Vec<StoredRecord>, StoreError> {
        self.inner().list(table, topic)
    }
}

/// Any configured update publisher.
pub enum AnyPublisher {
    /// In-process fan-out
    Broadcast(BroadcastPublisher),
    /// MQTT broker
    Mqtt(MqttPublisher),
}

impl UpdatePublisher for AnyPublisher {
    async fn publish(&self, update: &DbUpdate) -> Result<(), PublishError> {
        match self {
            Self::Broadcast(publisher) => publisher.publish(update).await,
            Self::Mqtt(publisher) => publisher.publish(update).await,
        }
    }
}

/// Build the configured allocation authority.
///
/// # Errors
///
/// Returns error if the counter database cannot be opened or the HTTP
/// client cannot be created.
pub fn connect_authority(config: &ApiConfig) -> Result<AnyAuthority> {
    let settings = &config.authority;

    let authority = match settings.kind {
        AuthorityKind::Memory => {
            let mut authority = MemoryAuthority::new();
            if let Some(max_key) = settings.max_key {
                authority = authority.with_max_key(max_key);
            }
            AnyAuthority::Memory(authority)
        }
        AuthorityKind::Sqlite => {
            let mut authority = SqliteAuthority::open(&settings.db_path).with_context(|| {
                format!("Failed to open key database {}", settings.db_path.display())
            })?;
            if let Some(max_key) = settings.max_key {
                authority = authority.with_max_key(max_key);
            }
            AnyAuthority::Sqlite(authority)
        }
        AuthorityKind::Http => {
            let authority = HttpAuthority::new(HttpAuthorityConfig {
                base_url: settings.url.clone(),
                timeout: settings.timeout,
                bearer_token: settings.bearer_token.clone(),
            })
            .context("Failed to create HTTP client")?;
            AnyAuthority::Http(authority)
        }
    };

    tracing::info!(kind = %settings.kind, "Allocation authority connected");
    Ok(authority)
}

/// Open the configured model store.
///
/// # Errors
///
/// Returns error if the database cannot be opened.
pub fn open_store(config: &ApiConfig) -> Result<AnyStore> {
    let store = match config.store.kind {
        StoreKind::Memory => AnyStore::Memory(MemoryStore::new()),
        StoreKind::Sqlite => {
            let path = &config.store.db_path;
            let store = SqliteStore::open(path)
                .with_context(|| format!("Failed to open model database {}", path.display()))?;
            AnyStore::Sqlite(store)
        }
    };

    tracing::info!(kind = %config.store.kind, "Model store opened");
    Ok(store)
}

/// Build the configured update publisher.
///
/// With an MQTT broker configured, the client event loop is spawned on the
/// current runtime and its handle returned.
///
/// # Errors
///
/// Returns error if the broker URL is invalid.
pub fn connect_publisher(config: &ApiConfig) -> Result<(AnyPublisher, Option<JoinHandle<()>>)> {
    let Some(broker) = config.events.mqtt_broker.as_deref() else {
        return Ok((AnyPublisher::Broadcast(BroadcastPublisher::default()), None));
    };

    let client_id = format!("df-nb-{}", Uuid::new_v4());
    let scheme = TopicScheme::new(config.events.tenant.clone());
    let (publisher, eventloop) = MqttPublisher::new(broker, &client_id, scheme)
        .with_context(|| format!("Failed to configure MQTT publisher for {broker}"))?;

    tracing::info!(broker, %client_id, tenant = %config.events.tenant, "MQTT publisher configured");

    Ok((AnyPublisher::Mqtt(publisher), Some(spawn_eventloop(eventloop))))
}
