use df_nb_allocator::{AllocationAuthority, AuthoritySlot, MemoryAuthority, SqliteAuthority};
use df_nb_api::{ApiError, BroadcastPublisher, MemoryStore, MqttPublisher, NbApi, SqliteStore};
use df_nb_core::{
    is_newer_than, ApplyOutcome, EventKind, HasEvents, HasName, HasTopic, HasUniqueKey,
    HasVersion, Model, ReplicaCache, UniqueKey, Version,
};
use df_nb_proto::{DbUpdate, TopicScheme};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::time::timeout;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LogicalPort {
    id: String,
    topic: String,
    name: Option<String>,
    version: Option<Version>,
    unique_key: Option<UniqueKey>,
    lswitch: String,
}

impl Model for LogicalPort {
    const TABLE_NAME: &'static str = "lport";

    fn id(&self) -> &str {
        &self.id
    }

    fn as_topic(&self) -> Option<&dyn HasTopic> {
        Some(self)
    }

    fn as_named(&self) -> Option<&dyn HasName> {
        Some(self)
    }

    fn as_versioned(&self) -> Option<&dyn HasVersion> {
        Some(self)
    }

    fn as_versioned_mut(&mut self) -> Option<&mut dyn HasVersion> {
        Some(self)
    }

    fn as_unique_key(&self) -> Option<&dyn HasUniqueKey> {
        Some(self)
    }

    fn as_unique_key_mut(&mut self) -> Option<&mut dyn HasUniqueKey> {
        Some(self)
    }

    fn as_events(&self) -> Option<&dyn HasEvents> {
        Some(self)
    }
}

impl HasTopic for LogicalPort {
    fn topic(&self) -> &str {
        &self.topic
    }
}

impl HasName for LogicalPort {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl HasVersion for LogicalPort {
    fn version(&self) -> Option<Version> {
        self.version
    }

    fn set_version(&mut self, version: Option<Version>) {
        self.version = version;
    }
}

impl HasUniqueKey for LogicalPort {
    fn unique_key(&self) -> Option<UniqueKey> {
        self.unique_key
    }

    fn set_unique_key(&mut self, key: UniqueKey) {
        self.unique_key = Some(key);
    }
}

impl HasEvents for LogicalPort {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Chassis {
    id: String,
    ip: String,
}

impl Model for Chassis {
    const TABLE_NAME: &'static str = "chassis";

    fn id(&self) -> &str {
        &self.id
    }
}

fn lport(id: &str) -> LogicalPort {
    LogicalPort {
        id: id.to_string(),
        topic: "tenant-a".to_string(),
        name: Some(format!("port-{id}")),
        version: None,
        unique_key: None,
        lswitch: "ls1".to_string(),
    }
}

fn memory_api() -> NbApi<MemoryAuthority, MemoryStore, BroadcastPublisher> {
    NbApi::new(
        Arc::new(MemoryAuthority::new()),
        MemoryStore::new(),
        BroadcastPublisher::default(),
    )
}

#[tokio::test]
async fn sequential_lports_get_distinct_positive_keys() {
    let api = memory_api();

    let first = api.create(lport("p1")).await.unwrap();
    let second = api.create(lport("p2")).await.unwrap();

    let k1 = first.unique_key.unwrap();
    let k2 = second.unique_key.unwrap();
    assert!(k1.get() > 0);
    assert!(k2.get() > 0);
    assert_ne!(k1, k2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creations_get_distinct_keys() {
    let api = Arc::new(memory_api());

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let api = Arc::clone(&api);
            tokio::spawn(async move { api.create(lport(&format!("p{i}"))).await })
        })
        .collect();

    let mut keys = HashSet::new();
    for handle in handles {
        let created = handle.await.unwrap().unwrap();
        assert!(keys.insert(created.unique_key.unwrap()));
    }

    assert_eq!(keys.len(), 32);
    assert_eq!(api.list::<LogicalPort>(Some("tenant-a")).unwrap().len(), 32);
}

#[tokio::test]
async fn unavailable_authority_aborts_creation() {
    let slot = Arc::new(AuthoritySlot::<MemoryAuthority>::empty());
    let api = NbApi::new(
        Arc::clone(&slot),
        MemoryStore::new(),
        BroadcastPublisher::default(),
    );
    let mut rx = api.publisher().subscribe();

    let err = api.create(lport("p1")).await.unwrap_err();

    assert!(matches!(err, ApiError::Allocation(_)));
    assert!(err.is_recoverable());
    assert_eq!(api.get::<LogicalPort>("p1").unwrap(), None);
    assert!(rx.try_recv().is_err());

    slot.install(MemoryAuthority::new()).await;
    let created = api.create(lport("p1")).await.unwrap();
    assert_eq!(created.unique_key, Some(UniqueKey(1)));
}

#[tokio::test]
async fn unkeyed_models_never_contact_authority() {
    let api = memory_api();

    let chassis = Chassis {
        id: "c1".to_string(),
        ip: "10.0.0.1".to_string(),
    };
    api.create(chassis.clone()).await.unwrap();

    assert_eq!(api.authority().calls(), 0);
    assert_eq!(api.get::<Chassis>("c1").unwrap(), Some(chassis));
}

#[tokio::test]
async fn updates_never_allocate() {
    let api = memory_api();
    let created = api.create(lport("p1")).await.unwrap();

    for _ in 0..3 {
        let mut changed = lport("p1");
        changed.lswitch = "ls2".to_string();
        let updated = api.update(changed).await.unwrap();
        assert_eq!(updated.unique_key, created.unique_key);
    }

    assert_eq!(api.authority().calls(), 1);
    let stored = api.get::<LogicalPort>("p1").unwrap().unwrap();
    assert_eq!(stored.version, Some(2));
    assert_eq!(stored.lswitch, "ls2");
}

#[tokio::test]
async fn replica_follows_published_updates() {
    let api = memory_api();
    let mut rx = api.publisher().subscribe();
    let mut replica = ReplicaCache::<LogicalPort>::new();

    api.create(lport("p1")).await.unwrap();
    let v0 = api.update(lport("p1")).await.unwrap();
    let v1 = api.update(lport("p1")).await.unwrap();
    assert!(is_newer_than(v1.version.unwrap(), v0.version));

    let created = rx.recv().await.unwrap();
    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(created.action, EventKind::Created);

    assert_eq!(
        replica.apply(created.decode_model().unwrap()),
        ApplyOutcome::Inserted
    );
    assert_eq!(
        replica.apply(second.decode_model().unwrap()),
        ApplyOutcome::Replaced
    );
    assert_eq!(
        replica.apply(first.decode_model().unwrap()),
        ApplyOutcome::Stale
    );

    assert_eq!(replica.get("p1").unwrap().version, Some(1));
}

#[tokio::test]
async fn sqlite_backends_survive_restart() {
    let dir = TempDir::new().unwrap();
    let keys = dir.path().join("keys.db");
    let objects = dir.path().join("nb.db");

    {
        let api = NbApi::new(
            Arc::new(SqliteAuthority::open(&keys).unwrap()),
            SqliteStore::open(&objects).unwrap(),
            BroadcastPublisher::default(),
        );
        api.create(lport("p1")).await.unwrap();
    }

    let api = NbApi::new(
        Arc::new(SqliteAuthority::open(&keys).unwrap()),
        SqliteStore::open(&objects).unwrap(),
        BroadcastPublisher::default(),
    );
    let second = api.create(lport("p2")).await.unwrap();

    assert_eq!(second.unique_key, Some(UniqueKey(2)));
    assert_eq!(
        api.get::<LogicalPort>("p1").unwrap().unwrap().unique_key,
        Some(UniqueKey(1))
    );
}

#[tokio::test]
async fn exhausted_partition_aborts_creation() {
    let api = NbApi::new(
        Arc::new(MemoryAuthority::new().with_max_key(1)),
        MemoryStore::new(),
        BroadcastPublisher::default(),
    );

    api.create(lport("p1")).await.unwrap();
    let err = api.create(lport("p2")).await.unwrap_err();

    assert!(!err.is_recoverable());
    assert_eq!(api.get::<LogicalPort>("p2").unwrap(), None);
    let partition = LogicalPort::partition().unwrap();
    assert!(api.authority().allocate_unique_key(&partition).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mqtt_update_roundtrip() {
    if std::env::var("DFNB_INTEGRATION").is_err() {
        eprintln!("Skipping integration test; set DFNB_INTEGRATION=1 to run");
        return;
    }

    let broker =
        std::env::var("DFNB_MQTT_BROKER").unwrap_or_else(|_| "tcp://localhost:1883".to_string());
    let address = broker
        .trim_start_matches("tcp://")
        .trim_start_matches("mqtt://");
    let (host, port) = address
        .split_once(':')
        .map_or((address, 1883), |(h, p)| (h, p.parse().unwrap()));

    let scheme = TopicScheme::new("integration");
    let topic = scheme.table(Some("tenant-a"), LogicalPort::TABLE_NAME);

    let mut sub_opts = MqttOptions::new(format!("sub-{}", Uuid::new_v4()), host, port);
    sub_opts.set_keep_alive(Duration::from_secs(5));
    let (sub_client, mut sub_eventloop) = AsyncClient::new(sub_opts, 10);
    sub_client
        .subscribe(&topic, QoS::AtLeastOnce)
        .await
        .unwrap();

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        loop {
            match sub_eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let _ = tx.send(publish.payload.to_vec());
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    let (publisher, eventloop) =
        MqttPublisher::new(&broker, &format!("pub-{}", Uuid::new_v4()), scheme).unwrap();
    df_nb_api::spawn_eventloop(eventloop);
    tokio::time::sleep(Duration::from_millis(500)).await;

    let api = NbApi::new(
        Arc::new(MemoryAuthority::new()),
        MemoryStore::new(),
        publisher,
    );
    api.create(lport("p1")).await.unwrap();

    let payload = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    let update = DbUpdate::from_cbor(&payload).unwrap();
    assert_eq!(update.action, EventKind::Created);
    assert_eq!(update.unique_key, Some(UniqueKey(1)));
}
