//! Consumer-side replica of northbound objects.
//!
//! Updates arriving from replicated streams may be duplicated or reordered.
//! The cache only replaces an object when the incoming copy is newer than the
//! one held, using the version comparator.

use crate::model::Model;
use std::collections::HashMap;

/// Result of applying an incoming object to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Object was not present before
    Inserted,
    /// Object replaced an older copy
    Replaced,
    /// Incoming copy was not newer; cache unchanged
    Stale,
}

/// Local copy of the objects of one model table.
#[derive(Debug, Clone)]
pub struct ReplicaCache<M: Model> {
    objects: HashMap<String, M>,
}

impl<M: Model> Default for ReplicaCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> ReplicaCache<M> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
        }
    }

    /// Apply an incoming object.
    ///
    /// Unversioned models always replace the held copy.
    pub fn apply(&mut self, incoming: M) -> ApplyOutcome {
        let Some(held) = self.objects.get(incoming.id()) else {
            self.objects.insert(incoming.id().to_string(), incoming);
            return ApplyOutcome::Inserted;
        };

        let newer = match incoming.as_versioned() {
            Some(candidate) => candidate.is_newer_than(held.as_versioned()),
            None => true,
        };

        if !newer {
            tracing::debug!(
                table = M::TABLE_NAME,
                id = incoming.id(),
                incoming = ?incoming.current_version(),
                held = ?held.current_version(),
                "Dropping stale update"
            );
            return ApplyOutcome::Stale;
        }

        self.objects.insert(incoming.id().to_string(), incoming);
        ApplyOutcome::Replaced
    }

    /// Remove an object.
    pub fn remove(&mut self, id: &str) -> Option<M> {
        self.objects.remove(id)
    }

    /// Get an object by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&M> {
        self.objects.get(id)
    }

    /// Number of objects held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects published under the given topic.
    pub fn iter_topic<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a M> + 'a {
        self.objects
            .values()
            .filter(move |obj| obj.topic_name() == Some(topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HasTopic;
    use crate::version::{HasVersion, Version};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Router {
        id: String,
        topic: String,
        version: Option<Version>,
        label: String,
    }

    impl Model for Router {
        const TABLE_NAME: &'static str = "lrouter";

        fn id(&self) -> &str {
            &self.id
        }

        fn as_topic(&self) -> Option<&dyn HasTopic> {
            Some(self)
        }

        fn as_versioned(&self) -> Option<&dyn HasVersion> {
            Some(self)
        }
    }

    impl HasTopic for Router {
        fn topic(&self) -> &str {
            &self.topic
        }
    }

    impl HasVersion for Router {
        fn version(&self) -> Option<Version> {
            self.version
        }

        fn set_version(&mut self, version: Option<Version>) {
            self.version = version;
        }
    }

    fn router(id: &str, topic: &str, version: Option<Version>, label: &str) -> Router {
        Router {
            id: id.to_string(),
            topic: topic.to_string(),
            version,
            label: label.to_string(),
        }
    }

    #[test]
    fn newer_versions_replace_older() {
        let mut cache = ReplicaCache::new();

        assert_eq!(cache.apply(router("r1", "t", Some(3), "a")), ApplyOutcome::Inserted);
        assert_eq!(cache.apply(router("r1", "t", Some(5), "b")), ApplyOutcome::Replaced);
        assert_eq!(cache.apply(router("r1", "t", Some(4), "c")), ApplyOutcome::Stale);
        assert_eq!(cache.apply(router("r1", "t", Some(5), "d")), ApplyOutcome::Stale);

        assert_eq!(cache.get("r1").unwrap().label, "b");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unversioned_held_copy_is_replaced() {
        let mut cache = ReplicaCache::new();

        cache.apply(router("r1", "t", None, "a"));
        assert_eq!(cache.apply(router("r1", "t", Some(0), "b")), ApplyOutcome::Replaced);
        assert_eq!(cache.apply(router("r1", "t", None, "c")), ApplyOutcome::Stale);
    }

    #[test]
    fn topic_filter_and_remove() {
        let mut cache = ReplicaCache::new();
        cache.apply(router("r1", "tenant-a", Some(1), "a"));
        cache.apply(router("r2", "tenant-b", Some(1), "b"));
        cache.apply(router("r3", "tenant-a", Some(1), "c"));

        let mut ids: Vec<_> = cache.iter_topic("tenant-a").map(|r| r.id.clone()).collect();
        ids.sort();
        assert_eq!(ids, ["r1", "r3"]);

        assert!(cache.remove("r1").is_some());
        assert!(cache.remove("r1").is_none());
        assert_eq!(cache.len(), 2);
    }
}
