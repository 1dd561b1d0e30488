//! Pub/sub topic scheme for model updates.
//!
//! Topic structure: `df-nb/v1/{tenant}/{topic}/{table}`
//!
//! This allows:
//! - Tenant isolation
//! - Subscribing to every table of one model topic
//! - Table filtering inside a topic

use serde::{Deserialize, Serialize};

/// Protocol version for topic scheme.
pub const PROTOCOL_VERSION: &str = "v1";

/// Topic segment used for objects that are not topic-partitioned.
pub const GLOBAL_TOPIC: &str = "_global";

/// Topic scheme configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicScheme {
    /// Tenant identifier
    pub tenant: String,
    /// Topic prefix (default: "df-nb")
    pub prefix: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            tenant: "default".to_string(),
            prefix: "df-nb".to_string(),
        }
    }
}

impl TopicScheme {
    /// Create a new topic scheme with the given tenant.
    #[must_use]
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            ..Self::default()
        }
    }

    fn base(&self) -> String {
        format!("{}/{}/{}", self.prefix, PROTOCOL_VERSION, self.tenant)
    }

    /// Topic for updates of one table within a model topic.
    ///
    /// `None` publishes under [`GLOBAL_TOPIC`].
    #[must_use]
    pub fn table(&self, topic: Option<&str>, table: &str) -> String {
        format!("{}/{}/{}", self.base(), topic.unwrap_or(GLOBAL_TOPIC), table)
    }

    /// Wildcard subscription for every table of a model topic.
    #[must_use]
    pub fn topic_wildcard(&self, topic: Option<&str>) -> String {
        format!("{}/{}/#", self.base(), topic.unwrap_or(GLOBAL_TOPIC))
    }

    /// Wildcard subscription for all updates in the tenant.
    #[must_use]
    pub fn tenant_wildcard(&self) -> String {
        format!("{}/#", self.base())
    }

    /// Parse a topic to extract components.
    ///
    /// Returns `(topic, table)` if valid; the topic is `None` for
    /// [`GLOBAL_TOPIC`].
    #[must_use]
    pub fn parse(&self, topic: &str) -> Option<(Option<String>, String)> {
        let expected_prefix = format!("{}/", self.base());
        let remainder = topic.strip_prefix(&expected_prefix)?;

        let mut parts = remainder.split('/');
        let model_topic = parts.next().filter(|p| !p.is_empty())?;
        let table = parts.next().filter(|p| !p.is_empty())?;
        if parts.next().is_some() {
            return None;
        }

        let model_topic = (model_topic != GLOBAL_TOPIC).then(|| model_topic.to_string());
        Some((model_topic, table.to_string()))
    }
}
