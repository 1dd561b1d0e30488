//! Wire messages for model update notifications.

use df_nb_core::{EventKind, Model, UniqueKey, Version};
use serde::{Deserialize, Serialize};

/// One lifecycle event of one northbound object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbUpdate {
    /// Table name of the object
    pub table: String,
    /// Object identifier
    pub id: String,
    /// Lifecycle event
    pub action: EventKind,
    /// Model topic, if the model is topic-partitioned
    pub topic: Option<String>,
    /// Object version after the event
    pub version: Option<Version>,
    /// Unique key of the object
    pub unique_key: Option<UniqueKey>,
    /// JSON-encoded object; empty for deletions
    pub body: Vec<u8>,
}

impl DbUpdate {
    /// Build an update message for a model object.
    ///
    /// # Errors
    ///
    /// Returns error if the object cannot be encoded.
    pub fn from_model<M: Model>(action: EventKind, obj: &M) -> Result<Self, MessageError> {
        let body = match action {
            EventKind::Deleted => Vec::new(),
            EventKind::Created | EventKind::Updated => {
                serde_json::to_vec(obj).map_err(|e| MessageError::Serialize(e.to_string()))?
            }
        };

        Ok(Self {
            table: M::TABLE_NAME.to_string(),
            id: obj.id().to_string(),
            action,
            topic: obj.topic_name().map(str::to_string),
            version: obj.current_version(),
            unique_key: obj.assigned_key(),
            body,
        })
    }

    /// Decode the carried object.
    ///
    /// # Errors
    ///
    /// Returns error if the table does not match or the body cannot be decoded.
    pub fn decode_model<M: Model>(&self) -> Result<M, MessageError> {
        if self.table != M::TABLE_NAME {
            return Err(MessageError::TableMismatch {
                expected: M::TABLE_NAME,
                actual: self.table.clone(),
            });
        }
        serde_json::from_slice(&self.body).map_err(|e| MessageError::Deserialize(e.to_string()))
    }

    /// Serialize to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, MessageError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| MessageError::Serialize(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, MessageError> {
        ciborium::from_reader(bytes).map_err(|e| MessageError::Deserialize(e.to_string()))
    }
}

/// Errors for message operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    /// Serialization failed
    #[error("serialize error: {0}")]
    Serialize(String),
    /// Deserialization failed
    #[error("deserialize error: {0}")]
    Deserialize(String),
    /// Message belongs to another table
    #[error("table mismatch: expected {expected}, got {actual}")]
    TableMismatch {
        /// Table of the requested model
        expected: &'static str,
        /// Table named in the message
        actual: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use df_nb_core::{HasTopic, HasUniqueKey};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Switch {
        id: String,
        topic: String,
        unique_key: Option<UniqueKey>,
    }

    impl Model for Switch {
        const TABLE_NAME: &'static str = "lswitch";

        fn id(&self) -> &str {
            &self.id
        }

        fn as_topic(&self) -> Option<&dyn HasTopic> {
            Some(self)
        }

        fn as_unique_key(&self) -> Option<&dyn HasUniqueKey> {
            Some(self)
        }

        fn as_unique_key_mut(&mut self) -> Option<&mut dyn HasUniqueKey> {
            Some(self)
        }
    }

    impl HasTopic for Switch {
        fn topic(&self) -> &str {
            &self.topic
        }
    }

    impl HasUniqueKey for Switch {
        fn unique_key(&self) -> Option<UniqueKey> {
            self.unique_key
        }

        fn set_unique_key(&mut self, key: UniqueKey) {
            self.unique_key = Some(key);
        }
    }

    fn switch() -> Switch {
        Switch {
            id: "s1".to_string(),
            topic: "tenant-1".to_string(),
            unique_key: Some(UniqueKey(9)),
        }
    }

    #[test]
    fn update_carries_model_metadata() {
        let update = DbUpdate::from_model(EventKind::Created, &switch()).unwrap();

        assert_eq!(update.table, "lswitch");
        assert_eq!(update.topic.as_deref(), Some("tenant-1"));
        assert_eq!(update.unique_key, Some(UniqueKey(9)));
        assert_eq!(update.version, None);

        let decoded = DbUpdate::from_cbor(&update.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, update);
        assert_eq!(decoded.decode_model::<Switch>().unwrap(), switch());
    }

    #[test]
    fn delete_has_empty_body() {
        let update = DbUpdate::from_model(EventKind::Deleted, &switch()).unwrap();
        assert!(update.body.is_empty());
        assert_eq!(update.action, EventKind::Deleted);
    }

    #[test]
    fn decode_checks_table() {
        let mut update = DbUpdate::from_model(EventKind::Updated, &switch()).unwrap();
        update.table = "lport".to_string();

        assert!(matches!(
            update.decode_model::<Switch>(),
            Err(MessageError::TableMismatch { .. })
        ));
    }
}
