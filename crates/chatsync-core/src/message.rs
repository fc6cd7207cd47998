//! Chat messages and the collection they live in

use crate::error::{Error, Result};
use crate::key::MessageKey;
use crate::time::{format_timestamp, Clock};
use crate::RawValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stored shape of a message at `messages/{key}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(rename = "msgText")]
    pub text: String,
    #[serde(rename = "msgTimeStamp")]
    pub timestamp: String,
}

impl MessageRecord {
    /// Build a record stamped with `clock`'s current time
    pub fn now(text: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            text: text.into(),
            timestamp: format_timestamp(clock.now()),
        }
    }
}

/// A single chat entry; immutable once written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: MessageKey,
    pub text: String,
    pub timestamp: String,
}

impl Message {
    pub fn from_record(key: MessageKey, record: MessageRecord) -> Self {
        Self {
            key,
            text: record.text,
            timestamp: record.timestamp,
        }
    }

    pub fn record(&self) -> MessageRecord {
        MessageRecord {
            text: self.text.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// Messages keyed by [`MessageKey`], iterated in key (creation) order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageCollection {
    entries: BTreeMap<MessageKey, Message>,
}

impl MessageCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw collection snapshot
    ///
    /// `null` is an empty collection. Anything other than an object of
    /// `{key: {msgText, msgTimeStamp}}` is rejected as a whole.
    pub fn from_raw(raw: &RawValue) -> Result<Self> {
        let map = match raw {
            RawValue::Null => return Ok(Self::new()),
            RawValue::Object(map) => map,
            other => {
                return Err(Error::parse(format!(
                    "expected an object of messages, got {}",
                    kind(other)
                )))
            }
        };

        let mut entries = BTreeMap::new();
        for (key, value) in map {
            let key = MessageKey::new(key.as_str())
                .map_err(|e| Error::parse(e.to_string()))?;
            let record: MessageRecord = serde_json::from_value(value.clone())
                .map_err(|e| Error::parse(format!("message {}: {}", key, e)))?;
            entries.insert(key.clone(), Message::from_record(key, record));
        }

        Ok(Self { entries })
    }

    /// Parse raw JSON text, as delivered by some backends
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawValue =
            serde_json::from_str(json).map_err(|e| Error::parse(e.to_string()))?;
        Self::from_raw(&raw)
    }

    pub fn to_raw(&self) -> RawValue {
        let map = self
            .entries
            .iter()
            .map(|(key, message)| {
                (
                    key.as_str().to_string(),
                    serde_json::json!({
                        "msgText": message.text,
                        "msgTimeStamp": message.timestamp,
                    }),
                )
            })
            .collect();
        RawValue::Object(map)
    }

    pub fn insert(&mut self, message: Message) -> Option<Message> {
        self.entries.insert(message.key.clone(), message)
    }

    pub fn get(&self, key: &MessageKey) -> Option<&Message> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &MessageKey> {
        self.entries.keys()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.entries.into_values().collect()
    }
}

fn kind(value: &RawValue) -> &'static str {
    match value {
        RawValue::Null => "null",
        RawValue::Bool(_) => "a boolean",
        RawValue::Number(_) => "a number",
        RawValue::String(_) => "a string",
        RawValue::Array(_) => "an array",
        RawValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::FixedClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_record_wire_names() {
        let record = MessageRecord {
            text: "hi".into(),
            timestamp: "t".into(),
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"msgText": "hi", "msgTimeStamp": "t"})
        );
    }

    #[test]
    fn test_record_now_uses_clock() {
        let clock = FixedClock(Utc.with_ymd_and_hms(2025, 3, 5, 6, 7, 9).unwrap());
        let record = MessageRecord::now("hello", &clock);
        assert_eq!(record.timestamp, "March 5, 2025 at 2:07:09 PM UTC+8");
    }

    #[test]
    fn test_from_raw_orders_by_key() {
        let raw = json!({
            "-Nb": {"msgText": "second", "msgTimeStamp": "t2"},
            "-Na": {"msgText": "first", "msgTimeStamp": "t1", "extra": true},
        });

        let collection = MessageCollection::from_raw(&raw).unwrap();
        let texts: Vec<_> = collection.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_from_raw_null_is_empty() {
        assert!(MessageCollection::from_raw(&RawValue::Null).unwrap().is_empty());
    }

    #[test]
    fn test_from_raw_rejects_malformed() {
        assert!(matches!(
            MessageCollection::from_raw(&json!([1, 2])),
            Err(Error::Parse { .. })
        ));
        assert!(matches!(
            MessageCollection::from_raw(&json!({"k1": {"msgText": "no timestamp"}})),
            Err(Error::Parse { .. })
        ));
        assert!(matches!(
            MessageCollection::from_raw(&json!({"k1": "flat"})),
            Err(Error::Parse { .. })
        ));
        assert!(MessageCollection::from_json("{not json").is_err());
    }

    #[test]
    fn test_to_raw_matches_stored_shape() {
        let raw = json!({"k1": {"msgText": "a", "msgTimeStamp": "t"}});
        let collection = MessageCollection::from_raw(&raw).unwrap();
        assert_eq!(collection.to_raw(), raw);
    }
}
