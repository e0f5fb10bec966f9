use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::EventError;

/// Structured metadata attached to an event.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Well-known event kinds. Producers are free to use any other non-empty kind.
pub mod kinds {
    pub const AGENT_THOUGHT: &str = "agent_thought";
    pub const TOOL_USAGE: &str = "tool_usage";
    pub const TASK_UPDATE: &str = "task_update";
    pub const ERROR: &str = "error";
    pub const SUCCESS: &str = "success";
}

/// One occurrence to broadcast.
///
/// Serializes to the subscriber-facing wire shape:
///
/// ```json
/// {"type": "task_update", "content": "start", "timestamp": "2025-01-01T00:00:00Z", "metadata": null}
/// ```
///
/// Events have no mutators; the engine shares a single instance between all
/// delivery workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent")]
pub struct Event {
    #[serde(rename = "type")]
    kind: String,
    content: String,
    timestamp: DateTime<Utc>,
    metadata: Option<Metadata>,
}

impl Event {
    /// Creates an event stamped with the current time and no metadata.
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Result<Self, EventError> {
        Self::builder(kind, content).build()
    }

    pub fn builder(kind: impl Into<String>, content: impl Into<String>) -> EventBuilder {
        EventBuilder {
            kind: kind.into(),
            content: content.into(),
            timestamp: None,
            metadata: None,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Renders the event as a JSON wire message.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone)]
pub struct EventBuilder {
    kind: String,
    content: String,
    timestamp: Option<DateTime<Utc>>,
    metadata: Option<Metadata>,
}

impl EventBuilder {
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Adds a single metadata entry.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Event, EventError> {
        if self.kind.trim().is_empty() {
            return Err(EventError::EmptyKind);
        }

        Ok(Event {
            kind: self.kind,
            content: self.content,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            // An empty map and no map mean the same thing to subscribers.
            metadata: self.metadata.filter(|m| !m.is_empty()),
        })
    }
}

/// Inbound shape accepted from producers: timestamp and metadata are optional.
#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type", alias = "event_type")]
    kind: String,
    content: String,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

/// Accepts RFC 3339, or ISO 8601 without an offset (taken as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    parse_timestamp(&raw).map(Some).map_err(de::Error::custom)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| format!("invalid timestamp `{}`, expected ISO 8601", raw))
}

impl TryFrom<RawEvent> for Event {
    type Error = EventError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let mut builder = Event::builder(raw.kind, raw.content);
        if let Some(timestamp) = raw.timestamp {
            builder = builder.timestamp(timestamp);
        }
        if let Some(metadata) = raw.metadata {
            builder = builder.metadata(metadata);
        }
        builder.build()
    }
}
