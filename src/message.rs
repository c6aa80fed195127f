//! Broker-neutral message model.
//!
//! The proxy never talks to a wire format directly. It reads message bodies,
//! headers and named properties through this adapter type, and builds new
//! messages by asking a [`Session`] for them, the same way it would ask the
//! host client library.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Default message priority on the 0-9 scale.
pub const DEFAULT_PRIORITY: u8 = 4;

/// A named broker destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    Queue(String),
    Topic(String),
}

impl Destination {
    pub fn queue(name: impl Into<String>) -> Self {
        Self::Queue(name.into())
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self::Topic(name.into())
    }

    /// The destination name without the queue/topic distinction.
    pub fn name(&self) -> &str {
        match self {
            Self::Queue(name) | Self::Topic(name) => name,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queue(name) => write!(f, "queue:{}", name),
            Self::Topic(name) => write!(f, "topic:{}", name),
        }
    }
}

/// A scalar message property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Text(String),
}

impl PropertyValue {
    /// Textual form of the value, for string-typed lookups.
    pub fn as_text(&self) -> String {
        match self {
            Self::Bool(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Long(v) => v.to_string(),
            Self::Text(v) => v.clone(),
        }
    }
}

/// An opaque broker message: optional text body, standard headers, and named
/// scalar properties.
#[derive(Debug, Clone, Default)]
pub struct Message {
    body: Option<String>,
    message_id: Option<String>,
    correlation_id: Option<String>,
    message_type: Option<String>,
    priority: u8,
    expiration: i64,
    sent_at: i64,
    destination: Option<Destination>,
    properties: BTreeMap<String, PropertyValue>,
}

impl Message {
    /// Create a bare text message. Prefer [`Session::create_text_message`]
    /// when the message should carry an identifier and send timestamp.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            priority: DEFAULT_PRIORITY,
            ..Default::default()
        }
    }

    /// The text body, if any.
    pub fn text_content(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn set_text(&mut self, body: impl Into<String>) {
        self.body = Some(body.into());
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn set_message_id(&mut self, id: impl Into<String>) {
        self.message_id = Some(id.into());
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn set_correlation_id(&mut self, id: impl Into<String>) {
        self.correlation_id = Some(id.into());
    }

    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    pub fn set_message_type(&mut self, message_type: impl Into<String>) {
        self.message_type = Some(message_type.into());
    }

    /// Priority on the 0-9 scale. Values above 9 are clamped.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority.min(9);
    }

    /// Expiration as epoch milliseconds, 0 meaning "never".
    pub fn expiration(&self) -> i64 {
        self.expiration
    }

    pub fn set_expiration(&mut self, expiration: i64) {
        self.expiration = expiration;
    }

    /// Send timestamp as epoch milliseconds, 0 when not yet sent.
    pub fn sent_at(&self) -> i64 {
        self.sent_at
    }

    pub fn set_sent_at(&mut self, sent_at: i64) {
        self.sent_at = sent_at;
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn set_destination(&mut self, destination: Destination) {
        self.destination = Some(destination);
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Property names in sorted order.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn string_property(&self, name: &str) -> Option<String> {
        self.properties.get(name).map(PropertyValue::as_text)
    }

    pub fn int_property(&self, name: &str, default: i32) -> i32 {
        match self.properties.get(name) {
            Some(PropertyValue::Int(v)) => *v,
            Some(PropertyValue::Long(v)) => *v as i32,
            _ => default,
        }
    }

    pub fn long_property(&self, name: &str, default: i64) -> i64 {
        match self.properties.get(name) {
            Some(PropertyValue::Long(v)) => *v,
            Some(PropertyValue::Int(v)) => i64::from(*v),
            _ => default,
        }
    }

    pub fn bool_property(&self, name: &str, default: bool) -> bool {
        match self.properties.get(name) {
            Some(PropertyValue::Bool(v)) => *v,
            _ => default,
        }
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.properties.insert(name.into(), value);
    }

    pub fn set_string_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set_property(name, PropertyValue::Text(value.into()));
    }

    pub fn set_int_property(&mut self, name: impl Into<String>, value: i32) {
        self.set_property(name, PropertyValue::Int(value));
    }

    pub fn set_long_property(&mut self, name: impl Into<String>, value: i64) {
        self.set_property(name, PropertyValue::Long(value));
    }

    pub fn set_bool_property(&mut self, name: impl Into<String>, value: bool) {
        self.set_property(name, PropertyValue::Bool(value));
    }
}

/// Factory for new messages, standing in for the host client's session.
///
/// Implementations stamp whatever identity and timing metadata the host
/// broker would; [`SystemSession`] is the built-in default.
pub trait Session: Send + Sync {
    fn create_text_message(&self, body: &str) -> Message;
}

/// Session that stamps locally generated identifiers and wall-clock send
/// timestamps.
#[derive(Debug, Default)]
pub struct SystemSession {
    sequence: AtomicU64,
}

impl SystemSession {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Session for SystemSession {
    fn create_text_message(&self, body: &str) -> Message {
        let mut message = Message::text(body);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let now = now_millis();
        message.set_message_id(format!("ID:{}-{}", now, seq));
        message.set_sent_at(now);
        message
    }
}

/// Current wall-clock time as epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
