//! Receive-side expansion of condensed envelopes back into individual
//! messages.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::error::ProxyError;
use crate::json::canonical::looks_like_json;
use crate::message::{Message, Session};

use super::envelope::{CONDENSED_MARKER, CONDENSED_META_FIELD, RESERVED_PROPERTY_PREFIX};

/// Expander that reconstructs the original messages condensed into a single
/// envelope. Non-condensed messages pass through untouched.
#[derive(Clone)]
pub struct JsonExpander {
    session: Arc<dyn Session>,
    timestamp_field: String,
}

impl JsonExpander {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self::with_timestamp_field(session, "timestamp")
    }

    /// Use a custom field name when restoring per-original timestamps.
    pub fn with_timestamp_field(session: Arc<dyn Session>, field: impl Into<String>) -> Self {
        Self {
            session,
            timestamp_field: field.into(),
        }
    }

    /// Whether a message is a condensed envelope. The wire marker property
    /// decides cheaply; the body sentinel is the fallback for hosts that
    /// strip custom properties. Never fails.
    pub fn is_condensed(&self, message: &Message) -> bool {
        if message.bool_property(CONDENSED_MARKER, false) {
            return true;
        }

        let Some(content) = message.text_content() else {
            return false;
        };
        if !content.contains(CONDENSED_META_FIELD) || !looks_like_json(content) {
            return false;
        }

        match serde_json::from_str::<Value>(content) {
            Ok(value) => value
                .get(CONDENSED_META_FIELD)
                .and_then(|meta| meta.get("condensed"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Reconstruct the condensed originals. A non-condensed message comes
    /// back as a singleton, and so does the envelope itself on any
    /// reconstruction failure.
    pub fn expand(&self, message: &Message) -> Vec<Message> {
        if !self.is_condensed(message) {
            return vec![message.clone()];
        }

        match self.try_expand(message) {
            Ok(expanded) if !expanded.is_empty() => {
                debug!("Expanded condensed message into {} messages", expanded.len());
                expanded
            }
            Ok(_) => vec![message.clone()],
            Err(e) => {
                error!("Failed to expand condensed message: {}", e);
                vec![message.clone()]
            }
        }
    }

    fn try_expand(&self, message: &Message) -> Result<Vec<Message>, ProxyError> {
        let Some(content) = message.text_content() else {
            return Ok(Vec::new());
        };

        let value: Value = serde_json::from_str(content)?;
        let Value::Object(mut map) = value else {
            return Ok(Vec::new());
        };
        let Some(meta) = map.remove(CONDENSED_META_FIELD) else {
            return Ok(Vec::new());
        };

        let count = meta.get("count").and_then(Value::as_u64).unwrap_or(1) as usize;
        let timestamps: Vec<Option<i64>> = match meta.get("originalTimestamps") {
            Some(Value::Array(items)) => items.iter().map(Value::as_i64).collect(),
            _ => Vec::new(),
        };

        let base = Value::Object(map);
        let mut expanded = Vec::with_capacity(count);
        for i in 0..count {
            let mut item = base.clone();
            if let Some(timestamp) = timestamps.get(i).copied().flatten() {
                if let Value::Object(fields) = &mut item {
                    fields.insert(self.timestamp_field.clone(), Value::from(timestamp));
                }
            }

            let mut restored = self.session.create_text_message(&item.to_string());
            copy_message_attributes(message, &mut restored);
            expanded.push(restored);
        }
        Ok(expanded)
    }
}

/// Copy the envelope's correlation id, type, priority, and non-reserved
/// properties onto a reconstructed message. Reserved proxy markers never
/// propagate.
fn copy_message_attributes(source: &Message, target: &mut Message) {
    if let Some(correlation_id) = source.correlation_id() {
        target.set_correlation_id(correlation_id);
    }
    if let Some(message_type) = source.message_type() {
        target.set_message_type(message_type);
    }
    target.set_priority(source.priority());

    for name in source.property_names() {
        if name.starts_with(RESERVED_PROPERTY_PREFIX) {
            continue;
        }
        if let Some(value) = source.property(name) {
            target.set_property(name.to_string(), value.clone());
        }
    }
}
