//! Condensed message envelopes and the aggregated-body layout.

use serde_json::Value;

use crate::json::canonical::extract_field;
use crate::message::{now_millis, Message};

/// Wire property marking a condensed envelope.
pub const CONDENSED_MARKER: &str = "_JMS_PROXY_CONDENSED_";
/// Wire property carrying the number of condensed originals.
pub const CONDENSED_COUNT: &str = "_JMS_PROXY_CONDENSED_COUNT_";
/// Wire property carrying the first original timestamp.
pub const CONDENSED_TIMESTAMPS: &str = "_JMS_PROXY_CONDENSED_TIMESTAMPS_";
/// Prefix of all reserved proxy properties; never copied onto expanded
/// messages.
pub const RESERVED_PROPERTY_PREFIX: &str = "_JMS_PROXY_";
/// Reserved top-level body field holding the condensed metadata block.
pub const CONDENSED_META_FIELD: &str = "_condensedMeta";

/// Header snapshot of one original message, captured at flush time.
#[derive(Debug, Clone)]
pub struct OriginalMessageInfo {
    pub message_id: Option<String>,
    pub timestamp: i64,
    pub correlation_id: Option<String>,
    pub priority: u8,
    pub expiration: i64,
    pub message_type: Option<String>,
}

impl OriginalMessageInfo {
    pub fn from_message(message: &Message) -> Self {
        Self {
            message_id: message.message_id().map(str::to_string),
            timestamp: message.sent_at(),
            correlation_id: message.correlation_id().map(str::to_string),
            priority: message.priority(),
            expiration: message.expiration(),
            message_type: message.message_type().map(str::to_string),
        }
    }
}

type ContentProducer = Box<dyn FnOnce() -> String + Send>;

/// Aggregated envelope body, either already rendered or still pending the
/// heavy serialization work.
pub enum AggregatedContent {
    Ready(String),
    Deferred(ContentProducer),
}

/// A single outgoing message aggregating one or more originals that share a
/// similarity key.
pub struct CondensedEnvelope {
    content: AggregatedContent,
    originals: Vec<OriginalMessageInfo>,
    first_timestamp: i64,
    last_timestamp: i64,
}

impl CondensedEnvelope {
    pub fn new(content: AggregatedContent, originals: Vec<OriginalMessageInfo>) -> Self {
        let timestamps = originals.iter().map(|info| info.timestamp);
        let first_timestamp = timestamps.clone().min().unwrap_or_else(now_millis);
        let last_timestamp = timestamps.max().unwrap_or_else(now_millis);
        Self {
            content,
            originals,
            first_timestamp,
            last_timestamp,
        }
    }

    pub fn message_count(&self) -> usize {
        self.originals.len()
    }

    pub fn originals(&self) -> &[OriginalMessageInfo] {
        &self.originals
    }

    /// Earliest send timestamp among the originals, epoch milliseconds.
    pub fn first_timestamp(&self) -> i64 {
        self.first_timestamp
    }

    /// Latest send timestamp among the originals, epoch milliseconds.
    pub fn last_timestamp(&self) -> i64 {
        self.last_timestamp
    }

    pub fn is_condensed(&self) -> bool {
        self.originals.len() > 1
    }

    /// The aggregated body text. The first call materializes a deferred
    /// body; further calls return the same text. Must not be invoked while
    /// holding the condenser buffer latch.
    pub fn aggregated_content(&mut self) -> String {
        match std::mem::replace(&mut self.content, AggregatedContent::Ready(String::new())) {
            AggregatedContent::Ready(text) => {
                self.content = AggregatedContent::Ready(text.clone());
                text
            }
            AggregatedContent::Deferred(produce) => {
                let text = produce();
                self.content = AggregatedContent::Ready(text.clone());
                text
            }
        }
    }
}

/// Render the aggregated body for one batch of content snapshots sharing a
/// similarity key.
///
/// The head content is the base. When it is a top-level object, the
/// timestamp-extraction fields are stripped from it, each item's first
/// matching extraction field is collected as a numeric timestamp, and the
/// metadata block is attached. Any other head content is emitted verbatim.
pub(crate) fn build_aggregated_content(contents: &[String], extract_fields: &[String]) -> String {
    let Some(head) = contents.first() else {
        return String::new();
    };

    match serde_json::from_str::<Value>(head) {
        Ok(Value::Object(mut map)) => {
            for field in extract_fields {
                map.remove(field);
            }

            let timestamps = collect_timestamps(contents, extract_fields);

            let mut meta = serde_json::Map::new();
            meta.insert("condensed".to_string(), Value::Bool(true));
            meta.insert("count".to_string(), Value::from(contents.len() as u64));
            if !timestamps.is_empty() {
                let first = timestamps.iter().min().copied().unwrap_or_default();
                let last = timestamps.iter().max().copied().unwrap_or_default();
                meta.insert(
                    "originalTimestamps".to_string(),
                    Value::Array(timestamps.into_iter().map(Value::from).collect()),
                );
                meta.insert("firstTimestamp".to_string(), Value::from(first));
                meta.insert("lastTimestamp".to_string(), Value::from(last));
            }
            map.insert(CONDENSED_META_FIELD.to_string(), Value::Object(meta));

            Value::Object(map).to_string()
        }
        _ => head.clone(),
    }
}

/// Per item, probe the extraction fields in declared order; the first field
/// present decides, and only integral textual forms are kept.
fn collect_timestamps(contents: &[String], extract_fields: &[String]) -> Vec<i64> {
    let mut timestamps = Vec::new();
    for content in contents {
        for field in extract_fields {
            if let Some(text) = extract_field(content, field) {
                if let Ok(timestamp) = text.parse::<i64>() {
                    timestamps.push(timestamp);
                }
                break;
            }
        }
    }
    timestamps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn contents(bodies: &[&str]) -> Vec<String> {
        bodies.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_aggregated_body_layout() {
        let body = build_aggregated_content(
            &contents(&[
                r#"{"v":42,"timestamp":1000}"#,
                r#"{"v":42,"timestamp":1001}"#,
                r#"{"v":42,"timestamp":1002}"#,
            ]),
            &fields(&["timestamp"]),
        );

        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["v"], 42);
        assert!(value.get("timestamp").is_none());

        let meta = &value[CONDENSED_META_FIELD];
        assert_eq!(meta["condensed"], true);
        assert_eq!(meta["count"], 3);
        assert_eq!(meta["originalTimestamps"], serde_json::json!([1000, 1001, 1002]));
        assert_eq!(meta["firstTimestamp"], 1000);
        assert_eq!(meta["lastTimestamp"], 1002);
    }

    #[test]
    fn test_non_numeric_timestamps_skipped() {
        let body = build_aggregated_content(
            &contents(&[
                r#"{"v":1,"timestamp":"2024-01-01"}"#,
                r#"{"v":1,"timestamp":7}"#,
            ]),
            &fields(&["timestamp"]),
        );

        let value: Value = serde_json::from_str(&body).unwrap();
        let meta = &value[CONDENSED_META_FIELD];
        assert_eq!(meta["count"], 2);
        assert_eq!(meta["originalTimestamps"], serde_json::json!([7]));
    }

    #[test]
    fn test_extraction_field_order_decides() {
        let body = build_aggregated_content(
            &contents(&[r#"{"v":1,"ts":5,"time":9}"#]),
            &fields(&["time", "ts"]),
        );

        let value: Value = serde_json::from_str(&body).unwrap();
        // "time" is declared first, so it wins even though "ts" is present.
        assert_eq!(value[CONDENSED_META_FIELD]["originalTimestamps"], serde_json::json!([9]));
        assert!(value.get("time").is_none());
        assert!(value.get("ts").is_none());
    }

    #[test]
    fn test_timestamps_outside_i32_range() {
        let body = build_aggregated_content(
            &contents(&[r#"{"v":1,"timestamp":5000000000}"#]),
            &fields(&["timestamp"]),
        );

        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            value[CONDENSED_META_FIELD]["firstTimestamp"],
            5_000_000_000_i64
        );
    }

    #[test]
    fn test_array_head_emitted_verbatim() {
        let body = build_aggregated_content(&contents(&["[1,2,3]", "[1,2,3]"]), &fields(&["ts"]));
        assert_eq!(body, "[1,2,3]");
    }

    #[test]
    fn test_no_timestamps_omits_array_and_bounds() {
        let body = build_aggregated_content(&contents(&[r#"{"v":1}"#]), &fields(&["timestamp"]));
        let value: Value = serde_json::from_str(&body).unwrap();
        let meta = &value[CONDENSED_META_FIELD];
        assert_eq!(meta["count"], 1);
        assert!(meta.get("originalTimestamps").is_none());
        assert!(meta.get("firstTimestamp").is_none());
    }

    #[test]
    fn test_envelope_materialization_is_idempotent() {
        let mut calls = 0;
        // The producer is FnOnce; the counter just documents the contract.
        let producer: ContentProducer = Box::new(move || {
            calls += 1;
            format!("body-{}", calls)
        });

        let info = OriginalMessageInfo {
            message_id: None,
            timestamp: 10,
            correlation_id: None,
            priority: 4,
            expiration: 0,
            message_type: None,
        };
        let mut envelope =
            CondensedEnvelope::new(AggregatedContent::Deferred(producer), vec![info]);

        assert_eq!(envelope.aggregated_content(), "body-1");
        assert_eq!(envelope.aggregated_content(), "body-1");
    }

    #[test]
    fn test_envelope_timestamp_bounds() {
        let info = |timestamp| OriginalMessageInfo {
            message_id: None,
            timestamp,
            correlation_id: None,
            priority: 4,
            expiration: 0,
            message_type: None,
        };
        let envelope = CondensedEnvelope::new(
            AggregatedContent::Ready("{}".to_string()),
            vec![info(30), info(10), info(20)],
        );

        assert_eq!(envelope.first_timestamp(), 10);
        assert_eq!(envelope.last_timestamp(), 30);
        assert_eq!(envelope.message_count(), 3);
        assert!(envelope.is_condensed());
    }
}
