//! Send-side condensation engine.
//!
//! Content-similar JSON messages are buffered under a similarity key and
//! periodically flushed as single condensed envelopes. Admission is a
//! two-step protocol: [`JsonCondenser::should_admit`] computes the key and
//! returns an [`Admission`] handle, which [`JsonCondenser::admit`] consumes
//! under the buffer latch. Envelope bodies are rendered lazily, outside the
//! latch.

mod buffer;
pub mod envelope;
pub mod expander;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::config::{ProxyConfig, DEFAULT_EXTRACT_FIELDS};
use crate::json::canonical::looks_like_json;
use crate::json::strategy::{ComparisonStrategy, FieldExclusionStrategy};
use crate::message::Message;

use buffer::{BufferedMessage, CondenserBuffer};
use envelope::build_aggregated_content;

pub use envelope::{
    AggregatedContent, CondensedEnvelope, OriginalMessageInfo, CONDENSED_COUNT, CONDENSED_MARKER,
    CONDENSED_META_FIELD, CONDENSED_TIMESTAMPS, RESERVED_PROPERTY_PREFIX,
};
pub use expander::JsonExpander;

/// Handle returned by [`JsonCondenser::should_admit`] and consumed by
/// [`JsonCondenser::admit`], carrying the content snapshot and computed key
/// so the admission itself stays cheap.
#[derive(Debug)]
pub struct Admission {
    content: String,
    key: String,
}

/// Monotonic condenser counters.
#[derive(Debug, Default)]
struct CondenserStats {
    input_messages: AtomicU64,
    output_batches: AtomicU64,
}

/// Point-in-time view of the condenser counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CondenserStatsSnapshot {
    pub input_messages: u64,
    pub output_batches: u64,
}

/// Condenser that aggregates JSON messages with identical content modulo the
/// comparison strategy's excluded fields.
pub struct JsonCondenser {
    comparison_strategy: Arc<dyn ComparisonStrategy>,
    buffer: Mutex<CondenserBuffer>,
    window: Duration,
    max_batch_size: usize,
    extract_fields: Vec<String>,
    stats: CondenserStats,
}

impl JsonCondenser {
    pub fn builder() -> JsonCondenserBuilder {
        JsonCondenserBuilder::default()
    }

    /// Condenser configured from the proxy config: window, batch size, and
    /// both timestamp field sets.
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::builder()
            .comparison_strategy(Arc::new(FieldExclusionStrategy::new(
                config.timestamp_fields_exclude.clone(),
            )))
            .window_ms(config.condenser_window_ms)
            .max_batch_size(config.condenser_max_batch_size)
            .extract_fields(config.timestamp_fields_extract.clone())
            .build()
    }

    /// Decide whether a message is condensable and, if so, return the
    /// admission handle for it. Counts every offered message.
    pub fn should_admit(&self, message: &Message) -> Option<Admission> {
        self.stats.input_messages.fetch_add(1, Ordering::Relaxed);

        let content = message.text_content()?;
        if !looks_like_json(content) {
            return None;
        }

        let key = self.comparison_strategy.comparison_key(content);
        Some(Admission {
            content: content.to_string(),
            key,
        })
    }

    /// Buffer a message under the key computed by `should_admit`.
    pub fn admit(&self, message: Message, admission: Admission) {
        let Admission { content, key } = admission;
        let mut buffer = self.lock_buffer();
        buffer.push(key, message, content);
        debug!("Buffered message, {} pending", buffer.len());
    }

    /// O(1) check whether any batch is ready to flush.
    pub fn flush_due(&self) -> bool {
        self.lock_buffer().flush_due(self.window, self.max_batch_size)
    }

    /// Remove every ready batch and turn each into an envelope with a lazy
    /// body. Cheap under the latch; serialization cost is deferred to
    /// [`CondensedEnvelope::aggregated_content`].
    pub fn flush_ready(&self) -> Vec<CondensedEnvelope> {
        let batches = self
            .lock_buffer()
            .take_ready(self.window, self.max_batch_size);
        self.envelopes_from(batches)
    }

    /// Flush every buffered batch regardless of readiness.
    pub fn drain(&self) -> Vec<CondensedEnvelope> {
        let batches = self.lock_buffer().drain();
        self.envelopes_from(batches)
    }

    pub fn buffered_count(&self) -> usize {
        self.lock_buffer().len()
    }

    /// Discard all buffered messages without emitting.
    pub fn clear(&self) {
        self.lock_buffer().clear();
    }

    pub fn stats(&self) -> CondenserStatsSnapshot {
        CondenserStatsSnapshot {
            input_messages: self.stats.input_messages.load(Ordering::Relaxed),
            output_batches: self.stats.output_batches.load(Ordering::Relaxed),
        }
    }

    fn envelopes_from(&self, batches: Vec<Vec<BufferedMessage>>) -> Vec<CondensedEnvelope> {
        batches
            .into_iter()
            .map(|batch| {
                self.stats.output_batches.fetch_add(1, Ordering::Relaxed);

                let originals: Vec<OriginalMessageInfo> = batch
                    .iter()
                    .map(|buffered| OriginalMessageInfo::from_message(&buffered.message))
                    .collect();
                let contents: Vec<String> =
                    batch.into_iter().map(|buffered| buffered.content).collect();
                let extract_fields = self.extract_fields.clone();

                CondensedEnvelope::new(
                    AggregatedContent::Deferred(Box::new(move || {
                        build_aggregated_content(&contents, &extract_fields)
                    })),
                    originals,
                )
            })
            .collect()
    }

    fn lock_buffer(&self) -> MutexGuard<'_, CondenserBuffer> {
        self.buffer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Builder for JsonCondenser.
pub struct JsonCondenserBuilder {
    comparison_strategy: Arc<dyn ComparisonStrategy>,
    window_ms: u64,
    max_batch_size: usize,
    extract_fields: Vec<String>,
}

impl Default for JsonCondenserBuilder {
    fn default() -> Self {
        Self {
            comparison_strategy: Arc::new(FieldExclusionStrategy::excluding_timestamps()),
            window_ms: 1000,
            max_batch_size: 100,
            extract_fields: DEFAULT_EXTRACT_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl JsonCondenserBuilder {
    pub fn comparison_strategy(mut self, strategy: Arc<dyn ComparisonStrategy>) -> Self {
        self.comparison_strategy = strategy;
        self
    }

    pub fn window_ms(mut self, window_ms: u64) -> Self {
        self.window_ms = window_ms;
        self
    }

    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    pub fn extract_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extract_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> JsonCondenser {
        JsonCondenser {
            comparison_strategy: self.comparison_strategy,
            buffer: Mutex::new(CondenserBuffer::new()),
            window: Duration::from_millis(self.window_ms),
            max_batch_size: self.max_batch_size,
            extract_fields: self.extract_fields,
            stats: CondenserStats::default(),
        }
    }
}
