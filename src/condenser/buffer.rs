//! Keyed buffer holding originals awaiting condensation.
//!
//! The buffer is a plain data structure; the condenser serializes access to
//! it behind a single latch. Flush-readiness is answered in O(1) from three
//! maintained summaries: total count, earliest arrival, and largest batch.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::message::Message;

/// One admitted original: the message handle, its content snapshot, and the
/// arrival instant captured at admission.
#[derive(Debug)]
pub(crate) struct BufferedMessage {
    pub message: Message,
    pub content: String,
    pub buffered_at: Instant,
}

#[derive(Debug, Default)]
pub(crate) struct CondenserBuffer {
    pending: HashMap<String, Vec<BufferedMessage>>,
    total: usize,
    earliest_arrival: Option<Instant>,
    largest_batch: usize,
}

impl CondenserBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Append a message under its similarity key, keeping the summaries
    /// current.
    pub fn push(&mut self, key: String, message: Message, content: String) {
        let now = Instant::now();
        let batch = self.pending.entry(key).or_default();
        batch.push(BufferedMessage {
            message,
            content,
            buffered_at: now,
        });

        self.total += 1;
        self.largest_batch = self.largest_batch.max(batch.len());
        self.earliest_arrival = Some(match self.earliest_arrival {
            Some(earliest) => earliest.min(now),
            None => now,
        });
    }

    /// O(1) readiness check against the maintained summaries.
    pub fn flush_due(&self, window: Duration, max_batch_size: usize) -> bool {
        if self.total == 0 {
            return false;
        }
        if self.largest_batch >= max_batch_size {
            return true;
        }
        self.earliest_arrival
            .is_some_and(|earliest| earliest.elapsed() >= window)
    }

    /// Remove and return every batch whose head is at least `window` old or
    /// whose length reached `max_batch_size`. Summaries are recomputed over
    /// what remains.
    pub fn take_ready(&mut self, window: Duration, max_batch_size: usize) -> Vec<Vec<BufferedMessage>> {
        let now = Instant::now();
        let ready_keys: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, batch)| {
                batch.len() >= max_batch_size
                    || batch
                        .first()
                        .is_some_and(|head| now.duration_since(head.buffered_at) >= window)
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut batches = Vec::with_capacity(ready_keys.len());
        for key in ready_keys {
            if let Some(batch) = self.pending.remove(&key) {
                batches.push(batch);
            }
        }

        if !batches.is_empty() {
            self.recompute_summaries();
        }
        batches
    }

    /// Remove and return every batch regardless of readiness.
    pub fn drain(&mut self) -> Vec<Vec<BufferedMessage>> {
        let batches: Vec<Vec<BufferedMessage>> =
            self.pending.drain().map(|(_, batch)| batch).collect();
        self.total = 0;
        self.earliest_arrival = None;
        self.largest_batch = 0;
        batches
    }

    /// Discard everything without emitting.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.total = 0;
        self.earliest_arrival = None;
        self.largest_batch = 0;
    }

    fn recompute_summaries(&mut self) {
        self.total = self.pending.values().map(Vec::len).sum();
        self.largest_batch = self.pending.values().map(Vec::len).max().unwrap_or(0);
        self.earliest_arrival = self
            .pending
            .values()
            .filter_map(|batch| batch.first())
            .map(|head| head.buffered_at)
            .min();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn push(buffer: &mut CondenserBuffer, key: &str, content: &str) {
        buffer.push(key.to_string(), Message::text(content), content.to_string());
    }

    const WINDOW: Duration = Duration::from_millis(1000);

    #[tokio::test]
    async fn test_counts_and_clear() {
        let mut buffer = CondenserBuffer::new();
        assert!(buffer.is_empty());

        push(&mut buffer, "k1", "a");
        push(&mut buffer, "k1", "b");
        push(&mut buffer, "k2", "c");
        assert_eq!(buffer.len(), 3);

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(!buffer.flush_due(WINDOW, 1));
    }

    #[tokio::test]
    async fn test_flush_due_on_batch_size() {
        let mut buffer = CondenserBuffer::new();
        push(&mut buffer, "k", "a");
        assert!(!buffer.flush_due(WINDOW, 2));

        push(&mut buffer, "k", "b");
        assert!(buffer.flush_due(WINDOW, 2));

        // Readiness is monotonic: further admissions cannot undo it.
        push(&mut buffer, "other", "c");
        assert!(buffer.flush_due(WINDOW, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_due_on_window_expiry() {
        let mut buffer = CondenserBuffer::new();
        push(&mut buffer, "k", "a");
        assert!(!buffer.flush_due(WINDOW, 100));

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert!(buffer.flush_due(WINDOW, 100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_ready_removes_only_ready_batches() {
        let mut buffer = CondenserBuffer::new();
        push(&mut buffer, "old", "a");
        push(&mut buffer, "old", "b");

        tokio::time::advance(Duration::from_millis(1100)).await;
        push(&mut buffer, "fresh", "c");

        let batches = buffer.take_ready(WINDOW, 100);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(buffer.len(), 1);

        // The fresh batch is not yet due after the ready batch left.
        assert!(!buffer.flush_due(WINDOW, 100));
    }

    #[tokio::test]
    async fn test_take_ready_on_full_batch_preserves_order() {
        let mut buffer = CondenserBuffer::new();
        push(&mut buffer, "k", "first");
        push(&mut buffer, "k", "second");
        push(&mut buffer, "k", "third");

        let batches = buffer.take_ready(WINDOW, 3);
        assert_eq!(batches.len(), 1);
        let contents: Vec<&str> = batches[0].iter().map(|b| b.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_drain_returns_everything() {
        let mut buffer = CondenserBuffer::new();
        push(&mut buffer, "k1", "a");
        push(&mut buffer, "k2", "b");

        let batches = buffer.drain();
        assert_eq!(batches.len(), 2);
        assert!(buffer.is_empty());
        assert!(!buffer.flush_due(Duration::ZERO, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_summaries_recomputed_after_take() {
        let mut buffer = CondenserBuffer::new();
        push(&mut buffer, "big", "a");
        push(&mut buffer, "big", "b");
        push(&mut buffer, "big", "c");
        push(&mut buffer, "small", "d");

        // "big" leaves on batch size; "small" alone must not keep the old
        // largest-batch summary alive.
        let batches = buffer.take_ready(WINDOW, 3);
        assert_eq!(batches.len(), 1);
        assert!(!buffer.flush_due(WINDOW, 3));
        assert_eq!(buffer.len(), 1);
    }
}
