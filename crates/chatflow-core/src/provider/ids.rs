//! Tool-call id generation for backends that do not supply their own.

use std::sync::atomic::{AtomicU64, Ordering};

/// Produces correlation ids for tool invocations.
///
/// `index` is the invocation's position within the response. Ids must be
/// unique within one response; the default generator is also unique across
/// responses for practical purposes.
pub trait ToolCallIdGenerator: Send + Sync {
    fn next_id(&self, index: usize) -> String;
}

/// `tool_<unix millis>_<sequence>_<index>`.
///
/// The sequence counter keeps ids distinct when two responses land within
/// the same millisecond.
#[derive(Debug, Default)]
pub struct TimestampIdGenerator {
    sequence: AtomicU64,
}

impl TimestampIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ToolCallIdGenerator for TimestampIdGenerator {
    fn next_id(&self, index: usize) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let millis = chrono::Utc::now().timestamp_millis();
        format!("tool_{millis}_{seq}_{index}")
    }
}

/// Deterministic `<prefix>_<n>` ids, for tests and reproducible runs.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }
}

impl ToolCallIdGenerator for SequentialIdGenerator {
    fn next_id(&self, _index: usize) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}", self.prefix, n)
    }
}
