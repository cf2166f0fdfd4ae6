//! Monotonic request id generator (C2).
//!
//! Produces ids of the form `<prefix><counter>`, counter incrementing
//! atomically from 1. Uniqueness is only required per connection; a shared
//! generator across connections is fine and gives the convenience of
//! process-wide-unique ids for log correlation.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::codec::RequestId;

/// Generates ids safe for concurrent callers without any locking.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl IdGenerator {
    /// A generator with no prefix.
    pub fn new() -> Self {
        Self::with_prefix(String::new())
    }

    /// A generator whose ids are tagged with `prefix`, useful for
    /// correlating log lines across multiple connections sharing a process.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(1),
        }
    }

    /// Produce the next id as a `RequestId::Str` (`<prefix><counter>`).
    pub fn next(&self) -> RequestId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        RequestId::Str(format!("{}{}", self.prefix, n))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
