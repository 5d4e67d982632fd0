//! Deterministic sampled logging
//!
//! Routine per-instance observations (healthy depth, unreachable endpoint)
//! are logged once every N ticks per key instead of every tick.

use std::collections::HashMap;

#[derive(Debug, Default)]
struct LimitState {
    seen: u64,
    suppressed: u64,
}

/// Per-key "log at most once per N ticks" limiter
#[derive(Debug)]
pub struct LogLimiter {
    every: u64,
    keys: HashMap<String, LimitState>,
}

impl LogLimiter {
    /// `every` of 0 or 1 logs every observation
    pub fn new(every: u32) -> Self {
        Self {
            every: u64::from(every.max(1)),
            keys: HashMap::new(),
        }
    }

    /// Record an observation for `key`. Returns `Some(suppressed)` when this
    /// one should be logged, carrying how many were dropped since the last.
    pub fn observe(&mut self, key: &str) -> Option<u64> {
        let state = self.keys.entry(key.to_string()).or_default();
        let log_now = state.seen % self.every == 0;
        state.seen += 1;
        if log_now {
            let suppressed = state.suppressed;
            state.suppressed = 0;
            Some(suppressed)
        } else {
            state.suppressed += 1;
            None
        }
    }
}
