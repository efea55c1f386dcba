//! Time sources.
//!
//! Harvest intervals, operation cooldowns, resource regrowth and crafting
//! durations are all wall-clock based. Every component reads time through
//! a [`Clock`] so headless drivers and tests can substitute a
//! [`ManualClock`] and step time explicitly.

use crate::fixed::Millis;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A monotonic millisecond time source shared across threads.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since the clock's origin.
    fn now_ms(&self) -> Millis;
}

/// Real time, measured from construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Move time forward by `ms`.
    pub fn advance(&self, ms: Millis) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time. Going backwards is ignored.
    pub fn set(&self, ms: Millis) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}

/// Shared handle used by the registry and the crafting engine.
pub type SharedClock = Arc<dyn Clock>;
