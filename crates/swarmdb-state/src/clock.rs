//! Logical clocks producing write stamps.
//!
//! The store never invents timestamps itself: every mutation arrives
//! with a [`Stamp`]. Locally originated writes get theirs from a
//! [`Clock`]; replicated writes carry the remote writer's stamp, which
//! the local clock observes so its next tick orders after it.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use swarmdb_protocol::Stamp;

/// Source of monotonic stamps for one writer.
pub trait Clock: Send + Sync + Debug {
    /// Produce the next stamp for this writer.
    fn tick(&self) -> Stamp;

    /// Advance past a stamp seen from another writer.
    fn observe(&self, stamp: &Stamp);

    /// The writer tag attached to stamps from this clock.
    fn writer(&self) -> &str;

    /// Last time issued or observed.
    fn current(&self) -> u64;
}

/// Lamport clock: a counter bumped on every tick and raised to any
/// observed remote time.
#[derive(Debug)]
pub struct LamportClock {
    writer: String,
    counter: AtomicU64,
}

impl LamportClock {
    pub fn new(writer: impl Into<String>) -> Self {
        Self::starting_at(writer, 0)
    }

    /// Resume a clock whose last issued time was `time`.
    pub fn starting_at(writer: impl Into<String>, time: u64) -> Self {
        Self {
            writer: writer.into(),
            counter: AtomicU64::new(time),
        }
    }
}

impl Clock for LamportClock {
    fn tick(&self) -> Stamp {
        let time = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Stamp::new(time, self.writer.clone())
    }

    fn observe(&self, stamp: &Stamp) {
        self.counter.fetch_max(stamp.time, Ordering::SeqCst);
    }

    fn writer(&self) -> &str {
        &self.writer
    }

    fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}
