//! Interpreter generations - process-wide identity for live interpreters
//!
//! Every interpreter draws a never-reused tag from a counter; the live set
//! holds the tags of interpreters that have not been closed yet.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashSet;
use once_cell::sync::Lazy;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

static LIVE: Lazy<DashSet<u64>> = Lazy::new(|| DashSet::with_capacity(8));

/// Allocate a fresh generation and mark it live
pub(super) fn open() -> u64 {
    let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
    LIVE.insert(generation);
    generation
}

pub(super) fn retire(generation: u64) {
    LIVE.remove(&generation);
}

/// Whether the interpreter tagged `generation` is still open
#[inline]
pub fn generation_is_live(generation: u64) -> bool {
    LIVE.contains(&generation)
}
