use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::Lsn;

/// Allocates log sequence numbers. The buffer pool takes an optional handle
/// so a recovery layer can be threaded through; the core engine itself never
/// emits records.
pub struct LogManager {
    next_lsn: AtomicU64,
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LogManager {
    pub fn new() -> Self {
        Self {
            next_lsn: AtomicU64::new(1),
        }
    }

    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_lsn(&self) -> Lsn {
        self.next_lsn.load(Ordering::SeqCst).saturating_sub(1)
    }
}
