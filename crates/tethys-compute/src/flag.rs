//! Asynchronous scalar readback.
//!
//! The staged iterative constraint solver needs to observe a device-written
//! convergence word without draining the queue: a kernel publishes the word,
//! and the host reads it between kernel submissions without blocking. On a
//! device backend this maps to pinned host-visible memory plus an event; the
//! CPU reference uses an atomic word with an explicit publish bit so the
//! host sees exactly the values kernels have signalled.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Host-visible flag word with publish/try-read semantics.
///
/// Clones share the same storage, so a kernel closure can carry a handle
/// while the host keeps its own.
#[derive(Debug, Clone, Default)]
pub struct AsyncFlag {
    word: Arc<AtomicU32>,
    published: Arc<AtomicBool>,
}

impl AsyncFlag {
    /// Creates an unpublished flag with value zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host side: set the word and clear the publish bit before a batch
    /// of kernel launches.
    pub fn reset(&self, value: u32) {
        self.word.store(value, Ordering::Release);
        self.published.store(false, Ordering::Release);
    }

    /// Kernel side: write the word and signal the host.
    pub fn publish(&self, value: u32) {
        self.word.store(value, Ordering::Release);
        self.published.store(true, Ordering::Release);
    }

    /// Host side: read the word if a kernel has published since the last
    /// `reset`, without blocking. Returns `None` when no signal is pending,
    /// letting the host keep issuing kernels.
    pub fn try_read(&self) -> Option<u32> {
        if self.published.load(Ordering::Acquire) {
            Some(self.word.load(Ordering::Acquire))
        } else {
            None
        }
    }

    /// Host side: block until a kernel publishes, then return the word.
    pub fn wait(&self) -> u32 {
        loop {
            if let Some(value) = self.try_read() {
                return value;
            }
            std::hint::spin_loop();
        }
    }
}
