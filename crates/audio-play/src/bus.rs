//! Arbitration for the bus shared by storage reads and display refresh.
//!
//! Every audio-side transfer (opening the media file, each chunked read, each
//! output write) takes the guard for that one operation only, so a display
//! refresh holding the same [`SharedBus`] can interleave between chunks.

use std::sync::{Arc, Mutex, MutexGuard};

/// Cloneable handle to the shared bus lock.
#[derive(Clone, Debug, Default)]
pub struct SharedBus {
    lock: Arc<Mutex<()>>,
}

/// Proof of exclusive bus access; released on drop.
pub struct BusGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl SharedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the bus is free and return a guard.
    ///
    /// A holder that panicked does not leave the bus in any inconsistent state
    /// (the lock protects no data), so poisoning is ignored.
    pub fn lock(&self) -> BusGuard<'_> {
        let guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        BusGuard { _guard: guard }
    }

    /// Run `f` while holding the bus.
    pub fn with<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.lock();
        f()
    }

    #[cfg(test)]
    pub(crate) fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}
