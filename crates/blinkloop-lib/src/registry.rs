//! Busy registry — the set of serials currently claimed by a live session.
//!
//! Sessions share a registry through an `Arc`. [`BusyRegistry::global`]
//! returns the process-wide instance; tests build their own with
//! [`BusyRegistry::new`] so they never observe each other's claims.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

#[derive(Debug, Default)]
pub struct BusyRegistry {
    serials: Mutex<HashSet<String>>,
}

static GLOBAL: OnceLock<Arc<BusyRegistry>> = OnceLock::new();

impl BusyRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(BusyRegistry::new))
    }

    /// Lock the registry for a check-then-claim sequence.
    ///
    /// Acquisition holds this guard across the busy check, the device open
    /// and the insert, so two sessions can never claim the same serial.
    pub(crate) fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.serials.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_busy(&self, serial: &str) -> bool {
        self.lock().contains(serial)
    }

    /// Remove a serial. Returns `false` if it was not claimed.
    pub(crate) fn release(&self, serial: &str) -> bool {
        self.lock().remove(serial)
    }

    /// Snapshot of the claimed serials, sorted.
    pub fn claimed(&self) -> Vec<String> {
        let mut v: Vec<String> = self.lock().iter().cloned().collect();
        v.sort();
        v
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// First candidate not in `busy`.
pub(crate) fn first_free<'a>(
    busy: &HashSet<String>,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    candidates.into_iter().find(|s| !busy.contains(*s))
}
