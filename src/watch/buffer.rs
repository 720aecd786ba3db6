// src/watch/buffer.rs

//! Thread-safe debounce buffer between the notify callback and the polling
//! loop.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::time::Instant;

use crate::watch::event::FsEvent;

/// Map from event identity to the instant it was first seen.
///
/// `push` is insert-if-absent: a burst of identical events keeps the
/// timestamp of the first one, so the burst matures (and is dispatched) once,
/// `rate_limit_duration` after it started. A duplicate arriving after the
/// entry was popped starts a fresh entry.
///
/// All methods take the single internal lock for a short, non-blocking
/// critical section; `snapshot` copies the entries out so callers iterate
/// without holding it.
#[derive(Debug, Default)]
pub struct EventBuffer {
    entries: Mutex<HashMap<FsEvent, Instant>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer `event` stamped with the current instant.
    ///
    /// Returns `false` if an identical event was already waiting, in which
    /// case the original timestamp is kept.
    pub fn push(&self, event: FsEvent) -> bool {
        self.push_at(event, Instant::now())
    }

    /// Same as [`push`](Self::push) with an explicit timestamp.
    pub fn push_at(&self, event: FsEvent, at: Instant) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(&event) {
            return false;
        }
        entries.insert(event, at);
        true
    }

    /// Remove `event`, returning the timestamp it was buffered with.
    ///
    /// Only the caller that gets `Some` back may dispatch the event.
    pub fn pop(&self, event: &FsEvent) -> Option<Instant> {
        self.lock().remove(event)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of every buffered `(event, timestamp)` pair, oldest first.
    pub fn snapshot(&self) -> Vec<(FsEvent, Instant)> {
        let mut items: Vec<(FsEvent, Instant)> = self
            .lock()
            .iter()
            .map(|(event, at)| (event.clone(), *at))
            .collect();
        items.sort_by_key(|(_, at)| *at);
        items
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FsEvent, Instant>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
