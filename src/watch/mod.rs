// src/watch/mod.rs

//! File watching and event filtering.
//!
//! This module is responsible for:
//! - Turning `notify` events into [`FsEvent`]s.
//! - Debouncing them in a shared [`EventBuffer`].
//! - Deciding per job whether an event is relevant ([`JobMatcher`]).
//! - Driving the poll loop that hands matured events to a handler.
//!
//! It does **not** run anything itself; the engine decides what a matched
//! event triggers.

pub mod buffer;
pub mod event;
pub mod matcher;
pub mod watcher;

pub use buffer::EventBuffer;
pub use event::{EventKind, FsEvent};
pub use matcher::{JobMatcher, JobSpec, Rejection};
pub use watcher::{EventHandler, Watcher, WatcherState};
