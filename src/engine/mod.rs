// src/engine/mod.rs

//! Dispatch side of rewatch.
//!
//! - [`dispatcher`] runs each matured event through every job's filters and
//!   processor, isolating failures per job.
//! - [`sink`] receives structured notifications (accepted, ignored,
//!   launched, finished) and decides how to present them.

pub mod dispatcher;
pub mod sink;

pub use dispatcher::{Dispatcher, Job, JobRun};
pub use sink::{ConsoleSink, NotificationSink, SilentSink};
