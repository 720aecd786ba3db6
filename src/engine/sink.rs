// src/engine/sink.rs

//! Presentation hooks for watcher and dispatcher activity.
//!
//! The core only calls these; how (and whether) anything is shown is up to
//! the sink. [`ConsoleSink`] renders through `tracing` according to the
//! `[log]` config section.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::model::LogSection;
use crate::exec::processor::ProcessorResult;
use crate::watch::event::FsEvent;
use crate::watch::matcher::Rejection;

/// Receiver of structured notifications. Every hook defaults to a no-op.
pub trait NotificationSink: Send + Sync {
    /// A new event entered the debounce buffer.
    fn accepted(&self, _event: &FsEvent) {}

    /// An identical event was already buffered; this one was coalesced.
    fn rate_limited(&self, _event: &FsEvent) {}

    /// A matured event was dropped because a job ran after it was buffered.
    fn suppressed(&self, _event: &FsEvent) {}

    /// A job's filters turned the event down.
    fn ignored(&self, _job: &str, _reason: Rejection, _event: &FsEvent) {}

    /// A job accepted the event and its processor is about to run.
    fn launched(&self, _job: &str, _event: &FsEvent) {}

    /// A job's processor finished.
    fn finished(&self, _job: &str, _result: &ProcessorResult, _elapsed: Duration) {}
}

/// Sink that shows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

impl NotificationSink for SilentSink {}

/// Sink that logs through `tracing`, filtered by the `[log]` flags.
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    log: LogSection,
}

impl ConsoleSink {
    pub fn new(log: &LogSection) -> Self {
        Self {
            log: log.effective(),
        }
    }
}

impl NotificationSink for ConsoleSink {
    fn accepted(&self, event: &FsEvent) {
        if self.log.accepted_events {
            info!("accept: {event}");
        }
    }

    fn rate_limited(&self, event: &FsEvent) {
        if self.log.rate_limited_events {
            info!("rate-limited: {event}");
        }
    }

    fn suppressed(&self, event: &FsEvent) {
        if self.log.rate_limited_events {
            info!("dropped (arrived while a job was running): {event}");
        }
    }

    fn ignored(&self, job: &str, reason: Rejection, event: &FsEvent) {
        if self.log.ignored_events {
            info!(job = %job, "ignore: ({reason}) {event}");
        }
    }

    fn launched(&self, job: &str, event: &FsEvent) {
        if self.log.launched_events {
            info!(job = %job, "launch: {event}");
        }
    }

    fn finished(&self, job: &str, result: &ProcessorResult, elapsed: Duration) {
        let Some(line) = result_line(&self.log, result, elapsed) else {
            return;
        };
        if result.success {
            info!(job = %job, "{line}");
        } else {
            warn!(job = %job, "{line}");
        }
    }
}

/// Text shown after a run, or `None` when `[log]` hides both parts.
///
/// A processor message replaces the default `SUCCEEDED`/`FAILED, took ..`.
pub fn result_line(log: &LogSection, result: &ProcessorResult, elapsed: Duration) -> Option<String> {
    if let Some(message) = &result.message {
        return Some(message.clone());
    }

    let mut parts = Vec::new();
    if log.result {
        parts.push(if result.success { "SUCCEEDED" } else { "FAILED" }.to_string());
    }
    if log.time {
        parts.push(format!("took {}", format_elapsed(elapsed)));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// `[HHh][MMm]SSs`, hours and minutes only when non-zero.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let h = secs / 3600;
    let m = (secs / 60) % 60;
    let s = secs % 60;

    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{h:02}h"));
    }
    if m > 0 {
        out.push_str(&format!("{m:02}m"));
    }
    out.push_str(&format!("{s:02}s"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "01s");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "01m05s");
        assert_eq!(format_elapsed(Duration::from_secs(3600 + 2)), "01h02s");
    }

    #[test]
    fn result_line_respects_log_flags() {
        let log = LogSection::default();
        let ok = ProcessorResult::success();
        assert_eq!(
            result_line(&log, &ok, Duration::from_secs(2)).as_deref(),
            Some("SUCCEEDED, took 02s")
        );

        let quiet = LogSection {
            result: false,
            time: false,
            ..LogSection::default()
        };
        assert_eq!(result_line(&quiet, &ok, Duration::ZERO), None);

        let restarted = ProcessorResult::success().with_message("Restarted!");
        assert_eq!(
            result_line(&quiet, &restarted, Duration::ZERO).as_deref(),
            Some("Restarted!")
        );
    }
}
