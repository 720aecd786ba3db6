// src/watch/watcher.rs

//! Debounce loop between the OS watcher and the job dispatcher.
//!
//! The notify callback only pushes into the shared [`EventBuffer`]. A single
//! consumer (`run` / `poll_once`) drains matured entries and hands them to
//! the registered [`EventHandler`], one at a time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::model::GlobalSettings;
use crate::engine::sink::NotificationSink;
use crate::errors::{Result, RewatchError};
use crate::exec::processor::BoxFuture;
use crate::watch::buffer::EventBuffer;
use crate::watch::event::FsEvent;

/// Delay between two passes over the buffer.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Consumer of matured events.
pub trait EventHandler: Send {
    /// Handle one event; `true` means at least one job ran for it.
    fn handle<'a>(&'a mut self, event: &'a FsEvent) -> BoxFuture<'a, bool>;

    fn shutdown(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// No path registered yet.
    Idle,
    /// At least one path registered.
    Armed,
    /// OS watchers installed; the loop may run.
    Running,
}

pub struct Watcher {
    settings: GlobalSettings,
    poll_interval: Duration,
    buffer: Arc<EventBuffer>,
    sink: Arc<dyn NotificationSink>,
    paths: Vec<PathBuf>,
    handler: Option<Box<dyn EventHandler>>,
    backends: Vec<RecommendedWatcher>,
    last_dispatch: Option<Instant>,
    state: WatcherState,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("state", &self.state)
            .field("paths", &self.paths)
            .field("settings", &self.settings)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl Watcher {
    pub fn new(settings: GlobalSettings, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            settings,
            poll_interval: POLL_INTERVAL,
            buffer: Arc::new(EventBuffer::new()),
            sink,
            paths: Vec::new(),
            handler: None,
            backends: Vec::new(),
            last_dispatch: None,
            state: WatcherState::Idle,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    /// Handle to the buffer for producers other than the OS watcher.
    pub fn shared_buffer(&self) -> Arc<EventBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Instant at which the last successful dispatch finished.
    pub fn last_dispatch(&self) -> Option<Instant> {
        self.last_dispatch
    }

    /// Register a directory to watch recursively.
    pub fn add_path(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        if self.state == WatcherState::Running {
            return Err(RewatchError::WatcherState(
                "cannot add a path to a running watcher".into(),
            ));
        }
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
        self.state = WatcherState::Armed;
        Ok(())
    }

    pub fn set_handler(&mut self, handler: Box<dyn EventHandler>) -> Result<()> {
        if self.paths.is_empty() {
            return Err(RewatchError::WatcherState(
                "add at least one path before registering a handler".into(),
            ));
        }
        self.handler = Some(handler);
        Ok(())
    }

    /// Install one recursive OS watcher per registered path.
    pub fn start(&mut self) -> Result<()> {
        if self.handler.is_none() {
            return Err(RewatchError::WatcherState(
                "register a handler before starting the watcher".into(),
            ));
        }
        if self.state == WatcherState::Running {
            return Ok(());
        }

        for path in &self.paths {
            let buffer = Arc::clone(&self.buffer);
            let sink = Arc::clone(&self.sink);
            let mut backend = RecommendedWatcher::new(
                move |res: notify::Result<Event>| match res {
                    Ok(event) => {
                        for fs_event in FsEvent::from_notify(&event) {
                            ingest(&buffer, sink.as_ref(), fs_event);
                        }
                    }
                    Err(err) => warn!("file watch error: {err}"),
                },
                Config::default(),
            )?;
            backend.watch(path, RecursiveMode::Recursive)?;
            info!("watching {}", path.display());
            self.backends.push(backend);
        }

        self.state = WatcherState::Running;
        Ok(())
    }

    /// Feed an event as if the OS watcher had reported it.
    pub fn ingest(&self, event: FsEvent) {
        ingest(&self.buffer, self.sink.as_ref(), event);
    }

    /// One pass over the buffer. Returns how many events were dispatched
    /// to a job.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let Some(handler) = self.handler.as_mut() else {
            return Err(RewatchError::WatcherState(
                "no event handler registered".into(),
            ));
        };

        let mut dispatched = 0;
        for (event, stamped) in self.buffer.snapshot() {
            if Instant::now().duration_since(stamped) <= self.settings.rate_limit {
                continue;
            }
            if self.buffer.pop(&event).is_none() {
                continue;
            }

            let stale = self.last_dispatch.is_some_and(|last| stamped < last);
            if self.settings.ignore_events_while_running && stale {
                debug!("dropping {event}: buffered while a job was running");
                self.sink.suppressed(&event);
                continue;
            }

            if handler.handle(&event).await {
                self.last_dispatch = Some(Instant::now());
                dispatched += 1;
            }
        }

        Ok(dispatched)
    }

    /// Poll forever. Only returns on error.
    pub async fn run(&mut self) -> Result<()> {
        if self.state != WatcherState::Running {
            return Err(RewatchError::WatcherState(
                "start the watcher before running it".into(),
            ));
        }
        loop {
            self.poll_once().await?;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Drop the OS watchers and let the handler release its resources.
    pub async fn shutdown(&mut self) {
        self.backends.clear();
        if let Some(handler) = self.handler.as_mut() {
            handler.shutdown().await;
        }
        self.state = if self.paths.is_empty() {
            WatcherState::Idle
        } else {
            WatcherState::Armed
        };
    }
}

fn ingest(buffer: &EventBuffer, sink: &dyn NotificationSink, event: FsEvent) {
    if buffer.push(event.clone()) {
        sink.accepted(&event);
    } else {
        sink.rate_limited(&event);
    }
}
