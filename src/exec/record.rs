// src/exec/record.rs

//! `record` processor: remembers every event it receives.
//!
//! Useful for trying out filter settings and for tests; it never fails.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::info;

use crate::exec::processor::{
    BoxFuture, Processor, ProcessorContext, ProcessorKind, ProcessorResult,
};
use crate::watch::event::FsEvent;

pub const RECORD: ProcessorKind = ProcessorKind {
    id: "record",
    description: "records events without running anything",
    mandatory_keys: &[],
    factory: create_record,
};

fn create_record(ctx: ProcessorContext<'_>) -> crate::errors::Result<Box<dyn Processor>> {
    Ok(Box::new(RecordProcessor::new(ctx.job.name.clone())))
}

/// Shared view of the events a [`RecordProcessor`] has seen.
#[derive(Debug, Clone, Default)]
pub struct History {
    events: Arc<Mutex<Vec<FsEvent>>>,
}

impl History {
    pub fn events(&self) -> Vec<FsEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn push(&self, event: FsEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

#[derive(Debug, Clone)]
pub struct RecordProcessor {
    name: String,
    history: History,
}

impl RecordProcessor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            history: History::default(),
        }
    }

    /// Handle that stays valid after the processor is moved into a job.
    pub fn history(&self) -> History {
        self.history.clone()
    }
}

impl Processor for RecordProcessor {
    fn on_change<'a>(
        &'a mut self,
        event: &'a FsEvent,
    ) -> BoxFuture<'a, Result<ProcessorResult>> {
        Box::pin(async move {
            info!(job = %self.name, kind = %event.kind, path = %event.path.display(), "recorded event");
            self.history.push(event.clone());
            Ok(ProcessorResult::success())
        })
    }
}
