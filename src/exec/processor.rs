// src/exec/processor.rs

//! Processor contract and the id → factory registry.
//!
//! A processor is what a job runs when its filters accept an event. Every
//! processor implements [`Processor::on_change`]; long-running ones also hook
//! [`Processor::open`] / [`Processor::close`], which the dispatcher calls
//! once at start-up and shutdown.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::config::model::{JobConfig, LogSection};
use crate::errors::{Result, RewatchError};
use crate::watch::event::FsEvent;

/// Boxed future returned by processor hooks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of one `on_change` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorResult {
    pub success: bool,
    /// Replaces the default SUCCEEDED/FAILED line when set.
    pub message: Option<String>,
}

impl ProcessorResult {
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    pub fn from_success(success: bool) -> Self {
        Self {
            success,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Trait implemented by every job action.
///
/// Errors returned from `on_change` are turned into a failed result for that
/// job only; they never stop the watch loop.
pub trait Processor: Send {
    /// Start-up hook, called once before the watcher runs.
    fn open(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Handle an event that passed the job's filters.
    fn on_change<'a>(
        &'a mut self,
        event: &'a FsEvent,
    ) -> BoxFuture<'a, anyhow::Result<ProcessorResult>>;

    /// Shutdown hook, called once before exit.
    fn close(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Everything a factory needs to build a processor for one job.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorContext<'a> {
    pub job: &'a JobConfig,
    pub log: &'a LogSection,
}

pub type ProcessorFactory = fn(ProcessorContext<'_>) -> Result<Box<dyn Processor>>;

/// Registry entry for one processor id.
#[derive(Clone, Copy)]
pub struct ProcessorKind {
    pub id: &'static str,
    pub description: &'static str,
    /// Job keys that must be present for this processor.
    pub mandatory_keys: &'static [&'static str],
    pub factory: ProcessorFactory,
}

impl fmt::Debug for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorKind")
            .field("id", &self.id)
            .field("mandatory_keys", &self.mandatory_keys)
            .finish_non_exhaustive()
    }
}

/// Table of available processors, built once at start-up and handed to the
/// dispatcher.
#[derive(Debug, Clone, Default)]
pub struct ProcessorRegistry {
    kinds: BTreeMap<&'static str, ProcessorKind>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every processor shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(crate::exec::command::COMMAND);
        registry.register(crate::exec::command::MAKE);
        registry.register(crate::exec::daemon::DAEMON);
        registry.register(crate::exec::record::RECORD);
        registry
    }

    pub fn register(&mut self, kind: ProcessorKind) {
        self.kinds.insert(kind.id, kind);
    }

    pub fn get(&self, id: &str) -> Option<&ProcessorKind> {
        self.kinds.get(id)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ProcessorKind> {
        self.kinds.values()
    }

    /// Check the processor id and its mandatory keys without building it.
    pub fn check(&self, job: &JobConfig) -> Result<&ProcessorKind> {
        let id = job.processor.as_deref().ok_or_else(|| RewatchError::MissingKey {
            job: job.name.clone(),
            key: "type".to_string(),
        })?;

        let kind = self
            .get(id)
            .ok_or_else(|| RewatchError::UnknownProcessor(id.to_string()))?;

        for key in kind.mandatory_keys {
            if !has_key(job, key) {
                return Err(RewatchError::MissingKey {
                    job: job.name.clone(),
                    key: key.to_string(),
                });
            }
        }

        Ok(kind)
    }

    /// Build the processor for `job`.
    pub fn create(&self, job: &JobConfig, log: &LogSection) -> Result<Box<dyn Processor>> {
        let kind = self.check(job)?;
        (kind.factory)(ProcessorContext { job, log })
    }
}

fn has_key(job: &JobConfig, key: &str) -> bool {
    match key {
        "command" => job.command.as_deref().is_some_and(|c| !c.trim().is_empty()),
        "target" => job.target.is_some(),
        "directory" => job.directory.is_some(),
        "signal" => job.signal.is_some(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_lists_processors() {
        let registry = ProcessorRegistry::builtin();
        let ids: Vec<_> = registry.kinds().map(|k| k.id).collect();
        assert_eq!(ids, vec!["command", "daemon", "make", "record"]);
    }

    #[test]
    fn unknown_processor_is_rejected() {
        let registry = ProcessorRegistry::builtin();
        let job = JobConfig::new("j", "pytest-ish");
        assert!(matches!(
            registry.check(&job),
            Err(RewatchError::UnknownProcessor(id)) if id == "pytest-ish"
        ));
    }

    #[test]
    fn missing_type_and_mandatory_keys_are_rejected() {
        let registry = ProcessorRegistry::builtin();

        let mut untyped = JobConfig::new("j", "command");
        untyped.processor = None;
        assert!(matches!(
            registry.check(&untyped),
            Err(RewatchError::MissingKey { key, .. }) if key == "type"
        ));

        let no_command = JobConfig::new("j", "daemon");
        assert!(matches!(
            registry.check(&no_command),
            Err(RewatchError::MissingKey { key, .. }) if key == "command"
        ));
    }
}
