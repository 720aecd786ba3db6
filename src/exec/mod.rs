// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`processor`] defines the `Processor` contract and the registry mapping
//!   processor ids to factories.
//! - [`command`] holds the one-shot `command` and `make` processors.
//! - [`daemon`] supervises long-running children (`ProcessLifecycle`).
//! - [`backoff`] is the signal retry schedule used when stopping a daemon.
//! - [`record`] is a processor that only remembers what it saw.

pub mod backoff;
pub mod command;
pub mod daemon;
pub mod processor;
pub mod record;

pub use backoff::Backoff;
pub use command::{CommandProcessor, MakeProcessor};
pub use daemon::{
    ChildProcess, DaemonProcessor, Launcher, LifecycleState, ProcessLifecycle, ShellLauncher,
};
pub use processor::{
    BoxFuture, Processor, ProcessorContext, ProcessorKind, ProcessorRegistry, ProcessorResult,
};
pub use record::{History, RecordProcessor};
