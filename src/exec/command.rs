// src/exec/command.rs

//! One-shot processors: `command` (a shell line) and `make`.
//!
//! Both run to completion inside `on_change`; success means exit status 0.
//! The child sees the parent's environment, the job's `environment` table
//! and three variables describing the triggering event.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::RewatchError;
use crate::exec::processor::{
    BoxFuture, Processor, ProcessorContext, ProcessorKind, ProcessorResult,
};
use crate::watch::event::FsEvent;

pub const COMMAND: ProcessorKind = ProcessorKind {
    id: "command",
    description: "runs a shell command",
    mandatory_keys: &["command"],
    factory: create_command,
};

pub const MAKE: ProcessorKind = ProcessorKind {
    id: "make",
    description: "runs a Makefile target",
    mandatory_keys: &[],
    factory: create_make,
};

/// Name of the env var holding the event kind (`created`, `modified`, ...).
pub const ENV_EVENT: &str = "REWATCH_EVENT";
/// Name of the env var holding the event path.
pub const ENV_FILENAME: &str = "REWATCH_FILENAME";
/// Name of the env var set to `1` for directory events, `0` otherwise.
pub const ENV_IS_DIRECTORY: &str = "REWATCH_IS_DIRECTORY";

fn create_command(ctx: ProcessorContext<'_>) -> crate::errors::Result<Box<dyn Processor>> {
    let command = ctx
        .job
        .command
        .clone()
        .ok_or_else(|| RewatchError::MissingKey {
            job: ctx.job.name.clone(),
            key: "command".to_string(),
        })?;

    Ok(Box::new(CommandProcessor {
        name: ctx.job.name.clone(),
        command,
        environment: ctx.job.environment.clone(),
        show_output: ctx.log.job_output,
    }))
}

fn create_make(ctx: ProcessorContext<'_>) -> crate::errors::Result<Box<dyn Processor>> {
    Ok(Box::new(MakeProcessor {
        name: ctx.job.name.clone(),
        target: ctx.job.target.clone().filter(|t| !t.is_empty()),
        directory: ctx
            .job
            .directory
            .clone()
            .filter(|d| !d.is_empty())
            .map(PathBuf::from),
        jobs: ctx.job.jobs,
        environment: ctx.job.environment.clone(),
        show_output: ctx.log.job_output,
    }))
}

/// Runs `command` through `sh -c`.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    name: String,
    command: String,
    environment: BTreeMap<String, String>,
    show_output: bool,
}

impl CommandProcessor {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            environment: BTreeMap::new(),
            show_output: true,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn quiet(mut self) -> Self {
        self.show_output = false;
        self
    }
}

impl Processor for CommandProcessor {
    fn on_change<'a>(
        &'a mut self,
        event: &'a FsEvent,
    ) -> BoxFuture<'a, Result<ProcessorResult>> {
        Box::pin(async move {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&self.command);

            info!(job = %self.name, cmd = %self.command, "starting command");
            run_to_completion(&mut cmd, &self.environment, event, self.show_output)
                .await
                .with_context(|| format!("running command for job '{}'", self.name))
        })
    }
}

/// Runs `make -j<jobs> [-C <directory>] [<target>]`.
#[derive(Debug, Clone)]
pub struct MakeProcessor {
    name: String,
    target: Option<String>,
    directory: Option<PathBuf>,
    jobs: usize,
    environment: BTreeMap<String, String>,
    show_output: bool,
}

impl MakeProcessor {
    /// Arguments passed to `make`.
    pub fn args(&self) -> Vec<String> {
        let jobs = if self.jobs == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.jobs
        };

        let mut args = vec![format!("-j{jobs}")];
        if let Some(dir) = &self.directory {
            args.push("-C".to_string());
            args.push(dir.to_string_lossy().into_owned());
        }
        if let Some(target) = &self.target {
            args.push(target.clone());
        }
        args
    }
}

impl Processor for MakeProcessor {
    fn on_change<'a>(
        &'a mut self,
        event: &'a FsEvent,
    ) -> BoxFuture<'a, Result<ProcessorResult>> {
        Box::pin(async move {
            let args = self.args();
            info!(job = %self.name, ?args, "starting make");

            let mut cmd = Command::new("make");
            cmd.args(&args);
            run_to_completion(&mut cmd, &self.environment, event, self.show_output)
                .await
                .with_context(|| format!("running make for job '{}'", self.name))
        })
    }
}

/// Environment variables describing `event`.
pub fn event_env(event: &FsEvent) -> [(&'static str, String); 3] {
    [
        (ENV_EVENT, event.kind.to_string()),
        (ENV_FILENAME, event.path_str()),
        (
            ENV_IS_DIRECTORY,
            if event.is_directory { "1" } else { "0" }.to_string(),
        ),
    ]
}

async fn run_to_completion(
    cmd: &mut Command,
    environment: &BTreeMap<String, String>,
    event: &FsEvent,
    show_output: bool,
) -> Result<ProcessorResult> {
    let output = || {
        if show_output {
            Stdio::inherit()
        } else {
            Stdio::null()
        }
    };

    cmd.envs(environment)
        .envs(event_env(event))
        .stdin(Stdio::null())
        .stdout(output())
        .stderr(output())
        .kill_on_drop(true);

    let status = cmd.status().await.context("spawning process")?;
    let code = status.code().unwrap_or(-1);
    debug!(exit_code = code, success = status.success(), "process exited");

    Ok(ProcessorResult::from_success(status.success()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::event::EventKind;

    fn make(target: Option<&str>, directory: Option<&str>, jobs: usize) -> MakeProcessor {
        MakeProcessor {
            name: "m".into(),
            target: target.map(str::to_string),
            directory: directory.map(PathBuf::from),
            jobs,
            environment: BTreeMap::new(),
            show_output: false,
        }
    }

    #[test]
    fn make_args_include_directory_and_target() {
        assert_eq!(
            make(Some("all"), Some("build"), 4).args(),
            vec!["-j4", "-C", "build", "all"]
        );
        assert_eq!(make(None, None, 2).args(), vec!["-j2"]);
    }

    #[test]
    fn zero_jobs_means_available_parallelism() {
        let args = make(None, None, 0).args();
        let n: usize = args[0].trim_start_matches("-j").parse().unwrap();
        assert!(n >= 1);
    }

    #[test]
    fn event_env_describes_the_event() {
        let event = FsEvent::new("/r/dir", EventKind::Created).directory(true);
        let env = event_env(&event);
        assert_eq!(env[0], (ENV_EVENT, "created".to_string()));
        assert_eq!(env[1], (ENV_FILENAME, "/r/dir".to_string()));
        assert_eq!(env[2], (ENV_IS_DIRECTORY, "1".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_success_follows_exit_status() {
        let event = FsEvent::new("/r/a.txt", EventKind::Modified);

        let mut ok = CommandProcessor::new("ok", "test \"$REWATCH_EVENT\" = modified").quiet();
        assert!(ok.on_change(&event).await.unwrap().success);

        let mut bad = CommandProcessor::new("bad", "exit 3").quiet();
        assert!(!bad.on_change(&event).await.unwrap().success);

        let mut env = CommandProcessor::new("env", "test \"$GREETING\" = hi")
            .with_env("GREETING", "hi")
            .quiet();
        assert!(env.on_change(&event).await.unwrap().success);
    }
}
