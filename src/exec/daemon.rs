// src/exec/daemon.rs

//! Supervision of a long-running child process (the `daemon` processor).
//!
//! The child is spawned in its own process group so that the termination
//! signal also reaches anything it forked. Stopping is graceful first: the
//! configured signal is re-sent on an exponential backoff until the group
//! leader exits or the timeout budget is spent, then the group gets exactly
//! one SIGKILL.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::model::SignalSpec;
use crate::errors::{Result, RewatchError};
use crate::exec::backoff::Backoff;
use crate::exec::processor::{
    BoxFuture, Processor, ProcessorContext, ProcessorKind, ProcessorResult,
};
use crate::watch::event::FsEvent;

pub const DAEMON: ProcessorKind = ProcessorKind {
    id: "daemon",
    description: "keeps a command running and restarts it on every matching event",
    mandatory_keys: &["command"],
    factory: create_daemon,
};

fn create_daemon(ctx: ProcessorContext<'_>) -> Result<Box<dyn Processor>> {
    let job = ctx.job;
    let command = job
        .command
        .clone()
        .ok_or_else(|| RewatchError::MissingKey {
            job: job.name.clone(),
            key: "command".to_string(),
        })?;

    let signal = match &job.signal {
        Some(spec) => parse_signal(spec)?,
        None => Signal::SIGTERM,
    };

    let launcher = ShellLauncher {
        command,
        environment: job.environment.clone(),
        stdout: job.stdout && ctx.log.job_output,
        stderr: job.stderr && ctx.log.job_output,
    };

    Ok(Box::new(DaemonProcessor::new(
        job.name.clone(),
        ProcessLifecycle::new(Box::new(launcher), signal, job.timeout_duration()),
    )))
}

/// Parse a configured signal: `"SIGTERM"`, `"term"` or a raw number.
pub fn parse_signal(spec: &SignalSpec) -> Result<Signal> {
    match spec {
        SignalSpec::Number(n) => {
            Signal::try_from(*n).map_err(|_| RewatchError::InvalidSignal(n.to_string()))
        }
        SignalSpec::Name(name) => {
            let upper = name.trim().to_uppercase();
            let full = if upper.starts_with("SIG") {
                upper
            } else {
                format!("SIG{upper}")
            };
            Signal::from_str(&full).map_err(|_| RewatchError::InvalidSignal(name.clone()))
        }
    }
}

/// A spawned child whose process group can be signalled.
pub trait ChildProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Send `signal` to the child's whole process group.
    fn signal_group(&mut self, signal: Signal) -> anyhow::Result<()>;

    /// Non-blocking liveness probe; reaps the child once it has exited.
    fn has_exited(&mut self) -> bool;

    /// Wait until the child is gone.
    fn wait_exit(&mut self) -> BoxFuture<'_, ()>;
}

/// Starts a fresh child for a [`ProcessLifecycle`].
pub trait Launcher: Send {
    fn launch(&mut self) -> anyhow::Result<Box<dyn ChildProcess>>;

    /// Human-readable description of what gets launched.
    fn describe(&self) -> String;
}

/// Runs a command through `sh -c` in a new process group.
#[derive(Debug, Clone)]
pub struct ShellLauncher {
    pub command: String,
    pub environment: BTreeMap<String, String>,
    pub stdout: bool,
    pub stderr: bool,
}

impl ShellLauncher {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            environment: BTreeMap::new(),
            stdout: true,
            stderr: true,
        }
    }
}

impl Launcher for ShellLauncher {
    fn launch(&mut self) -> anyhow::Result<Box<dyn ChildProcess>> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .envs(&self.environment)
            .stdin(Stdio::null())
            .stdout(if self.stdout { Stdio::inherit() } else { Stdio::null() })
            .stderr(if self.stderr { Stdio::inherit() } else { Stdio::null() })
            .process_group(0);

        let child = cmd
            .spawn()
            .with_context(|| format!("spawning daemon `{}`", self.command))?;
        Ok(Box::new(GroupChild { child }))
    }

    fn describe(&self) -> String {
        self.command.clone()
    }
}

/// `tokio` child that leads its own process group.
#[derive(Debug)]
struct GroupChild {
    child: Child,
}

impl ChildProcess for GroupChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn signal_group(&mut self, signal: Signal) -> anyhow::Result<()> {
        let pid = self
            .child
            .id()
            .ok_or_else(|| anyhow!("child already reaped"))?;
        let pgid = i32::try_from(pid).context("pid out of range")?;
        killpg(Pid::from_raw(pgid), signal)
            .with_context(|| format!("sending {signal} to process group {pgid}"))
    }

    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    fn wait_exit(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self.child.wait().await {
                debug!(error = %e, "waiting for killed daemon failed");
            }
        })
    }
}

/// Where a [`ProcessLifecycle`] currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Owns at most one live child and knows how to (re)start and stop it.
pub struct ProcessLifecycle {
    launcher: Box<dyn Launcher>,
    child: Option<Box<dyn ChildProcess>>,
    signal: Signal,
    timeout: Duration,
    state: LifecycleState,
}

impl std::fmt::Debug for ProcessLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessLifecycle")
            .field("command", &self.launcher.describe())
            .field("signal", &self.signal)
            .field("timeout", &self.timeout)
            .field("state", &self.state)
            .finish()
    }
}

impl ProcessLifecycle {
    pub fn new(launcher: Box<dyn Launcher>, signal: Signal, timeout: Duration) -> Self {
        Self {
            launcher,
            child: None,
            signal,
            timeout,
            state: LifecycleState::Stopped,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn child_id(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Spawn a child. A still-running previous child is stopped first so
    /// there is never more than one.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        if self.child.is_some() {
            self.stop().await;
        }

        self.state = LifecycleState::Starting;
        match self.launcher.launch() {
            Ok(child) => {
                debug!(pid = ?child.id(), command = %self.launcher.describe(), "daemon started");
                self.child = Some(child);
                self.state = LifecycleState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Stopped;
                Err(e)
            }
        }
    }

    /// Stop the child, escalating to SIGKILL once `timeout` is spent.
    ///
    /// No-op without a child. Returns once the child is known to be gone.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        self.state = LifecycleState::Stopping;

        for interval in Backoff::with_timeout(self.timeout) {
            fire_and_forget(child.as_mut(), self.signal);
            if child.has_exited() {
                debug!(pid = ?child.id(), "daemon exited after {}", self.signal);
                self.state = LifecycleState::Stopped;
                return;
            }
            sleep(interval).await;
        }

        if !child.has_exited() {
            warn!(
                pid = ?child.id(),
                timeout = ?self.timeout,
                "daemon ignored {}; sending SIGKILL",
                self.signal
            );
            fire_and_forget(child.as_mut(), Signal::SIGKILL);
            child.wait_exit().await;
        }
        self.state = LifecycleState::Stopped;
    }

    /// Stop then start; stop problems never prevent the new start.
    pub async fn restart(&mut self) -> anyhow::Result<()> {
        self.stop().await;
        self.start().await
    }
}

fn fire_and_forget(child: &mut dyn ChildProcess, signal: Signal) {
    if let Err(e) = child.signal_group(signal) {
        debug!(error = %e, "ignoring signal delivery failure");
    }
}

/// Processor wrapper: `open` starts, each event restarts, `close` stops.
#[derive(Debug)]
pub struct DaemonProcessor {
    name: String,
    lifecycle: ProcessLifecycle,
}

impl DaemonProcessor {
    pub fn new(name: impl Into<String>, lifecycle: ProcessLifecycle) -> Self {
        Self {
            name: name.into(),
            lifecycle,
        }
    }

    pub fn lifecycle(&self) -> &ProcessLifecycle {
        &self.lifecycle
    }
}

impl Processor for DaemonProcessor {
    fn open(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.lifecycle.start().await?;
            info!(
                job = %self.name,
                command = %self.lifecycle.launcher.describe(),
                "daemon started"
            );
            Ok(())
        })
    }

    /// Restart the daemon.
    ///
    /// Stopping never fails the run, even when the old child is already
    /// gone. A new child that cannot be spawned yields a failed result and
    /// leaves the daemon stopped until the next event.
    fn on_change<'a>(
        &'a mut self,
        event: &'a FsEvent,
    ) -> BoxFuture<'a, anyhow::Result<ProcessorResult>> {
        Box::pin(async move {
            info!(job = %self.name, event = %event, "restarting daemon");
            if let Err(e) = self.lifecycle.restart().await {
                warn!(job = %self.name, error = %e, "daemon failed to restart");
                return Ok(ProcessorResult::failure(format!("restart failed: {e:#}")));
            }
            Ok(ProcessorResult::success().with_message("Restarted!"))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.lifecycle.stop().await;
            info!(job = %self.name, "daemon stopped");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::time::Instant;

    use super::*;

    type SignalLog = Arc<Mutex<Vec<(Duration, Signal)>>>;

    /// Child that ignores everything but the signals listed in `dies_on`.
    struct FakeChild {
        started: Instant,
        log: SignalLog,
        dies_on: Vec<Signal>,
        alive: bool,
    }

    impl ChildProcess for FakeChild {
        fn id(&self) -> Option<u32> {
            Some(4242)
        }

        fn signal_group(&mut self, signal: Signal) -> anyhow::Result<()> {
            if !self.alive {
                return Err(anyhow!("no such process"));
            }
            self.log
                .lock()
                .unwrap()
                .push((self.started.elapsed(), signal));
            if self.dies_on.contains(&signal) {
                self.alive = false;
            }
            Ok(())
        }

        fn has_exited(&mut self) -> bool {
            !self.alive
        }

        fn wait_exit(&mut self) -> BoxFuture<'_, ()> {
            Box::pin(async {})
        }
    }

    struct FakeLauncher {
        log: SignalLog,
        dies_on: Vec<Signal>,
        launches: Arc<Mutex<usize>>,
        /// Refuse to spawn once this many children were launched.
        max_launches: Option<usize>,
    }

    impl Launcher for FakeLauncher {
        fn launch(&mut self) -> anyhow::Result<Box<dyn ChildProcess>> {
            let mut launches = self.launches.lock().unwrap();
            if self.max_launches.is_some_and(|max| *launches >= max) {
                return Err(anyhow!("spawn failed: no such file"));
            }
            *launches += 1;
            Ok(Box::new(FakeChild {
                started: Instant::now(),
                log: Arc::clone(&self.log),
                dies_on: self.dies_on.clone(),
                alive: true,
            }))
        }

        fn describe(&self) -> String {
            "fake".into()
        }
    }

    fn lifecycle(dies_on: Vec<Signal>, timeout: Duration) -> (ProcessLifecycle, SignalLog, Arc<Mutex<usize>>) {
        let log: SignalLog = Arc::default();
        let launches = Arc::new(Mutex::new(0));
        let launcher = FakeLauncher {
            log: Arc::clone(&log),
            dies_on,
            launches: Arc::clone(&launches),
            max_launches: None,
        };
        (
            ProcessLifecycle::new(Box::new(launcher), Signal::SIGTERM, timeout),
            log,
            launches,
        )
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_child_gets_backoff_then_one_kill() {
        let (mut lc, log, _) = lifecycle(vec![Signal::SIGKILL], ms(1000));
        lc.start().await.unwrap();
        lc.stop().await;

        let log = log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                (ms(0), Signal::SIGTERM),
                (ms(100), Signal::SIGTERM),
                (ms(300), Signal::SIGTERM),
                (ms(700), Signal::SIGTERM),
                (ms(1000), Signal::SIGKILL),
            ]
        );
        assert!(!lc.is_running());
        assert_eq!(lc.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn cooperative_child_stops_on_first_signal() {
        let (mut lc, log, _) = lifecycle(vec![Signal::SIGTERM, Signal::SIGKILL], ms(1000));
        lc.start().await.unwrap();
        let before = Instant::now();
        lc.stop().await;

        assert_eq!(*log.lock().unwrap(), vec![(ms(0), Signal::SIGTERM)]);
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_child_is_a_no_op() {
        let (mut lc, log, _) = lifecycle(vec![Signal::SIGTERM], ms(1000));
        lc.stop().await;
        lc.stop().await;
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(lc.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_the_child() {
        let (lc, log, launches) = lifecycle(vec![Signal::SIGTERM], ms(1000));
        let mut daemon = DaemonProcessor::new("d", lc);

        daemon.open().await.unwrap();
        let event = FsEvent::new("/r/a", crate::watch::event::EventKind::Modified);
        let result = daemon.on_change(&event).await.unwrap();

        assert!(result.success);
        assert_eq!(result.message.as_deref(), Some("Restarted!"));
        assert_eq!(*launches.lock().unwrap(), 2);
        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(daemon.lifecycle().is_running());

        daemon.close().await.unwrap();
        assert!(!daemon.lifecycle().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_respawn_is_a_failed_run() {
        let launcher = FakeLauncher {
            log: SignalLog::default(),
            dies_on: vec![Signal::SIGTERM],
            launches: Arc::default(),
            max_launches: Some(1),
        };
        let lc = ProcessLifecycle::new(Box::new(launcher), Signal::SIGTERM, ms(1000));
        let mut daemon = DaemonProcessor::new("d", lc);

        daemon.open().await.unwrap();
        let event = FsEvent::new("/r/a", crate::watch::event::EventKind::Modified);
        let result = daemon.on_change(&event).await.unwrap();

        assert!(!result.success);
        assert!(result.message.unwrap().contains("spawn failed"));
        assert_eq!(daemon.lifecycle().state(), LifecycleState::Stopped);
    }

    #[test]
    fn signal_names_and_numbers_parse() {
        assert_eq!(
            parse_signal(&SignalSpec::Name("SIGINT".into())).unwrap(),
            Signal::SIGINT
        );
        assert_eq!(
            parse_signal(&SignalSpec::Name("hup".into())).unwrap(),
            Signal::SIGHUP
        );
        assert_eq!(parse_signal(&SignalSpec::Number(15)).unwrap(), Signal::SIGTERM);
        assert!(matches!(
            parse_signal(&SignalSpec::Name("SIGNOPE".into())),
            Err(RewatchError::InvalidSignal(_))
        ));
    }
}
