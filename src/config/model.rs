// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::watch::event::EventKind;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [event]
/// rate_limit_duration = 0.01
///
/// [log]
/// result = true
///
/// [[job]]
/// name = "test"
/// type = "command"
/// glob = "src/*.py"
/// when = ["modified"]
/// command = "pytest"
/// ```
///
/// `[event]` and `[log]` are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub event: EventSection,

    #[serde(default)]
    pub log: LogSection,

    /// All jobs from `[[job]]`, in declaration order.
    #[serde(default)]
    pub job: Vec<JobConfig>,
}

impl ConfigFile {
    /// Effective log flags (`all = true` switches on every event log).
    pub fn log_settings(&self) -> LogSection {
        self.log.effective()
    }
}

/// `[event]` section: debounce and self-trigger suppression.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSection {
    /// Seconds an event must stay quiet before it is dispatched.
    #[serde(default = "default_rate_limit_duration")]
    pub rate_limit_duration: f64,

    /// Drop events that were buffered before the last dispatch finished.
    ///
    /// Disabling this may produce a never-ending loop when a job writes
    /// into its own watched tree.
    #[serde(default = "default_true")]
    pub ignore_events_while_run: bool,
}

fn default_rate_limit_duration() -> f64 {
    0.01
}

fn default_true() -> bool {
    true
}

impl Default for EventSection {
    fn default() -> Self {
        Self {
            rate_limit_duration: default_rate_limit_duration(),
            ignore_events_while_run: default_true(),
        }
    }
}

impl EventSection {
    pub fn settings(&self) -> GlobalSettings {
        GlobalSettings {
            rate_limit: seconds(self.rate_limit_duration),
            ignore_events_while_running: self.ignore_events_while_run,
        }
    }
}

/// Validated watcher settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalSettings {
    pub rate_limit: Duration,
    pub ignore_events_while_running: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        EventSection::default().settings()
    }
}

/// `[log]` section: which notifications are shown.
#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub accepted_events: bool,
    #[serde(default, alias = "filtered_events")]
    pub ignored_events: bool,
    #[serde(default, alias = "dispatched_events")]
    pub launched_events: bool,
    #[serde(default)]
    pub rate_limited_events: bool,
    #[serde(default = "default_true")]
    pub result: bool,
    #[serde(default = "default_true")]
    pub time: bool,
    /// Forward processor stdout/stderr to ours.
    #[serde(default = "default_true", alias = "processor_output")]
    pub job_output: bool,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            all: false,
            accepted_events: false,
            ignored_events: false,
            launched_events: false,
            rate_limited_events: false,
            result: true,
            time: true,
            job_output: true,
        }
    }
}

impl LogSection {
    pub fn effective(&self) -> LogSection {
        let mut out = self.clone();
        if out.all {
            out.accepted_events = true;
            out.ignored_events = true;
            out.launched_events = true;
            out.rate_limited_events = true;
        }
        out
    }
}

/// A predicate value that may be a single string or a list of them.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    /// Flatten into a list; empty strings mean "no constraint".
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(s) if s.is_empty() => Vec::new(),
            OneOrMany::One(s) => vec![s.clone()],
            OneOrMany::Many(v) => v.iter().filter(|s| !s.is_empty()).cloned().collect(),
        }
    }
}

fn flatten(value: &Option<OneOrMany>) -> Vec<String> {
    value.as_ref().map(OneOrMany::to_vec).unwrap_or_default()
}

/// Signal for the daemon processor: a name (`"SIGTERM"`, `"TERM"`) or a number.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SignalSpec {
    Number(i32),
    Name(String),
}

/// One `[[job]]` entry.
///
/// Common keys drive the filter pipeline; the rest are read by whichever
/// processor `type` selects.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    #[serde(default = "default_job_name")]
    pub name: String,

    /// Processor id, e.g. `"command"` or `"daemon"`.
    #[serde(default, rename = "type", alias = "processor")]
    pub processor: Option<String>,

    /// Root directory to watch (recursively).
    #[serde(default = "default_job_path")]
    pub path: String,

    #[serde(default)]
    pub glob: Option<OneOrMany>,
    #[serde(default)]
    pub glob_exclude: Option<OneOrMany>,
    #[serde(default)]
    pub regex: Option<OneOrMany>,
    #[serde(default)]
    pub regex_exclude: Option<OneOrMany>,

    /// Event types that trigger this job; absent means all.
    #[serde(default)]
    pub when: Option<OneOrMany>,

    // -- processor specific --
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// make: target to build.
    #[serde(default)]
    pub target: Option<String>,
    /// make: directory holding the Makefile (`make -C`).
    #[serde(default)]
    pub directory: Option<String>,
    /// make: parallel jobs; 0 picks the available parallelism.
    #[serde(default)]
    pub jobs: usize,

    /// daemon: termination signal.
    #[serde(default)]
    pub signal: Option<SignalSpec>,
    /// daemon: seconds to wait for a graceful stop before SIGKILL.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    /// daemon: show the child's stdout.
    #[serde(default = "default_true")]
    pub stdout: bool,
    /// daemon: show the child's stderr.
    #[serde(default = "default_true")]
    pub stderr: bool,
}

fn default_job_name() -> String {
    "noname".to_string()
}

fn default_job_path() -> String {
    ".".to_string()
}

fn default_timeout() -> f64 {
    5.0
}

impl JobConfig {
    /// Minimal job of the given processor type; handy for tests and tooling.
    pub fn new(name: impl Into<String>, processor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processor: Some(processor.into()),
            path: default_job_path(),
            glob: None,
            glob_exclude: None,
            regex: None,
            regex_exclude: None,
            when: None,
            command: None,
            environment: BTreeMap::new(),
            target: None,
            directory: None,
            jobs: 0,
            signal: None,
            timeout: default_timeout(),
            stdout: true,
            stderr: true,
        }
    }

    pub fn glob_patterns(&self) -> Vec<String> {
        flatten(&self.glob)
    }

    pub fn glob_exclude_patterns(&self) -> Vec<String> {
        flatten(&self.glob_exclude)
    }

    pub fn regex_patterns(&self) -> Vec<String> {
        flatten(&self.regex)
    }

    pub fn regex_exclude_patterns(&self) -> Vec<String> {
        flatten(&self.regex_exclude)
    }

    /// Parsed `when` list; invalid entries are reported by validation.
    pub fn when_kinds(&self) -> Result<Vec<EventKind>, String> {
        flatten(&self.when).iter().map(|s| s.parse()).collect()
    }

    pub fn timeout_duration(&self) -> Duration {
        seconds(self.timeout)
    }
}

/// Seconds as a `Duration`; negatives clamp to zero and values too large
/// for a `Duration` saturate. Validation rejects both before this runs.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}
