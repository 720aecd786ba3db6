// src/engine/dispatcher.rs

//! Fan-out of a matured event to every configured job.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::model::{ConfigFile, JobConfig};
use crate::errors::{Result, RewatchError};
use crate::engine::sink::NotificationSink;
use crate::exec::processor::{BoxFuture, Processor, ProcessorRegistry, ProcessorResult};
use crate::watch::event::FsEvent;
use crate::watch::matcher::{JobMatcher, JobSpec, Rejection};
use crate::watch::watcher::EventHandler;

/// A job: compiled filters plus the processor they guard.
pub struct Job {
    spec: JobSpec,
    matcher: JobMatcher,
    processor: Box<dyn Processor>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.spec.name)
            .field("root", &self.spec.root)
            .finish_non_exhaustive()
    }
}

impl Job {
    /// Compile `spec`'s filters; fails on invalid patterns.
    pub fn new(spec: JobSpec, processor: Box<dyn Processor>) -> Result<Self> {
        let matcher = JobMatcher::new(&spec)?;
        Ok(Self {
            spec,
            matcher,
            processor,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn root(&self) -> &Path {
        &self.spec.root
    }

    pub fn check(&self, event: &FsEvent) -> std::result::Result<(), Rejection> {
        self.matcher.check(event)
    }
}

/// What happened when one job ran for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub job: String,
    pub result: ProcessorResult,
    pub elapsed: Duration,
}

/// Runs every accepting job, in declaration order, for each event.
pub struct Dispatcher {
    jobs: Vec<Job>,
    sink: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(jobs: Vec<Job>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { jobs, sink }
    }

    /// Build every job of `cfg` through `registry`.
    ///
    /// Relative job paths are resolved against `base_dir` (the directory of
    /// the config file). Any unknown processor, missing key or bad pattern
    /// aborts construction.
    pub fn from_config(
        cfg: &ConfigFile,
        base_dir: &Path,
        registry: &ProcessorRegistry,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let log = cfg.log_settings();
        let mut jobs = Vec::with_capacity(cfg.job.len());

        for job_cfg in &cfg.job {
            let processor = registry.create(job_cfg, &log)?;
            let spec = job_spec(job_cfg, base_dir)?;
            debug!(job = %spec.name, root = ?spec.root, "job configured");
            jobs.push(Job::new(spec, processor)?);
        }

        Ok(Self::new(jobs, sink))
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Distinct watch roots, in first-seen order.
    pub fn roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = Vec::new();
        for job in &self.jobs {
            if !roots.iter().any(|r| r == job.root()) {
                roots.push(job.root().to_path_buf());
            }
        }
        roots
    }

    /// Run every processor's start-up hook. A failure here is fatal.
    pub async fn open_all(&mut self) -> Result<()> {
        for job in &mut self.jobs {
            job.processor.open().await.map_err(|e| {
                RewatchError::Other(e.context(format!("starting job '{}'", job.spec.name)))
            })?;
        }
        Ok(())
    }

    /// Run every processor's shutdown hook; failures are only logged.
    pub async fn close_all(&mut self) {
        for job in &mut self.jobs {
            if let Err(e) = job.processor.close().await {
                warn!(job = %job.spec.name, error = %e, "failed to close job");
            }
        }
    }

    /// Offer `event` to every job and run the ones that accept it.
    ///
    /// A processor error becomes a failed [`JobRun`] for that job alone;
    /// the remaining jobs still see the event.
    pub async fn dispatch(&mut self, event: &FsEvent) -> Vec<JobRun> {
        let mut runs = Vec::new();

        for job in &mut self.jobs {
            let name = job.spec.name.clone();

            if let Err(reason) = job.matcher.check(event) {
                self.sink.ignored(&name, reason, event);
                continue;
            }

            self.sink.launched(&name, event);
            let start = Instant::now();
            let result = match job.processor.on_change(event).await {
                Ok(result) => result,
                Err(e) => {
                    error!(job = %name, error = %format!("{e:#}"), "job failed");
                    ProcessorResult::failure(format!("FAILED: {e:#}"))
                }
            };
            let elapsed = start.elapsed();

            self.sink.finished(&name, &result, elapsed);
            runs.push(JobRun {
                job: name,
                result,
                elapsed,
            });
        }

        runs
    }

    /// Dispatch and report whether at least one job ran.
    pub async fn invoke(&mut self, event: &FsEvent) -> bool {
        !self.dispatch(event).await.is_empty()
    }
}

impl EventHandler for Dispatcher {
    fn handle<'a>(&'a mut self, event: &'a FsEvent) -> BoxFuture<'a, bool> {
        Box::pin(self.invoke(event))
    }

    fn shutdown(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(self.close_all())
    }
}

/// Filter spec of one configured job, with its root made absolute.
pub fn job_spec(job: &JobConfig, base_dir: &Path) -> Result<JobSpec> {
    let when = job.when_kinds().map_err(|e| {
        RewatchError::ConfigError(format!("job '{}': {e}", job.name))
    })?;

    Ok(JobSpec {
        name: job.name.clone(),
        root: resolve_root(base_dir, &job.path),
        glob: job.glob_patterns(),
        glob_exclude: job.glob_exclude_patterns(),
        regex: job.regex_patterns(),
        regex_exclude: job.regex_exclude_patterns(),
        when,
    })
}

/// Absolute form of a job `path`, relative ones taken from `base_dir`.
///
/// Existing directories are canonicalized so they line up with the paths
/// the OS watcher reports.
pub fn resolve_root(base_dir: &Path, path: &str) -> PathBuf {
    let joined = base_dir.join(path);
    joined
        .canonicalize()
        .or_else(|_| std::path::absolute(&joined))
        .unwrap_or(joined)
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;
    use crate::engine::sink::SilentSink;
    use crate::exec::record::RecordProcessor;
    use crate::watch::event::EventKind;

    struct Failing;

    impl Processor for Failing {
        fn on_change<'a>(
            &'a mut self,
            _event: &'a FsEvent,
        ) -> BoxFuture<'a, anyhow::Result<ProcessorResult>> {
            Box::pin(async { Err(anyhow!("boom")) })
        }
    }

    fn spec(name: &str, glob: &[&str]) -> JobSpec {
        JobSpec {
            name: name.into(),
            root: PathBuf::from("/proj"),
            glob: glob.iter().map(|s| s.to_string()).collect(),
            ..JobSpec::default()
        }
    }

    #[tokio::test]
    async fn failing_job_does_not_stop_later_jobs() {
        let recorder = RecordProcessor::new("after");
        let history = recorder.history();
        let mut dispatcher = Dispatcher::new(
            vec![
                Job::new(spec("broken", &[]), Box::new(Failing)).unwrap(),
                Job::new(spec("after", &[]), Box::new(recorder)).unwrap(),
            ],
            Arc::new(SilentSink),
        );

        let runs = dispatcher
            .dispatch(&FsEvent::new("/proj/a.txt", EventKind::Modified))
            .await;

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].job, "broken");
        assert!(!runs[0].result.success);
        assert!(runs[1].result.success);
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn invoke_reports_whether_any_job_ran() {
        let mut dispatcher = Dispatcher::new(
            vec![Job::new(spec("txt", &["*.txt"]), Box::new(RecordProcessor::new("txt"))).unwrap()],
            Arc::new(SilentSink),
        );

        assert!(!dispatcher.invoke(&FsEvent::new("/proj/a.rs", EventKind::Modified)).await);
        assert!(dispatcher.invoke(&FsEvent::new("/proj/a.txt", EventKind::Modified)).await);
    }

    #[test]
    fn roots_are_deduplicated() {
        let mut other = spec("c", &[]);
        other.root = PathBuf::from("/elsewhere");
        let dispatcher = Dispatcher::new(
            vec![
                Job::new(spec("a", &[]), Box::new(RecordProcessor::new("a"))).unwrap(),
                Job::new(spec("b", &[]), Box::new(RecordProcessor::new("b"))).unwrap(),
                Job::new(other, Box::new(RecordProcessor::new("c"))).unwrap(),
            ],
            Arc::new(SilentSink),
        );
        assert_eq!(
            dispatcher.roots(),
            vec![PathBuf::from("/proj"), PathBuf::from("/elsewhere")]
        );
    }

    #[test]
    fn relative_roots_resolve_against_base_dir() {
        let root = resolve_root(Path::new("/definitely/not/here"), "src");
        assert_eq!(root, PathBuf::from("/definitely/not/here/src"));
    }
}
