// src/config/validate.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::{ConfigFile, JobConfig};
use crate::errors::{Result, RewatchError};
use crate::exec::daemon::parse_signal;
use crate::exec::processor::ProcessorRegistry;
use crate::watch::matcher::{JobMatcher, JobSpec};

/// Run semantic validation against a loaded configuration, using the
/// builtin processors.
///
/// This checks:
/// - there is at least one `[[job]]`
/// - `[event].rate_limit_duration` is a non-negative number that fits a `Duration`
/// - every job names a known processor and carries its mandatory keys
/// - `when` only lists known event types
/// - glob and regex patterns compile
/// - daemon `signal` / `timeout` are usable
///
/// It does **not** check that job paths exist; a missing root surfaces when
/// the watcher starts.
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    validate_with(cfg, &ProcessorRegistry::builtin())
}

/// Same as [`validate_config`] against an explicit processor table.
pub fn validate_with(cfg: &ConfigFile, registry: &ProcessorRegistry) -> Result<()> {
    ensure_has_jobs(cfg)?;
    validate_event_section(cfg)?;
    for job in &cfg.job {
        registry.check(job)?;
        validate_filters(job)?;
        validate_daemon_keys(job)?;
    }
    Ok(())
}

fn ensure_has_jobs(cfg: &ConfigFile) -> Result<()> {
    if cfg.job.is_empty() {
        return Err(RewatchError::ConfigError(
            "config must contain at least one [[job]] section".into(),
        ));
    }
    Ok(())
}

fn validate_event_section(cfg: &ConfigFile) -> Result<()> {
    let secs = cfg.event.rate_limit_duration;
    if Duration::try_from_secs_f64(secs).is_err() {
        return Err(RewatchError::ConfigError(format!(
            "[event].rate_limit_duration must be a non-negative number of seconds (got {secs})"
        )));
    }
    Ok(())
}

fn validate_filters(job: &JobConfig) -> Result<()> {
    let when = job
        .when_kinds()
        .map_err(|e| RewatchError::ConfigError(format!("job '{}': invalid `when`: {e}", job.name)))?;

    // The root only affects how relative globs are joined, not whether
    // they compile.
    let spec = JobSpec {
        name: job.name.clone(),
        root: PathBuf::from(&job.path),
        glob: job.glob_patterns(),
        glob_exclude: job.glob_exclude_patterns(),
        regex: job.regex_patterns(),
        regex_exclude: job.regex_exclude_patterns(),
        when,
    };
    JobMatcher::new(&spec)?;
    Ok(())
}

fn validate_daemon_keys(job: &JobConfig) -> Result<()> {
    if let Some(signal) = &job.signal {
        parse_signal(signal)?;
    }
    let in_range = Duration::try_from_secs_f64(job.timeout).is_ok_and(|d| !d.is_zero());
    if !in_range {
        return Err(RewatchError::ConfigError(format!(
            "job '{}': timeout must be a positive number of seconds (got {})",
            job.name, job.timeout
        )));
    }
    Ok(())
}
