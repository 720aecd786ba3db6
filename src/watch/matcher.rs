// src/watch/matcher.rs

//! Per-job event filter pipeline.
//!
//! Evaluation order is fixed and short-circuits on the first rejection:
//! glob → glob_exclude → regex → regex_exclude → event-type allow-list.
//! An empty predicate list never filters.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;

use crate::errors::{Result, RewatchError};
use crate::watch::event::{EventKind, FsEvent};

/// Filter settings of one job, after config defaults were applied.
#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    pub name: String,
    /// Watch root; relative glob patterns are resolved against it.
    pub root: PathBuf,
    pub glob: Vec<String>,
    pub glob_exclude: Vec<String>,
    pub regex: Vec<String>,
    pub regex_exclude: Vec<String>,
    /// Allowed event kinds; empty allows everything.
    pub when: Vec<EventKind>,
}

/// Which stage of the pipeline turned an event down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Glob,
    GlobExclude,
    Regex,
    RegexExclude,
    EventType,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::Glob => "glob doesn't match",
            Rejection::GlobExclude => "excluded by glob_exclude",
            Rejection::Regex => "regex doesn't match",
            Rejection::RegexExclude => "excluded by regex_exclude",
            Rejection::EventType => "event type not in `when`",
        };
        f.write_str(reason)
    }
}

/// Compiled filters for a single job.
#[derive(Clone)]
pub struct JobMatcher {
    glob: Option<GlobSet>,
    glob_exclude: Option<GlobSet>,
    regex: Vec<Regex>,
    regex_exclude: Vec<Regex>,
    when: Vec<EventKind>,
}

impl fmt::Debug for JobMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobMatcher")
            .field("regex", &self.regex)
            .field("regex_exclude", &self.regex_exclude)
            .field("when", &self.when)
            .finish_non_exhaustive()
    }
}

impl JobMatcher {
    /// Compile every pattern of `spec`. Invalid globs or regexes are an
    /// error here, never a silent non-match later.
    pub fn new(spec: &JobSpec) -> Result<Self> {
        Ok(Self {
            glob: build_globset(&spec.root, &spec.glob)?,
            glob_exclude: build_globset(&spec.root, &spec.glob_exclude)?,
            regex: compile_all(&spec.regex)?,
            regex_exclude: compile_all(&spec.regex_exclude)?,
            when: spec.when.clone(),
        })
    }

    pub fn accepts(&self, event: &FsEvent) -> bool {
        self.check(event).is_ok()
    }

    /// Run the pipeline, reporting the first stage that rejects.
    pub fn check(&self, event: &FsEvent) -> std::result::Result<(), Rejection> {
        if let Some(glob) = &self.glob {
            if !glob.is_match(&event.path) {
                return Err(Rejection::Glob);
            }
        }
        if let Some(exclude) = &self.glob_exclude {
            if exclude.is_match(&event.path) {
                return Err(Rejection::GlobExclude);
            }
        }

        let path = event.path_str();
        if !self.regex.is_empty() && !self.regex.iter().any(|re| re.is_match(&path)) {
            return Err(Rejection::Regex);
        }
        if self.regex_exclude.iter().any(|re| re.is_match(&path)) {
            return Err(Rejection::RegexExclude);
        }

        if !self.when.is_empty() && !self.when.contains(&event.kind) {
            return Err(Rejection::EventType);
        }
        Ok(())
    }
}

/// Resolve a glob pattern against the job root.
///
/// Absolute patterns and patterns already starting with the root are kept
/// as-is. The root is escaped so metacharacters in directory names match
/// literally.
pub fn resolve_glob(root: &Path, pattern: &str) -> String {
    let root_str = root.to_string_lossy();
    if pattern.starts_with('/') || pattern.starts_with(root_str.as_ref()) {
        return pattern.to_string();
    }
    let root_str = root_str.trim_end_matches('/');
    let pattern = pattern.trim_start_matches("./");
    format!("{}/{}", globset::escape(root_str), pattern)
}

fn build_globset(root: &Path, patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let resolved = resolve_glob(root, pat);
        let glob = Glob::new(&resolved).map_err(|e| invalid_pattern(pat, e))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| invalid_pattern(&patterns.join(", "), e))?;
    Ok(Some(set))
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| cached_regex(p)).collect()
}

fn regex_cache() -> &'static Mutex<HashMap<String, Regex>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Regex>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Compile `pattern`, reusing an earlier compilation of the same text.
pub fn cached_regex(pattern: &str) -> Result<Regex> {
    let mut cache = regex_cache()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(re) = cache.get(pattern) {
        return Ok(re.clone());
    }

    let re = Regex::new(pattern).map_err(|e| invalid_pattern(pattern, e))?;
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

fn invalid_pattern(pattern: &str, err: impl fmt::Display) -> RewatchError {
    RewatchError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> JobSpec {
        JobSpec {
            name: "job".into(),
            root: PathBuf::from("/proj"),
            ..JobSpec::default()
        }
    }

    fn modified(path: &str) -> FsEvent {
        FsEvent::new(path, EventKind::Modified)
    }

    #[test]
    fn empty_spec_accepts_everything() {
        let m = JobMatcher::new(&spec()).unwrap();
        assert!(m.accepts(&modified("/anywhere/at/all")));
        assert!(m.accepts(&FsEvent::new("/proj/x", EventKind::Deleted)));
    }

    #[test]
    fn relative_glob_is_rooted_at_job_path() {
        let m = JobMatcher::new(&JobSpec {
            glob: vec!["a/*/*.txt".into()],
            ..spec()
        })
        .unwrap();

        assert_eq!(m.check(&modified("/proj/a/b.txt")), Err(Rejection::Glob));
        assert!(m.accepts(&modified("/proj/a/x/b.txt")));
        assert!(!m.accepts(&modified("/elsewhere/a/x/b.txt")));
    }

    #[test]
    fn star_matches_files_in_nested_directories() {
        let m = JobMatcher::new(&JobSpec {
            glob: vec!["src/*.py".into()],
            ..spec()
        })
        .unwrap();

        assert!(m.accepts(&modified("/proj/src/app.py")));
        assert!(m.accepts(&modified("/proj/src/pkg/mod.py")));
        assert_eq!(m.check(&modified("/proj/lib/pkg/mod.py")), Err(Rejection::Glob));
    }

    #[test]
    fn glob_matching_is_case_sensitive() {
        let m = JobMatcher::new(&JobSpec {
            glob: vec!["src/*.py".into()],
            ..spec()
        })
        .unwrap();
        assert!(!m.accepts(&modified("/proj/SRC/app.py")));
    }

    #[test]
    fn glob_list_is_or_combined_and_exclude_wins() {
        let m = JobMatcher::new(&JobSpec {
            glob: vec!["docs/*.md".into(), "src/*/*.txt".into()],
            glob_exclude: vec!["src/exclude/*.txt".into()],
            ..spec()
        })
        .unwrap();

        assert!(m.accepts(&modified("/proj/docs/readme.md")));
        assert!(m.accepts(&modified("/proj/src/keep/a.txt")));
        assert_eq!(
            m.check(&modified("/proj/src/exclude/a.txt")),
            Err(Rejection::GlobExclude)
        );
    }

    #[test]
    fn absolute_glob_is_not_rerooted() {
        let m = JobMatcher::new(&JobSpec {
            glob: vec!["/other/**/*.rs".into()],
            ..spec()
        })
        .unwrap();
        assert!(m.accepts(&modified("/other/deep/down/lib.rs")));
    }

    #[test]
    fn root_metacharacters_match_literally() {
        assert_eq!(resolve_glob(Path::new("/tmp/a[1]"), "*.c"), "/tmp/a[[]1[]]/*.c");
    }

    #[test]
    fn regex_is_an_unanchored_search() {
        let m = JobMatcher::new(&JobSpec {
            regex: vec![r"regex1/.+/[^.]+\.txt".into()],
            regex_exclude: vec![r"/exclude/".into()],
            ..spec()
        })
        .unwrap();

        assert!(m.accepts(&modified("/proj/regex1/foo/bar.txt")));
        assert_eq!(
            m.check(&modified("/proj/regex1/bar.txt")),
            Err(Rejection::Regex)
        );
        assert_eq!(
            m.check(&modified("/proj/regex1/exclude/bar.txt")),
            Err(Rejection::RegexExclude)
        );
    }

    #[test]
    fn event_type_allow_list() {
        let m = JobMatcher::new(&JobSpec {
            when: vec![EventKind::Modified, EventKind::Moved],
            ..spec()
        })
        .unwrap();

        assert!(m.accepts(&modified("/proj/a")));
        assert_eq!(
            m.check(&FsEvent::new("/proj/a", EventKind::Created)),
            Err(Rejection::EventType)
        );
    }

    #[test]
    fn invalid_patterns_fail_at_construction() {
        let bad_regex = JobMatcher::new(&JobSpec {
            regex: vec!["(unclosed".into()],
            ..spec()
        });
        assert!(matches!(bad_regex, Err(RewatchError::InvalidPattern { .. })));

        let bad_glob = JobMatcher::new(&JobSpec {
            glob: vec!["src/[".into()],
            ..spec()
        });
        assert!(matches!(bad_glob, Err(RewatchError::InvalidPattern { .. })));
    }

    #[test]
    fn regex_cache_reuses_compilations() {
        let a = cached_regex(r"cache-probe-\d+").unwrap();
        let b = cached_regex(r"cache-probe-\d+").unwrap();
        assert_eq!(a.as_str(), b.as_str());
        assert!(regex_cache().lock().unwrap().contains_key(r"cache-probe-\d+"));
    }
}
