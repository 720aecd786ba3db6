// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{ConsoleSink, Dispatcher, NotificationSink};
use crate::exec::ProcessorRegistry;
use crate::watch::Watcher;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - the processor registry and dispatcher
/// - the file watcher and its poll loop
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let registry = ProcessorRegistry::builtin();

    if args.processors {
        print_processors(&registry);
        return Ok(());
    }

    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_and_validate(&config_path)?;
    if args.verbose {
        cfg.log.all = true;
    }

    let base_dir = config_root_dir(&config_path);

    if args.dry_run {
        print_dry_run(&cfg, &base_dir);
        return Ok(());
    }

    let sink: Arc<dyn NotificationSink> = Arc::new(ConsoleSink::new(&cfg.log_settings()));
    let mut dispatcher = Dispatcher::from_config(&cfg, &base_dir, &registry, Arc::clone(&sink))?;
    let roots = dispatcher.roots();
    dispatcher.open_all().await?;

    let mut watcher = Watcher::new(cfg.event.settings(), sink);
    for root in &roots {
        watcher.add_path(root)?;
    }
    watcher.set_handler(Box::new(dispatcher))?;
    watcher.start()?;
    info!(jobs = cfg.job.len(), "rewatch is running; press Ctrl-C to stop");

    let outcome = tokio::select! {
        res = watcher.run() => res.map_err(anyhow::Error::from),
        res = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            res.map_err(anyhow::Error::from)
        }
    };

    watcher.shutdown().await;
    outcome
}

/// Figure out the directory relative job paths are resolved against.
/// Currently: directory containing the config file, or `.`.
fn config_root_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn print_processors(registry: &ProcessorRegistry) {
    println!("available processors:");
    for kind in registry.kinds() {
        println!("  {:<10} {}", kind.id, kind.description);
        if !kind.mandatory_keys.is_empty() {
            println!("  {:<10} requires: {}", "", kind.mandatory_keys.join(", "));
        }
    }
}

/// Simple dry-run output: print settings and jobs.
fn print_dry_run(cfg: &ConfigFile, base_dir: &Path) {
    let settings = cfg.event.settings();
    println!("rewatch dry-run");
    println!("  event.rate_limit_duration = {:?}", settings.rate_limit);
    println!(
        "  event.ignore_events_while_run = {}",
        settings.ignore_events_while_running
    );
    println!();

    println!("jobs ({}):", cfg.job.len());
    for job in &cfg.job {
        println!("  - {}", job.name);
        println!("      type: {}", job.processor.as_deref().unwrap_or("?"));
        println!(
            "      path: {}",
            engine::dispatcher::resolve_root(base_dir, &job.path).display()
        );
        for (label, patterns) in [
            ("glob", job.glob_patterns()),
            ("glob_exclude", job.glob_exclude_patterns()),
            ("regex", job.regex_patterns()),
            ("regex_exclude", job.regex_exclude_patterns()),
        ] {
            if !patterns.is_empty() {
                println!("      {label}: {patterns:?}");
            }
        }
        if let Ok(kinds) = job.when_kinds() {
            if !kinds.is_empty() {
                let names: Vec<_> = kinds.iter().map(|k| k.as_str()).collect();
                println!("      when: {names:?}");
            }
        }
        if let Some(ref command) = job.command {
            println!("      command: {command}");
        }
    }

    debug!("dry-run complete (no watching)");
}
