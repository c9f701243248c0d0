//! Per-run audit log
//!
//! One line per event: `[timestamp] tool run=<id> EVENT key=value ...`. The
//! run id ties together lines from one invocation when several runs append to
//! the same file.

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::paths::ensure_dir_exists;

/// Audit hooks called by the transfer and harvest paths. Every hook defaults
/// to a no-op.
pub trait Logger: Send + Sync {
    fn start(&self, _url: &str, _dst: &Path) {}
    fn skipped(&self, _url: &str, _dst: &Path) {}
    fn fetched(&self, _url: &str, _dst: &Path, _bytes: u64) {}
    fn harvested(&self, _frame: &str, _files: usize) {}
    fn error(&self, _context: &str, _target: &str, _msg: &str) {}
    fn done(&self, _jobs: u64, _bytes: u64, _seconds: f64) {}
}

/// Used when no `--log-file` is given.
pub struct NoopLogger;

impl Logger for NoopLogger {}

/// Append-only text log shared by every lane of a run.
pub struct TextLogger {
    file: Mutex<File>,
    tool: &'static str,
    run: String,
}

impl TextLogger {
    /// Open `path` for appending on behalf of `tool` (`lics-fetch`,
    /// `lics-meta`), creating parent directories as needed.
    pub fn open(path: &Path, tool: &'static str) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir_exists(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
            tool,
            run: format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"), std::process::id()),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run
    }

    fn event(&self, tag: &str, detail: fmt::Arguments<'_>) {
        let line = format!(
            "[{}] {} run={} {} {}\n",
            Utc::now().to_rfc3339(),
            self.tool,
            self.run,
            tag,
            detail
        );
        // A failed audit write never fails the transfer it describes.
        let _ = self.file.lock().write_all(line.as_bytes());
    }
}

impl Logger for TextLogger {
    fn start(&self, url: &str, dst: &Path) {
        self.event("START", format_args!("url={} dst={}", url, dst.display()));
    }
    fn skipped(&self, url: &str, dst: &Path) {
        self.event("SKIP", format_args!("url={} dst={}", url, dst.display()));
    }
    fn fetched(&self, url: &str, dst: &Path, bytes: u64) {
        self.event(
            "FETCH",
            format_args!("url={} dst={} bytes={}", url, dst.display(), bytes),
        );
    }
    fn harvested(&self, frame: &str, files: usize) {
        self.event("FRAME", format_args!("id={frame} files={files}"));
    }
    fn error(&self, context: &str, target: &str, msg: &str) {
        self.event("ERROR", format_args!("ctx={context} target={target} msg={msg}"));
    }
    fn done(&self, jobs: u64, bytes: u64, seconds: f64) {
        self.event("DONE", format_args!("jobs={jobs} bytes={bytes} seconds={seconds:.3}"));
    }
}

/// `TextLogger` at `path` when given, otherwise `NoopLogger`. A log file
/// that cannot be opened is reported and the run continues without it.
pub fn open_logger(path: Option<&Path>, tool: &'static str) -> Box<dyn Logger> {
    match path {
        Some(p) => match TextLogger::open(p, tool) {
            Ok(l) => Box::new(l),
            Err(e) => {
                eprintln!("cannot open log file: {e:#}");
                Box::new(NoopLogger)
            }
        },
        None => Box::new(NoopLogger),
    }
}
