//! Tracing setup and the per-run migration log.
//!
//! The migration log is a plain text file that receives every tracing event
//! (without ANSI colours) plus the captured output of every external tool.
//! On a fatal failure its tail is shown to the operator.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::process::{Cmd, CommandResult};

/// Number of log lines shown when a conversion fails.
pub const TAIL_LINES: usize = 30;

/// Append-only log file shared between tracing and tool output capture.
#[derive(Debug, Clone)]
pub struct MigrationLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl MigrationLog {
    /// Create (or truncate) the log at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append raw text. Logging must never abort a migration, so errors are dropped.
    pub fn append(&self, text: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(text.as_bytes());
            if !text.ends_with('\n') {
                let _ = file.write_all(b"\n");
            }
        }
    }

    /// Record a finished tool invocation with its captured streams.
    pub fn record(&self, cmd: &Cmd, result: &CommandResult) {
        let mut entry = format!("$ {}\n", cmd.display());
        if !result.stdout.is_empty() {
            entry.push_str(&result.stdout);
            if !result.stdout.ends_with('\n') {
                entry.push('\n');
            }
        }
        if !result.stderr.is_empty() {
            entry.push_str(&result.stderr);
            if !result.stderr.ends_with('\n') {
                entry.push('\n');
            }
        }
        entry.push_str(&format!("[exit code {}]\n", result.code()));
        self.append(&entry);
    }

    /// Last `n` lines of the log.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let content = fs::read_to_string(&self.path).unwrap_or_default();
        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].iter().map(|l| l.to_string()).collect()
    }

    fn writer(&self) -> LogWriter {
        LogWriter(Arc::clone(&self.file))
    }
}

/// `io::Write` handle handed to the tracing file layer.
pub struct LogWriter(Arc<Mutex<File>>);

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.lock() {
            Ok(mut file) => file.write(buf),
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.lock() {
            Ok(mut file) => file.flush(),
            Err(_) => Ok(()),
        }
    }
}

/// Install the global subscriber: stderr always, plus the migration log if given.
///
/// `RUST_LOG` wins over `verbose`.
pub fn init(verbose: bool, log: Option<&MigrationLog>) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(filter());

    let file_layer = log.map(|log| {
        let log = log.clone();
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(move || log.writer())
            .with_filter(filter())
    });

    // A second init (tests, nested commands) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_and_tail() {
        let dir = TempDir::new().unwrap();
        let log = MigrationLog::create(&dir.path().join("migration.log")).unwrap();

        log.append("starting");
        let cmd = Cmd::new("virt-v2v").args(["-i", "ova"]);
        log.record(&cmd, &CommandResult::from_code(1, "line one\nline two", "boom\n"));

        let tail = log.tail(3);
        assert_eq!(tail, vec!["line two", "boom", "[exit code 1]"]);

        let all = log.tail(100);
        assert_eq!(all[0], "starting");
        assert_eq!(all[1], "$ virt-v2v -i ova");
    }

    #[test]
    fn test_tail_of_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = MigrationLog::create(&dir.path().join("a.log")).unwrap();
        fs::remove_file(log.path()).unwrap();
        assert!(log.tail(TAIL_LINES).is_empty());
    }
}
