/*============================================================
  Project: apkd
  Module: apkd::logger
  ------------------------------------------------------------
  Purpose:
    Provide structured, append-only logging for the catalog,
    downloader and task runner. A single Logger is built at
    process start and handed to each component explicitly.

  Security / Safety Notes:
    Download URLs may carry short-lived signatures; they are
    logged at DEBUG only, which never reaches stderr unless
    verbose mode was requested.

  Dependencies:
    chrono for timestamps, sha2 for the session digest,
    indicatif to keep stderr lines clear of progress bars.

  Operational Scope:
    Emits RFC-3339 UTC stamped entries to stderr and an
    optional log file, and seals the file with a digest.

  Revision History:
    2026-09-02  Established logging module for apkd.
    2026-09-24  Added in-memory capture for engine tests.
    2026-10-16  Stderr lines suspend attached progress bars.
  ------------------------------------------------------------
  Principles Observed:
    - Append-only logging with UTC timestamps
    - Deterministic formatting for auditability
    - Graceful error propagation on I/O failures
============================================================*/

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use indicatif::MultiProgress;
use sha2::{Digest, Sha256};

use crate::error::{ApkdError, Result};

/// Structured log level for apkd events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }
}

enum LogSink {
    Stderr,
    File(Mutex<BufWriter<File>>),
    Memory(Mutex<Vec<String>>),
}

/// Shared logger; cheap to share behind an `Arc`.
pub struct Logger {
    sink: LogSink,
    path: Option<PathBuf>,
    verbose: bool,
    console: Mutex<Option<MultiProgress>>,
}

impl Logger {
    /// Build a logger that writes to stderr and optionally to a file.
    pub fn new(path: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let sink = match path.as_deref() {
            Some(file_path) => LogSink::File(Mutex::new(BufWriter::new(open_log(file_path)?))),
            None => LogSink::Stderr,
        };
        Ok(Self {
            sink,
            path,
            verbose,
            console: Mutex::new(None),
        })
    }

    /// Logger that keeps every entry in memory and prints nothing.
    pub fn capturing() -> Self {
        Self {
            sink: LogSink::Memory(Mutex::new(Vec::new())),
            path: None,
            verbose: false,
            console: Mutex::new(None),
        }
    }

    /// Print stderr lines above `bars` instead of through them.
    pub fn attach_progress(&self, bars: MultiProgress) {
        if let Ok(mut console) = self.console.lock() {
            *console = Some(bars);
        }
    }

    fn print_stderr(&self, line: &str) {
        let bars = self.console.lock().ok().and_then(|console| console.clone());
        match bars {
            Some(bars) => bars.suspend(|| eprintln!("{line}")),
            None => eprintln!("{line}"),
        }
    }

    /// Emit a log entry with the given level, code, and message.
    pub fn log<S: AsRef<str>>(&self, level: LogLevel, code: &str, message: S) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let payload = format!(
            "{timestamp} [{}] [{}] {}",
            level.as_str(),
            code,
            message.as_ref()
        );

        let memory = matches!(self.sink, LogSink::Memory(_));
        if !memory && (self.verbose || matches!(level, LogLevel::Error | LogLevel::Warn)) {
            self.print_stderr(&payload);
        }

        match &self.sink {
            LogSink::Stderr => {}
            LogSink::File(file) => {
                if let Ok(mut guard) = file.lock() {
                    if writeln!(guard, "{payload}").and_then(|_| guard.flush()).is_err() {
                        self.print_stderr(&format!(
                            "{timestamp} [{}] [LOGGER] Failed to write to log file",
                            LogLevel::Error.as_str()
                        ));
                    }
                }
            }
            LogSink::Memory(lines) => {
                if let Ok(mut guard) = lines.lock() {
                    guard.push(payload);
                }
            }
        }
    }

    /// Convenience wrapper for `INFO` level events.
    pub fn info<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Info, code, message);
    }

    /// Convenience wrapper for `WARN` level events.
    pub fn warn<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Warn, code, message);
    }

    /// Convenience wrapper for `ERROR` level events.
    pub fn error<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Error, code, message);
    }

    /// Convenience wrapper for `DEBUG` level events.
    pub fn debug<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Debug, code, message);
    }

    /// Entries recorded by a capturing logger; empty for other sinks.
    pub fn captured(&self) -> Vec<String> {
        match &self.sink {
            LogSink::Memory(lines) => lines.lock().map(|guard| guard.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Return the path backing this logger, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Compute and persist SHA-256 digest of the log file.
    pub fn finalize(&self) -> Result<()> {
        let Some(path) = self.path() else {
            return Ok(());
        };
        let data = std::fs::read(path).map_err(|err| {
            ApkdError::Filesystem(format!(
                "Failed to read log for hashing {}: {err}",
                path.display()
            ))
        })?;
        let digest = Sha256::digest(&data);
        let mut hash_os = path.as_os_str().to_os_string();
        hash_os.push(".hash");
        let hash_path = PathBuf::from(hash_os);
        let line = format!(
            "{:x}  {}\n",
            digest,
            path.file_name().unwrap_or_default().to_string_lossy()
        );
        std::fs::write(&hash_path, line).map_err(|err| {
            ApkdError::Filesystem(format!(
                "Failed to write hash file {}: {err}",
                hash_path.display()
            ))
        })
    }
}

fn open_log(file_path: &Path) -> Result<File> {
    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            ApkdError::Filesystem(format!(
                "Failed to create log directory {}: {err}",
                parent.display()
            ))
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)
        .map_err(|err| {
            ApkdError::Filesystem(format!(
                "Failed to open log file {}: {err}",
                file_path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capturing_logger_records_level_and_code() {
        let logger = Logger::capturing();
        logger.warn("SOURCE", "F-Droid timed out");
        logger.debug("CATALOG", "2 sources answered");
        let lines = logger.captured();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[WARN] [SOURCE] F-Droid timed out"));
        assert!(lines[1].contains("[DEBUG] [CATALOG]"));
    }

    #[test]
    fn finalize_writes_digest_next_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs").join("session.log");
        let logger = Logger::new(Some(log_path.clone()), false).unwrap();
        logger.info("INIT", "hello");
        logger.finalize().unwrap();

        let digest = std::fs::read_to_string(dir.path().join("logs/session.log.hash")).unwrap();
        assert!(digest.trim_end().ends_with("  session.log"));
        assert_eq!(digest.split_whitespace().next().unwrap().len(), 64);
        assert!(std::fs::read_to_string(log_path).unwrap().contains("[INFO] [INIT] hello"));
    }

    #[test]
    fn attached_bars_survive_warnings() {
        use indicatif::{ProgressBar, ProgressDrawTarget};

        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("session.log");
        let logger = Logger::new(Some(log_path.clone()), false).unwrap();
        let bars = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let bar = bars.add(ProgressBar::new(100));
        bar.set_position(40);
        logger.attach_progress(bars);

        logger.warn("DOWNLOAD", "size mismatch");
        logger.error("TASK", "org.example: transfer failed");

        assert_eq!(bar.position(), 40);
        assert!(!bar.is_finished());
        let written = std::fs::read_to_string(log_path).unwrap();
        assert!(written.contains("[WARN] [DOWNLOAD] size mismatch"));
        assert!(written.contains("[ERROR] [TASK] org.example: transfer failed"));
    }
}
