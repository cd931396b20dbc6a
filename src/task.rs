/*============================================================
  Project: apkd
  Module: apkd::task
  ------------------------------------------------------------
  Purpose:
    Describe batch work items and their lifecycle, and read
    package-list files into tasks.

  Security / Safety Notes:
    Reads operator-supplied list files only.

  Dependencies:
    None beyond std.

  Operational Scope:
    Fed into the task runner by the binary entry point.

  Revision History:
    2026-09-07  Introduced task model and list parsing.
  ------------------------------------------------------------
  Principles Observed:
    - Terminal states are final
    - Malformed input lines are reported, never fatal
============================================================*/

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::error::{ApkdError, Result};
use crate::logger::Logger;

/// One package to process; `version_code = None` selects the newest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Task {
    pub package: String,
    pub version_code: Option<i64>,
}

impl Task {
    pub fn newest(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version_code: None,
        }
    }

    pub fn pinned(package: impl Into<String>, code: i64) -> Self {
        Self {
            package: package.into(),
            version_code: Some(code),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version_code {
            Some(code) => write!(f, "{}=={code}", self.package),
            None => f.write_str(&self.package),
        }
    }
}

/// Lifecycle of a task: `Queued -> InFlight -> {Done, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    InFlight,
    Done,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }

    /// Apply a transition, refusing to leave a terminal state.
    pub fn advance(&mut self, next: TaskState) -> bool {
        let allowed = match (*self, next) {
            (TaskState::Queued, TaskState::InFlight) => true,
            (TaskState::Queued, TaskState::Failed) => true,
            (TaskState::InFlight, TaskState::Done | TaskState::Failed) => true,
            _ => false,
        };
        if allowed {
            *self = next;
        }
        allowed
    }
}

/// Drop repeated tasks, keeping first occurrences in order.
pub fn dedupe(tasks: Vec<Task>) -> Vec<Task> {
    let mut seen = HashSet::new();
    tasks
        .into_iter()
        .filter(|task| seen.insert(task.clone()))
        .collect()
}

/// Parse `package` / `package==versionCode` lines.
///
/// Blank lines and `#` comments are ignored; lines with a malformed version
/// code are logged and skipped.
pub fn parse_package_list(contents: &str, logger: &Logger) -> Vec<Task> {
    let mut tasks = Vec::new();
    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once("==") {
            None => tasks.push(Task::newest(line)),
            Some((package, code)) => match code.trim().parse::<i64>() {
                Ok(code) if !package.trim().is_empty() => {
                    tasks.push(Task::pinned(package.trim(), code))
                }
                _ => logger.warn(
                    "PKGLIST",
                    format!("Incorrect line {}: `{line}`, skipped", index + 1),
                ),
            },
        }
    }
    dedupe(tasks)
}

/// Read and parse a package-list file.
pub fn read_package_list(path: &Path, logger: &Logger) -> Result<Vec<Task>> {
    let contents = std::fs::read_to_string(path).map_err(|err| {
        ApkdError::Filesystem(format!(
            "Failed to read package list {}: {err}",
            path.display()
        ))
    })?;
    Ok(parse_package_list(&contents, logger))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_list_accepts_pins_and_skips_garbage() {
        let logger = Logger::capturing();
        let tasks = parse_package_list(
            "org.fdroid.fdroid\n\n# comment\norg.example==42\norg.bad==4x2\n==7\norg.example==42\n",
            &logger,
        );
        assert_eq!(
            tasks,
            vec![Task::newest("org.fdroid.fdroid"), Task::pinned("org.example", 42)]
        );
        let warnings = logger.captured();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("line 5"));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut state = TaskState::Queued;
        assert!(state.advance(TaskState::InFlight));
        assert!(state.advance(TaskState::Done));
        assert!(state.is_terminal());
        assert!(!state.advance(TaskState::Failed));
        assert!(!state.advance(TaskState::InFlight));
        assert_eq!(state, TaskState::Done);
    }

    #[test]
    fn queued_cannot_skip_to_done() {
        let mut state = TaskState::Queued;
        assert!(!state.advance(TaskState::Done));
        assert!(state.advance(TaskState::Failed));
    }

    #[test]
    fn display_matches_list_syntax() {
        assert_eq!(Task::pinned("org.example", 3).to_string(), "org.example==3");
        assert_eq!(Task::newest("org.example").to_string(), "org.example");
    }
}
