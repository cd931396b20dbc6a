/*============================================================
  Project: apkd
  Module: apkd::runner
  ------------------------------------------------------------
  Purpose:
    Execute version listing, downloads or developer lookups
    over a batch of packages with a bounded worker pool, and
    collect an order-independent report.

  Security / Safety Notes:
    Writes artifacts only through the downloader, into the
    operator-selected output location.

  Dependencies:
    tokio for worker tasks, tokio-util for batch cancellation.

  Operational Scope:
    Driven by the binary entry point; one run per invocation.

  Revision History:
    2026-09-08  Authored concurrent batch engine.
    2026-09-22  Cancelled batches report unclaimed tasks.
  ------------------------------------------------------------
  Principles Observed:
    - Partial success is the normal mode
    - Locks are never held across network I/O
    - Presentation order is independent of completion order
============================================================*/

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::app::{AppVersion, SourceId};
use crate::catalog::Catalog;
use crate::download::{Downloader, NoProgress, ProgressObserver};
use crate::error::{ApkdError, Result};
use crate::logger::Logger;
use crate::task::{dedupe, Task, TaskState};

/// Where downloaded artifacts land.
#[derive(Debug, Clone)]
pub enum OutputTarget {
    /// `{dir}/{package}_{versionCode}.apk`
    Directory(PathBuf),
    /// Explicit path; only meaningful for a single-package batch.
    File(PathBuf),
}

/// What every worker does with a claimed task.
#[derive(Debug, Clone)]
pub enum Operation {
    ListVersions { versions_limit: Option<usize> },
    Download { output: OutputTarget },
    ListDevelopers,
}

/// One line of the batch result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Version {
        package: String,
        source: SourceId,
        name: String,
        code: i64,
        update_date: Option<String>,
        size: u64,
    },
    Developer {
        package: String,
        source: SourceId,
        developer: String,
    },
    Downloaded {
        package: String,
        source: SourceId,
        code: i64,
        path: PathBuf,
        bytes: u64,
    },
    Unavailable {
        package: String,
        reason: String,
    },
}

impl Row {
    pub fn package(&self) -> &str {
        match self {
            Row::Version { package, .. }
            | Row::Developer { package, .. }
            | Row::Downloaded { package, .. }
            | Row::Unavailable { package, .. } => package,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Row::Unavailable { .. })
    }
}

/// Presentation order: resolved rows first, then package name
/// (case-insensitive), then newest version code or source name.
pub fn compare_rows(left: &Row, right: &Row) -> Ordering {
    let primary = right
        .is_resolved()
        .cmp(&left.is_resolved())
        .then_with(|| {
            left.package()
                .to_lowercase()
                .cmp(&right.package().to_lowercase())
        });
    primary.then_with(|| match (left, right) {
        (
            Row::Version {
                code: a, source: sa, ..
            },
            Row::Version {
                code: b, source: sb, ..
            },
        ) => b.cmp(a).then_with(|| sa.cmp(sb)),
        (Row::Downloaded { code: a, .. }, Row::Downloaded { code: b, .. }) => b.cmp(a),
        (
            Row::Developer {
                source: sa,
                developer: da,
                ..
            },
            Row::Developer {
                source: sb,
                developer: db,
                ..
            },
        ) => sa.cmp(sb).then_with(|| da.cmp(db)),
        (
            Row::Unavailable { reason: ra, .. },
            Row::Unavailable { reason: rb, .. },
        ) => ra.cmp(rb),
        _ => Ordering::Equal,
    })
}

/// Final state of one task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task: Task,
    pub state: TaskState,
    pub error: Option<String>,
}

/// Aggregated result of a batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub rows: Vec<Row>,
    pub outcomes: Vec<TaskOutcome>,
    /// Highest number of tasks observed in flight at once.
    pub peak_in_flight: usize,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.state == TaskState::Failed)
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

/// Hands out a progress observer for each download.
pub trait ProgressFactory: Send + Sync {
    fn observer(&self, package: &str, version: &AppVersion) -> Box<dyn ProgressObserver>;
}

impl ProgressFactory for NoProgress {
    fn observer(&self, _package: &str, _version: &AppVersion) -> Box<dyn ProgressObserver> {
        Box::new(NoProgress)
    }
}

/// Bounded worker pool over catalog and downloader.
pub struct TaskRunner {
    catalog: Arc<Catalog>,
    downloader: Arc<Downloader>,
    logger: Arc<Logger>,
    progress: Arc<dyn ProgressFactory>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl TaskRunner {
    pub fn new(
        catalog: Arc<Catalog>,
        downloader: Arc<Downloader>,
        logger: Arc<Logger>,
        concurrency: usize,
    ) -> Self {
        Self {
            catalog,
            downloader,
            logger,
            progress: Arc::new(NoProgress),
            concurrency: concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressFactory>) -> Self {
        self.progress = progress;
        self
    }

    /// Token that aborts the whole batch when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `operation` over `tasks`, returning once every task is terminal.
    pub async fn run(&self, tasks: Vec<Task>, operation: Operation) -> Result<BatchReport> {
        let tasks = dedupe(tasks);
        let pool_size = self.concurrency.min(tasks.len());
        self.logger.info(
            "BATCH",
            format!("{} task(s) across {pool_size} worker(s)", tasks.len()),
        );

        let batch = Arc::new(Batch {
            queue: Mutex::new((0..tasks.len()).collect()),
            sink: Mutex::new(Sink::new(tasks.len())),
            tasks,
            operation,
            catalog: Arc::clone(&self.catalog),
            downloader: Arc::clone(&self.downloader),
            logger: Arc::clone(&self.logger),
            progress: Arc::clone(&self.progress),
            cancel: self.cancel.clone(),
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..pool_size {
            let batch = Arc::clone(&batch);
            workers.spawn(async move { batch.work(worker_id).await });
        }
        while let Some(joined) = workers.join_next().await {
            joined.map_err(|err| ApkdError::Runtime(format!("Worker task failed: {err}")))?;
        }

        let report = batch.report();
        self.logger.info(
            "BATCH",
            format!(
                "complete: {} done, {} failed",
                report.outcomes.len() - report.failed(),
                report.failed()
            ),
        );
        Ok(report)
    }
}

struct Sink {
    rows: Vec<Row>,
    states: Vec<TaskState>,
    errors: Vec<Option<String>>,
    in_flight: usize,
    peak_in_flight: usize,
}

impl Sink {
    fn new(len: usize) -> Self {
        Self {
            rows: Vec::new(),
            states: vec![TaskState::Queued; len],
            errors: vec![None; len],
            in_flight: 0,
            peak_in_flight: 0,
        }
    }
}

struct Batch {
    tasks: Vec<Task>,
    queue: Mutex<VecDeque<usize>>,
    sink: Mutex<Sink>,
    operation: Operation,
    catalog: Arc<Catalog>,
    downloader: Arc<Downloader>,
    logger: Arc<Logger>,
    progress: Arc<dyn ProgressFactory>,
    cancel: CancellationToken,
}

impl Batch {
    async fn work(&self, worker_id: usize) {
        while !self.cancel.is_cancelled() {
            let Some(index) = self.claim() else { break };
            let task = &self.tasks[index];
            self.logger
                .debug("TASK", format!("worker {worker_id} claimed {task}"));

            let outcome = self.execute(task).await;
            self.complete(index, outcome);
        }
    }

    fn claim(&self) -> Option<usize> {
        let index = lock(&self.queue).pop_front()?;
        let mut sink = lock(&self.sink);
        sink.states[index].advance(TaskState::InFlight);
        sink.in_flight += 1;
        sink.peak_in_flight = sink.peak_in_flight.max(sink.in_flight);
        Some(index)
    }

    fn complete(&self, index: usize, outcome: Result<Vec<Row>>) {
        let task = &self.tasks[index];
        if let Err(err) = &outcome {
            if err.is_not_found() {
                self.logger.warn("TASK", format!("{task}: {err}"));
            } else {
                self.logger.error("TASK", format!("{task}: {err}"));
            }
        }

        let mut sink = lock(&self.sink);
        sink.in_flight -= 1;
        match outcome {
            Ok(rows) => {
                sink.states[index].advance(TaskState::Done);
                sink.rows.extend(rows);
            }
            Err(err) => {
                sink.states[index].advance(TaskState::Failed);
                sink.errors[index] = Some(err.to_string());
                sink.rows.push(Row::Unavailable {
                    package: task.package.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    async fn execute(&self, task: &Task) -> Result<Vec<Row>> {
        match &self.operation {
            Operation::ListVersions { versions_limit } => {
                self.list_versions(task, *versions_limit).await
            }
            Operation::Download { output } => self.download(task, output).await,
            Operation::ListDevelopers => self.list_developers(task).await,
        }
    }

    async fn list_versions(&self, task: &Task, versions_limit: Option<usize>) -> Result<Vec<Row>> {
        let apps = self
            .catalog
            .get_app_info(&task.package, versions_limit, &self.cancel)
            .await?;
        Ok(apps
            .iter()
            .flat_map(|app| {
                app.versions().iter().map(|version| Row::Version {
                    package: app.package.clone(),
                    source: version.source.clone(),
                    name: version.name.clone(),
                    code: version.code,
                    update_date: version.update_date.clone(),
                    size: version.size,
                })
            })
            .collect())
    }

    async fn download(&self, task: &Task, output: &OutputTarget) -> Result<Vec<Row>> {
        let package = task.package.as_str();
        let apps = self.catalog.get_app_info(package, None, &self.cancel).await?;
        let version = match task.version_code {
            Some(code) => Catalog::find_version(package, &apps, code)?,
            None => Catalog::resolve_newest_version(package, &apps)?,
        }
        .clone();

        let url = self
            .catalog
            .resolve_download_link(package, &version, &self.cancel)
            .await?;
        let headers = self
            .catalog
            .source(&version.source)
            .map(|source| source.request_headers())
            .unwrap_or_default();
        let destination = match output {
            OutputTarget::Directory(dir) => dir.join(version.file_name(package)),
            OutputTarget::File(path) => path.clone(),
        };

        self.logger.info(
            "DOWNLOAD",
            format!(
                "{package} {} ({}) from {} → {}",
                version.name,
                version.code,
                version.source,
                destination.display()
            ),
        );
        let mut observer = self.progress.observer(package, &version);
        let bytes = self
            .downloader
            .download(
                &url,
                &destination,
                version.size,
                headers,
                observer.as_mut(),
                &self.cancel,
            )
            .await?;

        Ok(vec![Row::Downloaded {
            package: package.to_string(),
            source: version.source,
            code: version.code,
            path: destination,
            bytes,
        }])
    }

    async fn list_developers(&self, task: &Task) -> Result<Vec<Row>> {
        let developers = self
            .catalog
            .get_developer_ids(&task.package, &self.cancel)
            .await?;
        Ok(developers
            .into_iter()
            .map(|(source, developer)| Row::Developer {
                package: task.package.clone(),
                source,
                developer,
            })
            .collect())
    }

    /// Snapshot the sink; tasks never claimed are reported as cancelled.
    fn report(&self) -> BatchReport {
        let mut sink = lock(&self.sink);
        for (index, task) in self.tasks.iter().enumerate() {
            if sink.states[index] != TaskState::Queued {
                continue;
            }
            let reason = ApkdError::Cancelled.to_string();
            sink.states[index].advance(TaskState::Failed);
            sink.errors[index] = Some(reason.clone());
            sink.rows.push(Row::Unavailable {
                package: task.package.clone(),
                reason,
            });
        }

        let mut rows = sink.rows.clone();
        rows.sort_by(compare_rows);
        let outcomes = self
            .tasks
            .iter()
            .enumerate()
            .map(|(index, task)| TaskOutcome {
                task: task.clone(),
                state: sink.states[index],
                error: sink.errors[index].clone(),
            })
            .collect();

        BatchReport {
            rows,
            outcomes,
            peak_in_flight: sink.peak_in_flight,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version_row(package: &str, source: &str, code: i64) -> Row {
        Row::Version {
            package: package.into(),
            source: SourceId::new(source),
            name: format!("v{code}"),
            code,
            update_date: None,
            size: 0,
        }
    }

    fn unavailable(package: &str) -> Row {
        Row::Unavailable {
            package: package.into(),
            reason: "not found".into(),
        }
    }

    #[test]
    fn rows_sort_resolved_first_then_package_then_code_desc() {
        let mut rows = vec![
            unavailable("a.first"),
            version_row("org.zeta", "A", 3),
            version_row("Org.Alpha", "B", 1),
            version_row("org.zeta", "B", 9),
            version_row("org.alpha", "A", 5),
        ];
        rows.sort_by(compare_rows);

        let keys: Vec<(String, Option<i64>)> = rows
            .iter()
            .map(|row| match row {
                Row::Version { package, code, .. } => (package.clone(), Some(*code)),
                other => (other.package().to_string(), None),
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                ("org.alpha".to_string(), Some(5)),
                ("Org.Alpha".to_string(), Some(1)),
                ("org.zeta".to_string(), Some(9)),
                ("org.zeta".to_string(), Some(3)),
                ("a.first".to_string(), None),
            ]
        );
    }

    #[test]
    fn developer_rows_sort_by_source() {
        let dev = |source: &str| Row::Developer {
            package: "org.example".into(),
            source: SourceId::new(source),
            developer: "acme".into(),
        };
        let mut rows = vec![dev("RuStore"), unavailable("org.example"), dev("Aptoide")];
        rows.sort_by(compare_rows);
        assert!(matches!(&rows[0], Row::Developer { source, .. } if source.as_str() == "Aptoide"));
        assert!(matches!(&rows[1], Row::Developer { source, .. } if source.as_str() == "RuStore"));
        assert!(!rows[2].is_resolved());
    }
}
