/*============================================================
  Project: apkd
  Module: apkd (library root)
  ------------------------------------------------------------
  Purpose:
    Source-aggregation and download-orchestration engine for
    Android application packages: sources, catalog, streaming
    downloader and the concurrent batch runner.

  Security / Safety Notes:
    Operates within user privileges; performs HTTPS requests
    and writes artifacts to operator-chosen paths only.

  Dependencies:
    tokio runtime, reqwest transport, thiserror taxonomy.

  Operational Scope:
    Linked by the `apkd` binary and by integration tests.

  Revision History:
    2026-09-02  Established library layout.
  ------------------------------------------------------------
  Principles Observed:
    - Explicitly constructed logging context, no globals
    - Per-channel failures stay inside the catalog
============================================================*/

pub mod app;
pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod logger;
pub mod render;
pub mod runner;
pub mod source;
pub mod sources;
pub mod task;

pub use app::{App, AppVersion, SourceId};
pub use catalog::Catalog;
pub use config::ApkdConfig;
pub use download::{Downloader, NoProgress, ProgressObserver, CHUNK_SIZE};
pub use error::{ApkdError, Result};
pub use logger::Logger;
pub use runner::{BatchReport, Operation, OutputTarget, ProgressFactory, Row, TaskRunner};
pub use source::Source;
pub use task::{Task, TaskState};
