/*============================================================
  Project: apkd
  Module: apkd::app
  ------------------------------------------------------------
  Purpose:
    Shared structures describing the versions a distribution
    channel reports for one package.

  Security / Safety Notes:
    Pure data container; no I/O performed in this module.

  Dependencies:
    None beyond std.

  Operational Scope:
    Produced by sources, merged by the catalog, consumed by the
    task runner and downloader.

  Revision History:
    2026-09-02  Introduced App / AppVersion model.
  ------------------------------------------------------------
  Principles Observed:
    - Versions are kept sorted newest-first at all times
    - Sources are referenced by identity, never owned
============================================================*/

use std::fmt;
use std::sync::Arc;

/// Non-owning identity of a registered source.
///
/// Resolved back to the source through the catalog's registry table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Arc<str>);

impl SourceId {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One downloadable release as reported by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppVersion {
    pub name: String,
    pub code: i64,
    /// Advisory; superseded by `Content-Length` at download time.
    pub size: u64,
    /// `YYYY-MM-DD` when the source exposes it.
    pub update_date: Option<String>,
    pub download_link: Option<String>,
    pub source: SourceId,
}

impl AppVersion {
    pub fn new(name: impl Into<String>, code: i64, size: u64, source: SourceId) -> Self {
        Self {
            name: name.into(),
            code,
            size,
            update_date: None,
            download_link: None,
            source,
        }
    }

    pub fn with_update_date(mut self, date: impl Into<String>) -> Self {
        self.update_date = Some(date.into());
        self
    }

    pub fn with_download_link(mut self, link: impl Into<String>) -> Self {
        self.download_link = Some(link.into());
        self
    }

    /// Default artifact file name, `{package}_{code}.apk`.
    pub fn file_name(&self, package: &str) -> String {
        format!("{package}_{}.apk", self.code)
    }
}

/// Every version one source returned for one package.
#[derive(Debug, Clone)]
pub struct App {
    pub package: String,
    pub source: SourceId,
    versions: Vec<AppVersion>,
}

impl App {
    pub fn new(package: impl Into<String>, source: SourceId) -> Self {
        Self {
            package: package.into(),
            source,
            versions: Vec::new(),
        }
    }

    /// Replace all versions, restoring newest-first order.
    ///
    /// The sort is stable, so duplicated codes keep their reported order.
    pub fn set_versions(&mut self, mut versions: Vec<AppVersion>) {
        versions.sort_by(|a, b| b.code.cmp(&a.code));
        self.versions = versions;
    }

    pub fn versions(&self) -> &[AppVersion] {
        &self.versions
    }

    pub fn newest(&self) -> Option<&AppVersion> {
        self.versions.first()
    }

    pub fn version_by_code(&self, code: i64) -> Option<&AppVersion> {
        self.versions.iter().find(|version| version.code == code)
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
