/*============================================================
  Project: apkd
  Module: apkd::catalog
  ------------------------------------------------------------
  Purpose:
    Fan a package out to every configured source, merge the
    answers, and apply the newest-version policy.

  Security / Safety Notes:
    No I/O of its own; delegates network access to sources.

  Dependencies:
    futures for concurrent fan-out, tokio-util for batch
    cancellation.

  Operational Scope:
    Shared by every task-runner worker; holds no mutable state.

  Revision History:
    2026-09-05  Authored catalog aggregation.
    2026-09-22  Threaded cancellation through source calls.
  ------------------------------------------------------------
  Principles Observed:
    - A single misbehaving channel never aborts a lookup
    - Deterministic tie-breaks follow source registration order
============================================================*/

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::app::{App, AppVersion, SourceId};
use crate::error::{ApkdError, Result};
use crate::logger::Logger;
use crate::source::Source;

/// Aggregation layer over the registered sources.
pub struct Catalog {
    sources: Vec<Arc<dyn Source>>,
    logger: Arc<Logger>,
}

impl Catalog {
    pub fn new(sources: Vec<Arc<dyn Source>>, logger: Arc<Logger>) -> Self {
        Self { sources, logger }
    }

    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    /// Resolve a source identity back to the registered source.
    pub fn source(&self, id: &SourceId) -> Option<&Arc<dyn Source>> {
        self.sources.iter().find(|source| source.name() == id.as_str())
    }

    /// Query every source for `package`; one App per answering source.
    pub async fn get_app_info(
        &self,
        package: &str,
        versions_limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Vec<App>> {
        let lookups = self.sources.iter().map(|source| {
            cancellable(cancel, source.get_app_info(package, versions_limit))
        });
        let outcomes = join_all(lookups).await;

        let mut apps = Vec::new();
        for (source, outcome) in self.sources.iter().zip(outcomes) {
            match outcome {
                Ok(app) if app.is_empty() => {
                    self.logger.debug(
                        "CATALOG",
                        format!("{} returned no versions for {package}", source.name()),
                    );
                }
                Ok(app) => apps.push(app),
                Err(err) => self.absorb(source.as_ref(), package, err)?,
            }
        }

        if apps.is_empty() {
            return Err(ApkdError::AppNotFound {
                package: package.to_string(),
            });
        }
        self.logger.debug(
            "CATALOG",
            format!("{package}: {} of {} sources answered", apps.len(), self.sources.len()),
        );
        Ok(apps)
    }

    /// Newest version among the first (newest) entry of each App.
    ///
    /// Ties go to the App that appears first.
    pub fn resolve_newest_version<'a>(package: &str, apps: &'a [App]) -> Result<&'a AppVersion> {
        let mut newest: Option<&AppVersion> = None;
        for candidate in apps.iter().filter_map(App::newest) {
            if newest.map_or(true, |current| candidate.code > current.code) {
                newest = Some(candidate);
            }
        }
        newest.ok_or_else(|| ApkdError::AppNotFound {
            package: package.to_string(),
        })
    }

    pub fn get_version_by_code(app: &App, code: i64) -> Result<&AppVersion> {
        app.version_by_code(code)
            .ok_or_else(|| ApkdError::VersionNotFound {
                package: app.package.clone(),
                code,
            })
    }

    /// First App, in source order, that carries `code`.
    pub fn find_version<'a>(package: &str, apps: &'a [App], code: i64) -> Result<&'a AppVersion> {
        apps.iter()
            .find_map(|app| app.version_by_code(code))
            .ok_or_else(|| ApkdError::VersionNotFound {
                package: package.to_string(),
                code,
            })
    }

    /// Materialize a download URL through the version's owning source.
    pub async fn resolve_download_link(
        &self,
        package: &str,
        version: &AppVersion,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let source = self.source(&version.source).ok_or_else(|| {
            ApkdError::Runtime(format!("Source `{}` is not registered", version.source))
        })?;
        cancellable(cancel, source.resolve_download_link(package, version)).await
    }

    /// Developer identities for `package`, one per source that knows it.
    pub async fn get_developer_ids(
        &self,
        package: &str,
        cancel: &CancellationToken,
    ) -> Result<BTreeSet<(SourceId, String)>> {
        let lookups = self
            .sources
            .iter()
            .map(|source| cancellable(cancel, source.get_developer_id(package)));
        let outcomes = join_all(lookups).await;

        let mut developers = BTreeSet::new();
        for (source, outcome) in self.sources.iter().zip(outcomes) {
            match outcome {
                Ok(Some(developer)) if !developer.is_empty() => {
                    developers.insert((source.id(), developer));
                }
                Ok(_) => {}
                Err(err) => self.absorb(source.as_ref(), package, err)?,
            }
        }

        if developers.is_empty() {
            return Err(ApkdError::AppNotFound {
                package: package.to_string(),
            });
        }
        Ok(developers)
    }

    /// Union of packages published by `developer_id` across sources.
    ///
    /// Only cancellation escapes; every per-source failure contributes
    /// nothing.
    pub async fn get_packages_from_developer(
        &self,
        developer_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BTreeSet<String>> {
        let lookups = self
            .sources
            .iter()
            .map(|source| cancellable(cancel, source.find_packages_from_developer(developer_id)));
        let outcomes = join_all(lookups).await;

        let mut packages = BTreeSet::new();
        for (source, outcome) in self.sources.iter().zip(outcomes) {
            match outcome {
                Ok(found) => packages.extend(found),
                Err(err) => self.absorb(source.as_ref(), developer_id, err)?,
            }
        }
        Ok(packages)
    }

    /// Swallow a per-source failure; only cancellation propagates.
    fn absorb(&self, source: &dyn Source, subject: &str, err: ApkdError) -> Result<()> {
        match err {
            ApkdError::Cancelled => Err(ApkdError::Cancelled),
            err if err.is_not_found() => {
                self.logger
                    .debug("SOURCE", format!("{}: {subject} not found", source.name()));
                Ok(())
            }
            err => {
                self.logger
                    .warn("SOURCE", format!("{} failed for {subject}: {err}", source.name()));
                Ok(())
            }
        }
    }
}

/// Race `operation` against the batch cancellation token.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApkdError::Cancelled),
        outcome = operation => outcome,
    }
}
