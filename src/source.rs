/*============================================================
  Project: apkd
  Module: apkd::source
  ------------------------------------------------------------
  Purpose:
    Define the contract every distribution channel implements:
    version lookup, download link resolution and the optional
    developer queries.

  Security / Safety Notes:
    Implementations perform network I/O only and must be safe
    to call concurrently for different packages.

  Dependencies:
    async-trait for object-safe async methods, reqwest for the
    header map type.

  Operational Scope:
    Consumed exclusively through the catalog.

  Revision History:
    2026-09-02  Introduced Source trait.
  ------------------------------------------------------------
  Principles Observed:
    - Optional capabilities default to "nothing known"
    - Not-found is a signal, not a failure
============================================================*/

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::app::{App, AppVersion, SourceId};
use crate::error::{ApkdError, Result};

/// A distribution channel able to describe and serve packages.
#[async_trait]
pub trait Source: Send + Sync {
    /// Registered, unique name of this channel.
    fn name(&self) -> &str;

    fn id(&self) -> SourceId {
        SourceId::new(self.name())
    }

    /// Look up every version of `package`, newest first.
    ///
    /// `versions_limit` caps how many versions are materialized; sources
    /// stop scanning once the cap is reached. Fails with
    /// [`ApkdError::AppNotFound`] when the channel does not carry the package.
    async fn get_app_info(&self, package: &str, versions_limit: Option<usize>) -> Result<App>;

    /// Produce a usable URL for `version`.
    async fn resolve_download_link(&self, package: &str, version: &AppVersion) -> Result<String> {
        version
            .download_link
            .clone()
            .ok_or_else(|| ApkdError::DownloadLinkUnavailable {
                package: package.to_string(),
                code: version.code,
                reason: format!("{} reported no link", self.name()),
            })
    }

    async fn get_developer_id(&self, _package: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn find_packages_from_developer(&self, _developer_id: &str) -> Result<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }

    /// Headers the downloader must send when fetching this channel's artifacts.
    fn request_headers(&self) -> HeaderMap {
        HeaderMap::new()
    }
}

/// True once `collected` versions satisfy `limit`.
pub fn versions_limit_reached(collected: usize, limit: Option<usize>) -> bool {
    limit.is_some_and(|limit| collected >= limit)
}
