/*============================================================
  Project: apkd
  Module: apkd::sources::fdroid
  ------------------------------------------------------------
  Purpose:
    Query an F-Droid compatible repository's package API for
    the versions it publishes and derive artifact URLs.

  Security / Safety Notes:
    Performs read-only HTTPS requests to public repository
    endpoints. No credentials are transmitted.

  Dependencies:
    reqwest for HTTP, serde for response parsing, urlencoding
    for path segments.

  Operational Scope:
    One instance per configured repository (f-droid.org,
    IzzyOnDroid, self-hosted mirrors).

  Revision History:
    2026-09-04  Implemented F-Droid repository source.
    2026-10-16  Versions limit applies to the newest entries.
  ------------------------------------------------------------
  Principles Observed:
    - HTTP 404 is the channel's not-found signal
    - Version scan stops at the requested limit, newest first
============================================================*/

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use urlencoding::encode;

use crate::app::{App, AppVersion, SourceId};
use crate::config::RepositoryConfig;
use crate::error::{ApkdError, Result};
use crate::source::{versions_limit_reached, Source};

use super::get_with_retry;

/// Source backed by an F-Droid repository.
pub struct FDroidRepository {
    id: SourceId,
    client: Client,
    api_url: String,
    repo_url: String,
    max_retries: usize,
}

impl FDroidRepository {
    pub fn new(config: &RepositoryConfig, client: Client, max_retries: usize) -> Self {
        Self {
            id: SourceId::new(&config.name),
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            repo_url: config.repo_url.trim_end_matches('/').to_string(),
            max_retries,
        }
    }

    fn package_url(&self, package: &str) -> String {
        format!("{}/api/v1/packages/{}", self.api_url, encode(package))
    }

    fn artifact_url(&self, package: &str, code: i64) -> String {
        format!("{}/{}_{code}.apk", self.repo_url, encode(package))
    }
}

#[async_trait]
impl Source for FDroidRepository {
    fn name(&self) -> &str {
        self.id.as_str()
    }

    fn id(&self) -> SourceId {
        self.id.clone()
    }

    async fn get_app_info(&self, package: &str, versions_limit: Option<usize>) -> Result<App> {
        let url = self.package_url(package);
        let response =
            get_with_retry(&self.client, self.name(), &url, self.request_headers(), self.max_retries)
                .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(ApkdError::AppNotFound {
                    package: package.to_string(),
                })
            }
            status => {
                return Err(ApkdError::channel(
                    self.name(),
                    format!("{url} answered with status {status}"),
                ))
            }
        }

        let mut payload = response.json::<PackageResponse>().await.map_err(|err| {
            ApkdError::channel(self.name(), format!("Failed to decode {url}: {err}"))
        })?;

        // The index lists builds in publication order, not by code.
        payload
            .packages
            .sort_by(|a, b| b.version_code.cmp(&a.version_code));
        let mut versions = Vec::new();
        for entry in payload.packages {
            if versions_limit_reached(versions.len(), versions_limit) {
                break;
            }
            let link = self.artifact_url(&payload.package_name, entry.version_code);
            versions.push(
                AppVersion::new(entry.version_name, entry.version_code, 0, self.id.clone())
                    .with_download_link(link),
            );
        }

        if versions.is_empty() {
            return Err(ApkdError::AppNotFound {
                package: package.to_string(),
            });
        }

        let mut app = App::new(payload.package_name, self.id.clone());
        app.set_versions(versions);
        Ok(app)
    }

    fn request_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageResponse {
    package_name: String,
    #[allow(dead_code)]
    suggested_version_code: Option<i64>,
    #[serde(default)]
    packages: Vec<PackageEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageEntry {
    version_name: String,
    version_code: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository(base: &str) -> FDroidRepository {
        let config = RepositoryConfig {
            name: "Mirror".into(),
            api_url: format!("{base}/"),
            repo_url: format!("{base}/repo/"),
        };
        FDroidRepository::new(&config, Client::new(), 1)
    }

    #[test]
    fn urls_trim_trailing_slashes() {
        let repo = repository("https://mirror.example");
        assert_eq!(
            repo.package_url("org.example.app"),
            "https://mirror.example/api/v1/packages/org.example.app"
        );
        assert_eq!(
            repo.artifact_url("org.example.app", 42),
            "https://mirror.example/repo/org.example.app_42.apk"
        );
    }
}
