/*============================================================
  Project: apkd
  Module: apkd::sources::aptoide
  ------------------------------------------------------------
  Purpose:
    Query the Aptoide web service for a package's version
    history and resolve artifact links on demand.

  Security / Safety Notes:
    Performs read-only HTTPS requests to public endpoints.
    No credentials are transmitted.

  Dependencies:
    reqwest for HTTP, serde for response parsing.

  Operational Scope:
    Single instance registered when `[channels.aptoide]` is
    enabled.

  Revision History:
    2026-10-16  Implemented Aptoide source with deferred link
                resolution.
  ------------------------------------------------------------
  Principles Observed:
    - Listings never carry links; downloads ask for one
    - Versions limit applies to the newest entries
============================================================*/

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::app::{App, AppVersion, SourceId};
use crate::error::{ApkdError, Result};
use crate::source::{versions_limit_reached, Source};

use super::{normalize_date, send_with_retry, Payload};

pub const API_URL: &str = "https://ws75-cache.aptoide.com";
const NAME: &str = "Aptoide";

/// Source backed by the Aptoide web service.
pub struct Aptoide {
    id: SourceId,
    client: Client,
    api_url: String,
    max_retries: usize,
}

impl Aptoide {
    pub fn new(api_url: &str, client: Client, max_retries: usize) -> Self {
        Self {
            id: SourceId::new(NAME),
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            max_retries,
        }
    }

    fn get_app_url(&self) -> String {
        format!("{}/api/7/getApp", self.api_url)
    }

    /// `getApp` for `package`, optionally pinned to one version code.
    async fn get_app<T: DeserializeOwned>(
        &self,
        package: &str,
        code: Option<i64>,
    ) -> Result<Option<T>> {
        let url = self.get_app_url();
        let mut query = vec![("aab", "false".to_string()), ("package_name", package.to_string())];
        if let Some(code) = code {
            query.push(("vercode", code.to_string()));
        }
        let response = send_with_retry(NAME, &url, self.max_retries, || {
            self.client
                .get(&url)
                .headers(self.request_headers())
                .query(&query)
        })
        .await?;
        decode(response, &url).await
    }
}

#[async_trait]
impl Source for Aptoide {
    fn name(&self) -> &str {
        self.id.as_str()
    }

    fn id(&self) -> SourceId {
        self.id.clone()
    }

    async fn get_app_info(&self, package: &str, versions_limit: Option<usize>) -> Result<App> {
        let not_found = || ApkdError::AppNotFound {
            package: package.to_string(),
        };
        let nodes: HistoryNodes = self.get_app(package, None).await?.ok_or_else(not_found)?;

        let mut files: Vec<VersionFile> = nodes
            .versions
            .list
            .into_iter()
            .map(|entry| entry.file)
            .collect();
        files.sort_by(|a, b| b.vercode.cmp(&a.vercode));

        let mut versions = Vec::new();
        for file in files {
            if versions_limit_reached(versions.len(), versions_limit) {
                break;
            }
            let mut version =
                AppVersion::new(file.vername, file.vercode, file.filesize, self.id.clone());
            if let Some(date) = file.added.as_deref().and_then(normalize_date) {
                version = version.with_update_date(date);
            }
            versions.push(version);
        }
        if versions.is_empty() {
            return Err(not_found());
        }

        let mut app = App::new(package, self.id.clone());
        app.set_versions(versions);
        Ok(app)
    }

    async fn resolve_download_link(&self, package: &str, version: &AppVersion) -> Result<String> {
        if let Some(link) = &version.download_link {
            return Ok(link.clone());
        }
        let unavailable = |reason: &str| ApkdError::DownloadLinkUnavailable {
            package: package.to_string(),
            code: version.code,
            reason: reason.to_string(),
        };

        let nodes: MetaNodes = self
            .get_app(package, Some(version.code))
            .await?
            .ok_or_else(|| unavailable("version is not served"))?;
        let file = nodes.meta.data.file;
        if file.vercode != version.code {
            return Err(unavailable(&format!(
                "service answered with version {}",
                file.vercode
            )));
        }
        file.path
            .filter(|path| !path.is_empty())
            .ok_or_else(|| unavailable("service returned no artifact path"))
    }

    fn request_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers
    }
}

/// Unwrap `{ "info": { "status": ... }, "nodes": ... }`.
///
/// `Ok(None)` when the service reports anything but `OK` or answers 404.
async fn decode<T: DeserializeOwned>(response: Response, url: &str) -> Result<Option<T>> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let reply = response.json::<Reply<T>>().await.map_err(|err| {
        ApkdError::channel(NAME, format!("{url} answered {status} with undecodable body: {err}"))
    })?;
    if reply.info.status != "OK" {
        return Ok(None);
    }
    match reply.nodes {
        Some(Payload::Expected(nodes)) => Ok(Some(nodes)),
        _ => Err(ApkdError::channel(
            NAME,
            format!("{url} answered OK with an unexpected body"),
        )),
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Reply<T> {
    info: ReplyInfo,
    #[serde(default)]
    nodes: Option<Payload<T>>,
}

#[derive(Debug, Deserialize)]
struct ReplyInfo {
    status: String,
}

#[derive(Debug, Deserialize)]
struct HistoryNodes {
    versions: VersionList,
}

#[derive(Debug, Deserialize)]
struct VersionList {
    #[serde(default)]
    list: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    file: VersionFile,
}

#[derive(Debug, Deserialize)]
struct VersionFile {
    vername: String,
    vercode: i64,
    #[serde(default)]
    filesize: u64,
    added: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetaNodes {
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct Meta {
    data: MetaData,
}

#[derive(Debug, Deserialize)]
struct MetaData {
    file: VersionFile,
}
