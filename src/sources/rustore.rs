/*============================================================
  Project: apkd
  Module: apkd::sources::rustore
  ------------------------------------------------------------
  Purpose:
    Query the RuStore storefront API for the published release
    of a package, its artifact link, and the developer that
    owns it.

  Security / Safety Notes:
    Performs HTTPS requests to public storefront endpoints.
    Sends a fixed device profile; no account credentials.

  Dependencies:
    reqwest for HTTP, serde for request/response bodies,
    urlencoding for path segments.

  Operational Scope:
    Single instance registered when `[channels.rustore]` is
    enabled.

  Revision History:
    2026-10-16  Implemented RuStore source with developer
                lookups.
  ------------------------------------------------------------
  Principles Observed:
    - A non-`OK` envelope code is the channel's not-found signal
    - Artifact links are re-requested when the listing had none
============================================================*/

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use urlencoding::encode;

use crate::app::{App, AppVersion, SourceId};
use crate::error::{ApkdError, Result};
use crate::source::Source;

use super::{get_with_retry, normalize_date, send_with_retry, Payload};

pub const API_URL: &str = "https://backapi.rustore.ru";
const NAME: &str = "RuStore";

const DEVICE_PROFILE: [(&str, &str); 6] = [
    ("deviceid", "9189138868050a43-1462194045"),
    ("devicemodel", "samsung SM-S908E"),
    ("firmwarever", "11"),
    ("firmwarelang", "ru"),
    ("rustorevercode", "247"),
    ("devicetype", "mobile"),
];

/// Source backed by the RuStore storefront.
pub struct RuStore {
    id: SourceId,
    client: Client,
    api_url: String,
    max_retries: usize,
}

impl RuStore {
    pub fn new(api_url: &str, client: Client, max_retries: usize) -> Self {
        Self {
            id: SourceId::new(NAME),
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            max_retries,
        }
    }

    fn overall_info_url(&self, package: &str) -> String {
        format!("{}/applicationData/overallInfo/{}", self.api_url, encode(package))
    }

    fn download_link_url(&self) -> String {
        format!("{}/applicationData/v2/download-link", self.api_url)
    }

    fn developer_apps_url(&self, developer_id: &str) -> String {
        format!(
            "{}/applicationData/devs/{}/apps?limit=999999",
            self.api_url,
            encode(developer_id)
        )
    }

    async fn overall_info(&self, package: &str) -> Result<Option<OverallInfo>> {
        let url = self.overall_info_url(package);
        let response =
            get_with_retry(&self.client, NAME, &url, self.request_headers(), self.max_retries)
                .await?;
        decode(response, &url).await
    }

    async fn download_link(&self, app_id: i64) -> Result<Option<DownloadUrl>> {
        let url = self.download_link_url();
        let request = DownloadLinkRequest::for_app(app_id);
        let response = send_with_retry(NAME, &url, self.max_retries, || {
            self.client
                .post(&url)
                .headers(self.request_headers())
                .json(&request)
        })
        .await?;
        let links: Option<DownloadLinks> = decode(response, &url).await?;
        Ok(links.and_then(|links| links.download_urls.into_iter().next()))
    }
}

#[async_trait]
impl Source for RuStore {
    fn name(&self) -> &str {
        self.id.as_str()
    }

    fn id(&self) -> SourceId {
        self.id.clone()
    }

    /// The storefront only serves its current release, so the result holds
    /// at most one version whatever the limit.
    async fn get_app_info(&self, package: &str, _versions_limit: Option<usize>) -> Result<App> {
        let info = self
            .overall_info(package)
            .await?
            .ok_or_else(|| ApkdError::AppNotFound {
                package: package.to_string(),
            })?;

        let name = info
            .version_name
            .split_once("-rustore")
            .map_or(info.version_name.as_str(), |(head, _)| head);
        let mut version = AppVersion::new(name, info.version_code, 0, self.id.clone());
        if let Some(date) = info.app_ver_updated_at.as_deref().and_then(normalize_date) {
            version = version.with_update_date(date);
        }
        if let Some(link) = self.download_link(info.app_id).await? {
            version.size = link.size;
            version = version.with_download_link(link.url);
        }

        let package_name = info.package_name.unwrap_or_else(|| package.to_string());
        let mut app = App::new(package_name, self.id.clone());
        app.set_versions(vec![version]);
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

        let info = self
            .overall_info(package)
            .await?
            .ok_or_else(|| unavailable("package is no longer listed"))?;
        if info.version_code != version.code {
            return Err(unavailable(&format!(
                "storefront now serves version {}",
                info.version_code
            )));
        }
        self.download_link(info.app_id)
            .await?
            .map(|link| link.url)
            .ok_or_else(|| unavailable("storefront refused to issue a link"))
    }

    async fn get_developer_id(&self, package: &str) -> Result<Option<String>> {
        let info = self
            .overall_info(package)
            .await?
            .ok_or_else(|| ApkdError::AppNotFound {
                package: package.to_string(),
            })?;
        Ok(info.public_company_id)
    }

    async fn find_packages_from_developer(&self, developer_id: &str) -> Result<BTreeSet<String>> {
        let url = self.developer_apps_url(developer_id);
        let response =
            get_with_retry(&self.client, NAME, &url, self.request_headers(), self.max_retries)
                .await?;
        let apps: DeveloperApps = decode(response, &url).await?.ok_or_else(|| {
            ApkdError::DeveloperNotFound {
                developer: developer_id.to_string(),
            }
        })?;
        Ok(apps
            .elements
            .into_iter()
            .map(|app| app.package_name)
            .collect())
    }

    fn request_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        for (name, value) in DEVICE_PROFILE {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        headers
    }
}

/// Unwrap the storefront's `{ "code": ..., "body": ... }` envelope.
///
/// `Ok(None)` is the not-found signal: HTTP 404 or any code but `OK`.
async fn decode<T: DeserializeOwned>(response: Response, url: &str) -> Result<Option<T>> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let envelope = response.json::<Envelope<T>>().await.map_err(|err| {
        ApkdError::channel(NAME, format!("{url} answered {status} with undecodable body: {err}"))
    })?;
    if envelope.code != "OK" {
        return Ok(None);
    }
    match envelope.body {
        Some(Payload::Expected(body)) => Ok(Some(body)),
        _ => Err(ApkdError::channel(
            NAME,
            format!("{url} answered OK with an unexpected body"),
        )),
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    body: Option<Payload<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverallInfo {
    app_id: i64,
    package_name: Option<String>,
    version_name: String,
    version_code: i64,
    app_ver_updated_at: Option<String>,
    public_company_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadLinks {
    #[serde(default)]
    download_urls: Vec<DownloadUrl>,
}

#[derive(Debug, Deserialize)]
struct DownloadUrl {
    url: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct DeveloperApps {
    #[serde(default)]
    elements: Vec<DeveloperApp>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeveloperApp {
    package_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadLinkRequest {
    app_id: i64,
    first_install: bool,
    mobile_services: &'static [&'static str],
    supported_abis: &'static [&'static str],
    screen_density: u32,
    supported_locales: &'static [&'static str],
    sdk_version: u32,
    without_splits: bool,
    signature_fingerprint: Option<String>,
}

impl DownloadLinkRequest {
    fn for_app(app_id: i64) -> Self {
        Self {
            app_id,
            first_install: true,
            mobile_services: &["GMS"],
            supported_abis: &["x86_64", "x86", "arm64-v8a", "armeabi-v7a", "armeabi"],
            screen_density: 240,
            supported_locales: &["en_US"],
            sdk_version: 30,
            without_splits: true,
            signature_fingerprint: None,
        }
    }
}
