/*============================================================
  Project: apkd
  Module: apkd::sources
  ------------------------------------------------------------
  Purpose:
    Explicit registry of distribution channels plus the HTTP
    plumbing (client construction, retry with backoff) that
    channel adapters share.

  Security / Safety Notes:
    Performs read-only HTTPS requests. No credentials are
    transmitted.

  Dependencies:
    reqwest for HTTP, tokio for backoff sleeps.

  Operational Scope:
    Invoked once at start-up to build the source table the
    catalog fans out over.

  Revision History:
    2026-09-04  Added source registry and retry helper.
    2026-10-16  Registered RuStore and Aptoide; retries now
                count on top of the first attempt.
  ------------------------------------------------------------
  Principles Observed:
    - Registry order is deterministic (configuration order)
    - Exponential backoff on transient failures
============================================================*/

pub mod aptoide;
pub mod fdroid;
pub mod rustore;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::IgnoredAny;
use serde::Deserialize;
use tokio::time::sleep;

use crate::config::{ApkdConfig, HttpConfig};
use crate::error::{ApkdError, Result};
use crate::source::Source;

use self::aptoide::Aptoide;
use self::fdroid::FDroidRepository;
use self::rustore::RuStore;

/// Build the shared HTTP client.
pub fn http_client(config: &HttpConfig) -> Result<Client> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout.max(1)))
        .user_agent(config.user_agent.clone());
    if config.timeout > 0 {
        builder = builder.timeout(Duration::from_secs(config.timeout));
    }
    builder
        .build()
        .map_err(|err| ApkdError::Network(format!("Failed to build HTTP client: {err}")))
}

/// Every channel known to this build: configured repositories in file
/// order, then the enabled store channels.
pub fn registry(config: &ApkdConfig, client: &Client) -> Vec<Arc<dyn Source>> {
    let retries = config.http.max_retries;
    let mut sources: Vec<Arc<dyn Source>> = config
        .repositories
        .iter()
        .map(|repo| {
            Arc::new(FDroidRepository::new(repo, client.clone(), retries)) as Arc<dyn Source>
        })
        .collect();

    let channels = &config.channels;
    if channels.rustore.enabled {
        let api_url = channels.rustore.api_url.as_deref().unwrap_or(rustore::API_URL);
        sources.push(Arc::new(RuStore::new(api_url, client.clone(), retries)));
    }
    if channels.aptoide.enabled {
        let api_url = channels.aptoide.api_url.as_deref().unwrap_or(aptoide::API_URL);
        sources.push(Arc::new(Aptoide::new(api_url, client.clone(), retries)));
    }
    sources
}

/// Keep only the sources named in `selected` (case-insensitive).
///
/// An empty selection keeps every source. Registry order is preserved so
/// that tie-breaks between sources stay deterministic.
pub fn select(sources: Vec<Arc<dyn Source>>, selected: &[String]) -> Result<Vec<Arc<dyn Source>>> {
    if selected.is_empty() {
        return Ok(sources);
    }
    for wanted in selected {
        if !sources
            .iter()
            .any(|source| source.name().eq_ignore_ascii_case(wanted))
        {
            let known: Vec<&str> = sources.iter().map(|source| source.name()).collect();
            return Err(ApkdError::Config(format!(
                "Unknown source `{wanted}`; available: {}",
                known.join(", ")
            )));
        }
    }
    Ok(sources
        .into_iter()
        .filter(|source| {
            selected
                .iter()
                .any(|wanted| source.name().eq_ignore_ascii_case(wanted))
        })
        .collect())
}

/// GET `url`, retrying transport errors and 5xx/429 responses.
///
/// Any other status is returned to the caller, which owns the decision of
/// what a 404 or 403 means for its channel.
pub(crate) async fn get_with_retry(
    client: &Client,
    source_name: &str,
    url: &str,
    headers: HeaderMap,
    max_retries: usize,
) -> Result<Response> {
    send_with_retry(source_name, url, max_retries, || {
        client.get(url).headers(headers.clone())
    })
    .await
}

/// Send the request built by `build`, retrying transient failures up to
/// `max_retries` times after the first attempt.
pub(crate) async fn send_with_retry<F>(
    source_name: &str,
    url: &str,
    max_retries: usize,
    build: F,
) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let failure = match build().send().await {
            Ok(response) if !is_transient(response.status()) => return Ok(response),
            Ok(response) => format!("status {}", response.status()),
            Err(err) => format!("request failed: {err}"),
        };

        attempt += 1;
        if attempt > max_retries {
            return Err(ApkdError::channel(
                source_name,
                format!("{url}: {failure} after {attempt} attempts"),
            ));
        }
        sleep(backoff(attempt)).await;
    }
}

/// Normalize a channel timestamp to `YYYY-MM-DD`.
///
/// Accepts RFC 3339, ISO-8601 with a compact offset, and naive
/// `YYYY-MM-DD HH:MM:SS`.
pub(crate) fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.format("%Y-%m-%d").to_string());
    }
    if let Ok(stamp) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(stamp.format("%Y-%m-%d").to_string());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|stamp| stamp.format("%Y-%m-%d").to_string())
}

/// Body of a channel envelope; error replies carry bodies of any shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Payload<T> {
    Expected(T),
    #[allow(dead_code)]
    Other(IgnoredAny),
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn backoff(attempt: usize) -> Duration {
    let exponent = (attempt as u32).min(6);
    Duration::from_millis(200_u64.saturating_mul(1_u64 << exponent))
}
