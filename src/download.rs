/*============================================================
  Project: apkd
  Module: apkd::download
  ------------------------------------------------------------
  Purpose:
    Stream an artifact to disk in fixed-size chunks while
    reporting progress, honouring batch cancellation.

  Security / Safety Notes:
    Writes only to the destination chosen by the operator.
    Partial files are left in place on failure so that a later
    resume strategy can pick them up; callers decide whether to
    discard them.

  Dependencies:
    reqwest (stream feature) for the transfer, tokio for async
    file I/O, futures for stream combinators.

  Operational Scope:
    Invoked by task-runner workers once a version is resolved.

  Revision History:
    2026-09-06  Implemented streaming downloader.
    2026-09-22  Added cancellation at every chunk boundary.
    2026-10-16  Output directory failures are transfer failures.
  ------------------------------------------------------------
  Principles Observed:
    - Authoritative transport size overrides catalog estimates
    - Bounded memory: one chunk buffer per transfer
    - Handles released on every exit path
============================================================*/

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::catalog::cancellable;
use crate::error::{ApkdError, Result};
use crate::logger::Logger;

/// Bytes written per progress tick.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Receives progress events for one transfer.
///
/// Called synchronously on the downloading worker; implementations must
/// return quickly.
pub trait ProgressObserver: Send {
    /// Total expected bytes, after any transport override.
    fn on_start(&mut self, _total: u64) {}
    /// Bytes written so far.
    fn on_chunk(&mut self, _written: u64) {}
    /// Bytes written in total.
    fn on_end(&mut self, _written: u64) {}
}

/// Observer that ignores every event.
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// Streaming downloader shared by all workers.
pub struct Downloader {
    client: Client,
    logger: Arc<Logger>,
    chunk_size: usize,
}

impl Downloader {
    pub fn new(client: Client, logger: Arc<Logger>) -> Self {
        Self {
            client,
            logger,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Fetch `url` into `destination`, returning the bytes written.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        expected_size: u64,
        headers: HeaderMap,
        observer: &mut dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let request = self.client.get(url).headers(headers).send();
        let response = cancellable(cancel, async {
            request
                .await
                .map_err(|err| ApkdError::TransferFailed(format!("{url}: {err}")))
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApkdError::TransferFailed(format!(
                "{url} answered with status {status}"
            )));
        }

        let reported = response.content_length();
        self.logger.debug(
            "DOWNLOAD",
            format!(
                "{url} → {} (advisory={expected_size} reported={reported:?})",
                destination.display()
            ),
        );

        self.write_stream(
            response.bytes_stream(),
            reported,
            destination,
            expected_size,
            observer,
            cancel,
        )
        .await
    }

    /// Drain `stream` into `destination` using the chunking policy.
    ///
    /// `reported_size` is the transport's authoritative length, if any; it
    /// replaces `expected_size` before `on_start` fires.
    pub async fn write_stream<S, B, E>(
        &self,
        stream: S,
        reported_size: Option<u64>,
        destination: &Path,
        expected_size: u64,
        observer: &mut dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        let io_failure = |err: std::io::Error| {
            ApkdError::TransferFailed(format!("{}: {err}", destination.display()))
        };

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                ApkdError::TransferFailed(format!(
                    "Failed to create output directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let mut file = File::create(destination).await.map_err(io_failure)?;

        let total = reported_size.unwrap_or(expected_size);
        observer.on_start(total);

        let mut stream = std::pin::pin!(stream);
        let mut buffer: Vec<u8> = Vec::with_capacity(self.chunk_size);
        let mut written: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApkdError::Cancelled),
                item = stream.next() => item,
            };
            let Some(item) = next else { break };
            let bytes = item.map_err(|err| ApkdError::TransferFailed(err.to_string()))?;

            let mut data = bytes.as_ref();
            while !data.is_empty() {
                let take = (self.chunk_size - buffer.len()).min(data.len());
                buffer.extend_from_slice(&data[..take]);
                data = &data[take..];

                if buffer.len() == self.chunk_size {
                    if cancel.is_cancelled() {
                        return Err(ApkdError::Cancelled);
                    }
                    file.write_all(&buffer).await.map_err(io_failure)?;
                    written += buffer.len() as u64;
                    buffer.clear();
                    observer.on_chunk(written);
                }
            }
        }

        if !buffer.is_empty() {
            file.write_all(&buffer).await.map_err(io_failure)?;
            written += buffer.len() as u64;
            observer.on_chunk(written);
        }
        file.flush().await.map_err(io_failure)?;

        if let Some(reported) = reported_size.filter(|&reported| reported != written) {
            self.logger.warn(
                "DOWNLOAD",
                format!(
                    "{}: transport reported {reported} bytes, wrote {written}",
                    destination.display()
                ),
            );
        }
        observer.on_end(written);
        Ok(written)
    }
}
