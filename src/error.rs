/*============================================================
  Project: apkd
  Module: apkd::error
  ------------------------------------------------------------
  Purpose:
    Centralise apkd error types to provide consistent
    diagnostics and exit semantics across the engine.

  Security / Safety Notes:
    Error contexts carry package names, version codes and
    source names only; request headers are never embedded.

  Dependencies:
    thiserror for ergonomic error definitions.

  Operational Scope:
    Used by sources, the catalog, the downloader and the task
    runner. Only the binary entry point converts errors into
    process exit codes.

  Revision History:
    2026-09-02  Established shared error definitions.
    2026-09-21  Split channel failures from not-found signals.
  ------------------------------------------------------------
  Principles Observed:
    - Explicit error taxonomy with actionable context
    - Per-channel failures never escalate past the catalog
    - Stable exit codes for operational tooling
============================================================*/

use std::io;
use std::process::ExitCode;

use thiserror::Error;

/// Result alias for apkd operations.
pub type Result<T> = std::result::Result<T, ApkdError>;

/// Enumerates the error domains surfaced by apkd.
#[derive(Debug, Error)]
pub enum ApkdError {
    #[error("Package `{package}` not found")]
    AppNotFound { package: String },
    #[error("Version {code} of `{package}` not found")]
    VersionNotFound { package: String, code: i64 },
    #[error("Developer `{developer}` not found")]
    DeveloperNotFound { developer: String },
    #[error("Source {source_name}: {message}")]
    Channel { source_name: String, message: String },
    #[error("No download link for `{package}` version {code}: {reason}")]
    DownloadLinkUnavailable {
        package: String,
        code: i64,
        reason: String,
    },
    #[error("Transfer failed: {0}")]
    TransferFailed(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Configuration: {0}")]
    Config(String),
    #[error("Network: {0}")]
    Network(String),
    #[error("Serialization: {0}")]
    Serialization(String),
    #[error("Filesystem: {0}")]
    Filesystem(String),
    #[error("Runtime: {0}")]
    Runtime(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ApkdError {
    /// Build a channel failure attributed to `source_name`.
    pub fn channel(source_name: &str, message: impl Into<String>) -> Self {
        ApkdError::Channel {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    /// True for the expected "absent from this channel" family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApkdError::AppNotFound { .. }
                | ApkdError::VersionNotFound { .. }
                | ApkdError::DeveloperNotFound { .. }
        )
    }

    /// Map error category to a deterministic exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ApkdError::AppNotFound { .. } => ExitCode::from(2),
            ApkdError::VersionNotFound { .. } => ExitCode::from(3),
            ApkdError::DeveloperNotFound { .. } => ExitCode::from(4),
            ApkdError::Config(_) => ExitCode::from(20),
            ApkdError::Channel { .. } => ExitCode::from(30),
            ApkdError::Network(_) => ExitCode::from(31),
            ApkdError::DownloadLinkUnavailable { .. } => ExitCode::from(32),
            ApkdError::TransferFailed(_) => ExitCode::from(33),
            ApkdError::Serialization(_) => ExitCode::from(34),
            ApkdError::Filesystem(_) => ExitCode::from(40),
            ApkdError::Io(_) => ExitCode::from(41),
            ApkdError::Runtime(_) => ExitCode::from(50),
            ApkdError::Cancelled => ExitCode::from(130),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_family_is_recognised() {
        assert!(ApkdError::AppNotFound {
            package: "org.example".into()
        }
        .is_not_found());
        assert!(ApkdError::DeveloperNotFound {
            developer: "acme".into()
        }
        .is_not_found());
        assert!(!ApkdError::channel("F-Droid", "bad gateway").is_not_found());
        assert!(!ApkdError::TransferFailed("reset".into()).is_not_found());
    }

    #[test]
    fn channel_error_names_its_source() {
        let err = ApkdError::channel("IzzyOnDroid", "status 502");
        assert_eq!(err.to_string(), "Source IzzyOnDroid: status 502");
    }
}
