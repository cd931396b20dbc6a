/*============================================================
  Project: apkd
  Module: apkd::config
  ------------------------------------------------------------
  Purpose:
    Load operator configuration (worker count, output and log
    locations, HTTP behaviour, repository endpoints) from an
    optional TOML file with compiled-in defaults.

  Security / Safety Notes:
    Configuration is read-only input; no secrets are expected
    and none are written back.

  Dependencies:
    serde + toml for parsing, dirs for platform locations.

  Operational Scope:
    Consulted once at start-up by the binary; CLI flags take
    precedence over file values.

  Revision History:
    2026-09-03  Introduced configuration layer.
    2026-10-16  Added store channel toggles and endpoints.
  ------------------------------------------------------------
  Principles Observed:
    - Deterministic defaults when no file is present
    - Validation before any network activity
============================================================*/

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ApkdError, Result};

pub const DEFAULT_CONCURRENCY: usize = 3;

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApkdConfig {
    pub general: GeneralConfig,
    pub http: HttpConfig,
    pub repositories: Vec<RepositoryConfig>,
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub concurrency: usize,
    pub output_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

/// Behaviour of the shared HTTP client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds; `0` disables it (long downloads).
    pub timeout: u64,
    pub connect_timeout: u64,
    pub user_agent: String,
    /// Retries after the first attempt on transient failures.
    pub max_retries: usize,
}

/// One F-Droid compatible repository.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub name: String,
    /// Host serving `/api/v1/packages/{package}`.
    pub api_url: String,
    /// Directory serving `{package}_{code}.apk` artifacts.
    pub repo_url: String,
}

/// Store channels with a fixed protocol (`[channels.rustore]`,
/// `[channels.aptoide]`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub rustore: ChannelConfig,
    pub aptoide: ChannelConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub enabled: bool,
    /// Override of the channel's public API host.
    pub api_url: Option<String>,
}

impl Default for ApkdConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            http: HttpConfig::default(),
            repositories: default_repositories(),
            channels: ChannelsConfig::default(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: None,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            output_dir: None,
            log_dir: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: 0,
            connect_timeout: 15,
            user_agent: format!("apkd/{} (linux)", env!("CARGO_PKG_VERSION")),
            max_retries: 3,
        }
    }
}

fn default_repositories() -> Vec<RepositoryConfig> {
    vec![
        RepositoryConfig {
            name: "F-Droid".into(),
            api_url: "https://f-droid.org".into(),
            repo_url: "https://f-droid.org/repo".into(),
        },
        RepositoryConfig {
            name: "IzzyOnDroid".into(),
            api_url: "https://apt.izzysoft.de/fdroid".into(),
            repo_url: "https://apt.izzysoft.de/fdroid/repo".into(),
        },
    ]
}

impl ApkdConfig {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load_from_optional_path(path: Option<&Path>) -> Result<Self> {
        let (candidate, explicit) = match path {
            Some(path) => (Some(path.to_path_buf()), true),
            None => (default_config_path(), false),
        };

        let config = match candidate {
            Some(file) if file.exists() => Self::load(&file)?,
            Some(file) if explicit => {
                return Err(ApkdError::Config(format!(
                    "Configuration file {} does not exist",
                    file.display()
                )))
            }
            _ => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ApkdError::Config(format!("Failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml(&raw)
            .map_err(|err| ApkdError::Config(format!("{}: {err}", path.display())))
    }

    /// Parse a TOML document without touching the filesystem.
    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.concurrency == 0 {
            return Err(ApkdError::Config("general.concurrency must be at least 1".into()));
        }
        let mut seen: HashSet<String> = ["rustore", "aptoide"]
            .into_iter()
            .map(String::from)
            .collect();
        for repo in &self.repositories {
            if repo.name.trim().is_empty() {
                return Err(ApkdError::Config("repository name must not be empty".into()));
            }
            if !seen.insert(repo.name.to_ascii_lowercase()) {
                return Err(ApkdError::Config(format!(
                    "repository name `{}` is already in use",
                    repo.name
                )));
            }
        }
        Ok(())
    }

    /// Directory receiving downloaded artifacts.
    pub fn output_dir(&self) -> PathBuf {
        self.general
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Directory receiving session logs.
    pub fn log_dir(&self) -> PathBuf {
        self.general.log_dir.clone().unwrap_or_else(|| {
            dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .unwrap_or_else(std::env::temp_dir)
                .join("apkd")
                .join("logs")
        })
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("apkd").join("config.toml"))
}
