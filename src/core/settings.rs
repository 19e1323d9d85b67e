use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("update_interval_secs must be greater than zero")]
    ZeroInterval,

    #[error("registry.scope must not be empty")]
    EmptyScope,

    #[error("registry.server_uri must not be empty")]
    EmptyServerUri,

    #[error("retry.base_delay_secs must be between 1 and update_interval_secs ({interval}), got {base}")]
    RetryDelayOutOfRange { base: u64, interval: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub update_interval_secs: u64,
    pub shutdown: ShutdownMode,
    /// How often `serve` logs the progress of an in-flight build.
    pub progress_log_secs: u64,
    pub registry: RegistrySettings,
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            update_interval_secs: 600,
            shutdown: ShutdownMode::default(),
            progress_log_secs: 10,
            registry: RegistrySettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

/// What happens to a build that is still running when shutdown is requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// Let the build finish and publish it if good, then stop.
    #[default]
    Drain,
    /// Drop the build immediately; it is never published.
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub package_folder: PathBuf,
    pub server_uri: String,
    pub scope: String,
    pub package_name_postfix: String,
    pub minimum_unity_version: String,
    pub target_frameworks: Vec<String>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            package_folder: PathBuf::from("packages"),
            server_uri: "http://localhost:5000".to_string(),
            scope: "org.nuget".to_string(),
            package_name_postfix: " (NuGet)".to_string(),
            minimum_unity_version: "2019.1".to_string(),
            target_frameworks: vec!["netstandard2.1".to_string(), "netstandard2.0".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub enabled: bool,
    pub base_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_delay_secs: 30,
        }
    }
}

/// Inputs handed to the catalog builder on every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildParameters {
    pub package_folder: PathBuf,
    pub server_uri: String,
    pub scope: String,
    pub display_postfix: String,
    pub minimum_unity_version: String,
    pub target_frameworks: Vec<String>,
}

impl From<&RegistrySettings> for BuildParameters {
    fn from(registry: &RegistrySettings) -> Self {
        Self {
            package_folder: registry.package_folder.clone(),
            server_uri: registry.server_uri.trim_end_matches('/').to_string(),
            scope: registry.scope.clone(),
            display_postfix: registry.package_name_postfix.clone(),
            minimum_unity_version: registry.minimum_unity_version.clone(),
            target_frameworks: registry.target_frameworks.clone(),
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("registry-cache").join("config.toml"))
    }

    /// Loads from `path`, or from the default config location when `None`.
    ///
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::config_path().context("Could not determine config directory")?;
                if !path.exists() {
                    tracing::info!(?path, "Config file not found, using defaults");
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        settings
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        tracing::info!(?path, "Loaded config");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.update_interval_secs == 0 {
            return Err(SettingsError::ZeroInterval);
        }
        if self.registry.scope.trim().is_empty() {
            return Err(SettingsError::EmptyScope);
        }
        if self.registry.server_uri.trim().is_empty() {
            return Err(SettingsError::EmptyServerUri);
        }
        if self.retry.enabled
            && (self.retry.base_delay_secs == 0
                || self.retry.base_delay_secs > self.update_interval_secs)
        {
            return Err(SettingsError::RetryDelayOutOfRange {
                base: self.retry.base_delay_secs,
                interval: self.update_interval_secs,
            });
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn progress_log_interval(&self) -> Duration {
        Duration::from_secs(self.progress_log_secs.max(1))
    }

    pub fn retry_base_delay(&self) -> Option<Duration> {
        self.retry
            .enabled
            .then(|| Duration::from_secs(self.retry.base_delay_secs))
    }

    pub fn build_parameters(&self) -> BuildParameters {
        BuildParameters::from(&self.registry)
    }
}
