//! Configuration management for claimaudit.
//!
//! Settings come from an optional TOML file, then `.env`, then environment
//! variables. Every field has a default, so an empty or missing file is a
//! valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intake::DEFAULT_MAX_UPLOAD_BYTES;
use crate::llm::LlmConfig;
use crate::pipeline::RetryPolicy;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILENAME: &str = "claimaudit.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

/// OCR settings for the rasterize + Tesseract fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Tesseract language code(s), e.g. "eng" or "eng+hin".
    pub language: String,
    /// Rasterization resolution.
    pub dpi: u32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            dpi: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 5,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.base_delay_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root of the claim records, blobs and policy wording.
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        // ~/.local/share/claimaudit, falling back to the home dir, then cwd
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("claimaudit");
        Self { data_dir }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Claims processed concurrently by the dispatcher.
    pub max_in_flight: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self { max_in_flight: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeSettings {
    pub max_upload_bytes: usize,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmConfig,
    pub ocr: OcrSettings,
    pub retry: RetrySettings,
    pub storage: StorageSettings,
    pub worker: WorkerSettings,
    pub intake: IntakeSettings,
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file. Unlike the default file, it must exist.
    pub config_path: Option<PathBuf>,
    /// Overrides the configured data directory.
    pub data_dir: Option<PathBuf>,
}

impl Settings {
    /// Parse settings from TOML. Relative `data_dir` values resolve against
    /// `base_dir`.
    pub fn from_toml(content: &str, base_dir: &Path) -> Result<Self, toml::de::Error> {
        let mut settings: Settings = toml::from_str(content)?;
        settings.storage.data_dir = resolve_path(&settings.storage.data_dir, base_dir);
        Ok(settings)
    }

    /// Read a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_toml(&content, &base_dir).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment variable overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`.
    ///
    /// Supported variables, besides the `LLM_*` ones handled by
    /// [`LlmConfig::with_overrides_from`]: `OCR_LANGUAGE`, `OCR_DPI`,
    /// `CLAIM_MAX_RETRIES`, `CLAIM_RETRY_BASE_DELAY_SECS`, `CLAIM_DATA_DIR`,
    /// `CLAIM_MAX_IN_FLIGHT`.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.llm = self.llm.with_overrides_from(&lookup);

        if let Some(val) = lookup("OCR_LANGUAGE") {
            self.ocr.language = val;
        }
        if let Some(dpi) = parse_env(&lookup, "OCR_DPI")? {
            self.ocr.dpi = dpi;
        }
        if let Some(n) = parse_env(&lookup, "CLAIM_MAX_RETRIES")? {
            self.retry.max_retries = n;
        }
        if let Some(secs) = parse_env(&lookup, "CLAIM_RETRY_BASE_DELAY_SECS")? {
            self.retry.base_delay_secs = secs;
        }
        if let Some(dir) = lookup("CLAIM_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(shellexpand::tilde(&dir).as_ref());
        }
        if let Some(n) = parse_env(&lookup, "CLAIM_MAX_IN_FLIGHT")? {
            self.worker.max_in_flight = n;
        }
        Ok(self)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }
}

/// Load settings: config file, then `.env`, then environment, then CLI
/// overrides.
pub fn load_settings(options: &LoadOptions) -> Result<Settings, ConfigError> {
    let settings = match &options.config_path {
        Some(path) => Settings::from_file(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILENAME);
            if default_path.exists() {
                Settings::from_file(default_path)?
            } else {
                Settings::default()
            }
        }
    };

    let _ = dotenvy::dotenv();
    let mut settings = settings.with_env_overrides()?;

    if let Some(dir) = &options.data_dir {
        settings.storage.data_dir = resolve_path(dir, Path::new("."));
    }
    Ok(settings)
}

/// Expand `~` and resolve relative paths against `base_dir`.
fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::tilde(raw.as_ref());
    let expanded = Path::new(expanded.as_ref());
    if expanded.is_absolute() {
        expanded.to_path_buf()
    } else {
        base_dir.join(expanded)
    }
}

fn parse_env<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value,
            }),
    }
}
