use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

pub const ENV_PREFIX: &str = "SAMPLE_UPLOADER_";
pub const DEFAULT_BASE_URL: &str = "https://czid.org";
pub const DEFAULT_TRANSFER_REGION: &str = "us-west-2";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub transfer_endpoint: Option<String>,
    #[serde(default)]
    pub transfer_region: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub transfer_endpoint: String,
    pub transfer_region: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("transfer_endpoint", &self.transfer_endpoint)
            .field("transfer_region", &self.transfer_region)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the config file (explicit path, else the default location) and
    /// applies `SAMPLE_UPLOADER_*` environment overrides.
    pub fn resolve(path: Option<&str>) -> Result<PlatformConfig, UploadError> {
        let config = match path {
            Some(path) => Self::read(PathBuf::from(path))?,
            None => match default_config_path() {
                Some(path) if path.as_std_path().exists() => Self::read(path.into_std_path_buf())?,
                _ => {
                    tracing::debug!("no config file found, using defaults and environment");
                    Config::default()
                }
            },
        };
        Ok(Self::resolve_config(config, |name| {
            std::env::var(format!("{ENV_PREFIX}{name}")).ok()
        }))
    }

    fn read(path: PathBuf) -> Result<Config, UploadError> {
        let content = fs::read_to_string(&path).map_err(|_| UploadError::ConfigRead(path.clone()))?;
        serde_json::from_str(&content).map_err(|err| UploadError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config<F>(config: Config, env: F) -> PlatformConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| env(name).filter(|value| !value.trim().is_empty());
        let transfer_region = env("TRANSFER_REGION")
            .or(config.transfer_region)
            .unwrap_or_else(|| DEFAULT_TRANSFER_REGION.to_string());
        PlatformConfig {
            base_url: env("BASE_URL")
                .or(config.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            token: env("TOKEN").or(config.token),
            transfer_endpoint: env("TRANSFER_ENDPOINT")
                .or(config.transfer_endpoint)
                .unwrap_or_else(|| regional_endpoint(&transfer_region)),
            transfer_region,
            timeout_secs: config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Path-style S3 endpoint serving buckets in `region`.
pub fn regional_endpoint(region: &str) -> String {
    format!("https://s3.{region}.amazonaws.com")
}

pub fn default_config_path() -> Option<Utf8PathBuf> {
    ProjectDirs::from("org", "czid", "sample-uploader").and_then(|dirs| {
        Utf8PathBuf::from_path_buf(dirs.config_dir().join("config.json")).ok()
    })
}
