use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    backend: BackendConfig,
    storage: StorageConfig,
    #[serde(default)]
    stream: StreamConfig,
    #[serde(default)]
    http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct BackendConfig {
    url: String,
    reviews_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StorageConfig {
    data_dir: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StreamConfig {
    cadence_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HttpConfig {
    timeout: Option<u64>,
}

const DEFAULT_CADENCE_MS: u64 = 80;
const MIN_CADENCE_MS: u64 = 30;
const MAX_CADENCE_MS: u64 = 100;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub reviews_base_url: String,
    pub data_dir: PathBuf,
    pub stream_cadence: Duration,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config_file: ConfigFile =
            toml::from_str(&content).context("Failed to parse config file")?;

        Ok(Self::from_config_file(config_file))
    }

    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }

    fn from_config_file(config_file: ConfigFile) -> Self {
        let cadence_ms = config_file
            .stream
            .cadence_ms
            .unwrap_or(DEFAULT_CADENCE_MS)
            .clamp(MIN_CADENCE_MS, MAX_CADENCE_MS);

        let base_url = trim_trailing_slash(&config_file.backend.url);
        // The reviews endpoint is served from a separate origin in production;
        // a single-origin deployment can omit it.
        let reviews_base_url = config_file
            .backend
            .reviews_url
            .as_deref()
            .map(trim_trailing_slash)
            .unwrap_or_else(|| base_url.clone());

        Self {
            base_url,
            reviews_base_url,
            data_dir: config_file.storage.data_dir.into(),
            stream_cadence: Duration::from_millis(cadence_ms),
            request_timeout: Duration::from_secs(
                config_file.http.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        }
    }
}

fn trim_trailing_slash(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
