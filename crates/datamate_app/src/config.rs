use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context};
use client_logging::client_info;
use datamate_core::{FilterKind, DEFAULT_PAGE_SIZE_OPTIONS};
use datamate_engine::{FetcherSettings, HttpSettings, UploaderSettings, DEFAULT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "datamate.ron";

/// Client settings read from a RON file. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: Option<u64>,
    pub chunk_size: u64,
    pub polling_interval_ms: u64,
    pub page_offset: u32,
    pub page_size_options: Vec<u32>,
    pub show_task_center: bool,
    /// Rendering of each dataset filter key; unlisted keys are single-select.
    pub filters: BTreeMap<String, FilterKind>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let http = HttpSettings::default();
        let fetcher = FetcherSettings::default();
        Self {
            base_url: http.base_url,
            auth_token: None,
            connect_timeout_ms: millis(http.connect_timeout),
            request_timeout_ms: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            polling_interval_ms: millis(fetcher.polling_interval),
            page_offset: fetcher.page_offset,
            page_size_options: DEFAULT_PAGE_SIZE_OPTIONS.to_vec(),
            show_task_center: true,
            filters: BTreeMap::from([("tags".to_string(), FilterKind::Multi)]),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl ClientConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.chunk_size > 0, "chunk_size must be positive");
        ensure!(
            self.polling_interval_ms > 0,
            "polling_interval_ms must be positive"
        );
        ensure!(
            !self.page_size_options.is_empty(),
            "page_size_options must not be empty"
        );
        Ok(())
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            base_url: self.base_url.clone(),
            auth_token: self.auth_token.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn fetcher_settings(&self, auto_refresh: bool) -> FetcherSettings {
        FetcherSettings {
            polling_interval: Duration::from_millis(self.polling_interval_ms),
            auto_refresh,
            page_offset: self.page_offset,
            page_size_options: self.page_size_options.clone(),
            filter_kinds: self.filters.clone(),
        }
    }

    pub fn uploader_settings(&self) -> UploaderSettings {
        UploaderSettings {
            show_task_center: self.show_task_center,
        }
    }
}

/// Loads the config at `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: &Path) -> anyhow::Result<ClientConfig> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            client_info!("No config at {:?}, using defaults", path);
            return Ok(ClientConfig::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("reading config {}", path.display()));
        }
    };

    let config: ClientConfig =
        ron::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    client_info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Writes `config` as pretty RON. Refuses to overwrite unless `force` is set.
pub fn save_config(path: &Path, config: &ClientConfig, force: bool) -> anyhow::Result<()> {
    ensure!(
        force || !path.exists(),
        "{} already exists (use --force to overwrite)",
        path.display()
    );
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let pretty = ron::ser::PrettyConfig::new();
    let content =
        ron::ser::to_string_pretty(config, pretty).context("serializing config")?;
    fs::write(path, content).with_context(|| format!("writing config {}", path.display()))?;
    client_info!("Wrote config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.ron")).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.polling_interval_ms, 30_000);
        assert_eq!(config.page_offset, 1);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datamate.ron");
        fs::write(
            &path,
            r#"(
                base_url: "https://datamate.example.com/gateway",
                auth_token: Some("abc"),
                polling_interval_ms: 5000,
                filters: { "status": single, "tags": multi, "favorite": flag },
            )"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.base_url, "https://datamate.example.com/gateway");
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.filters.get("favorite"), Some(&FilterKind::Flag));

        let http = config.http_settings();
        assert_eq!(http.auth_token.as_deref(), Some("abc"));
        let fetcher = config.fetcher_settings(true);
        assert_eq!(fetcher.polling_interval, Duration::from_secs(5));
        assert!(fetcher.auto_refresh);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datamate.ron");
        fs::write(&path, "(base_url: 42").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datamate.ron");
        fs::write(&path, "(chunk_size: 0)").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("datamate.ron");
        let config = ClientConfig {
            auth_token: Some("token".to_string()),
            show_task_center: false,
            ..ClientConfig::default()
        };

        save_config(&path, &config, false).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
        assert!(save_config(&path, &config, false).is_err());
        save_config(&path, &config, true).unwrap();
    }
}
