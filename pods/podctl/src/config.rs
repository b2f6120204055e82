use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to access config file: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// podctl configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodctlConfig {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

/// RPC endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Endpoints offered in the selector
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    /// Endpoint used when none is given on the command line
    #[serde(default)]
    pub selected: Option<String>,
    /// Request `get-pods-with-stats` instead of `get-pods`
    #[serde(default = "default_false")]
    pub with_stats: bool,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Maximum number of retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retry_attempts: u32,
}

/// Geo/reputation lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Service base URL; defaults to `https://<rpc host>/geo`
    #[serde(default)]
    pub base_url: Option<String>,
    /// Send one batched lookup per render pass
    #[serde(default = "default_true")]
    pub batch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_filter_debounce")]
    pub filter_debounce_millis: u64,
    /// Delay before re-sorting after enrichment settles
    #[serde(default = "default_resort_delay")]
    pub resort_delay_millis: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_chat_url")]
    pub base_url: String,
    #[serde(default = "default_chat_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// File holding the stored theme preference
    #[serde(default = "default_theme_path")]
    pub theme_path: PathBuf,
}

// Default functions for RpcConfig
fn default_endpoints() -> Vec<String> {
    vec!["http://127.0.0.1:6000/rpc".to_string()]
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

// Default functions for RefreshConfig
fn default_refresh_interval() -> u64 {
    300 // 5 minutes
}

fn default_filter_debounce() -> u64 {
    300
}

fn default_resort_delay() -> u64 {
    500
}

// Default functions for ChatConfig
fn default_chat_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_chat_timeout() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_theme_path() -> PathBuf {
    PathBuf::from("./storage/theme.toml")
}

// Common default functions
fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            selected: None,
            with_stats: default_false(),
            request_timeout_seconds: default_request_timeout(),
            max_retry_attempts: default_max_retries(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            batch: default_true(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_refresh_interval(),
            filter_debounce_millis: default_filter_debounce(),
            resort_delay_millis: default_resort_delay(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_chat_url(),
            request_timeout_seconds: default_chat_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme_path: default_theme_path(),
        }
    }
}

impl RpcConfig {
    /// The endpoint to use: an explicit override, the selected one, or the first listed
    pub fn endpoint(&self, overridden: Option<&str>) -> ConfigResult<String> {
        overridden
            .map(str::to_string)
            .or_else(|| self.selected.clone())
            .or_else(|| self.endpoints.first().cloned())
            .ok_or_else(|| ConfigError::Invalid("no RPC endpoint configured".to_string()))
    }

    /// Resolve a prompt choice: a 1-based position in `endpoints` or a URL
    pub fn choose(&self, choice: &str) -> ConfigResult<String> {
        let choice = choice.trim();
        if let Ok(position) = choice.parse::<usize>() {
            return position
                .checked_sub(1)
                .and_then(|index| self.endpoints.get(index))
                .cloned()
                .ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "no endpoint {}, {} configured",
                        position,
                        self.endpoints.len()
                    ))
                });
        }

        if choice.starts_with("http://") || choice.starts_with("https://") {
            Ok(choice.to_string())
        } else {
            Err(ConfigError::Invalid(format!("not an endpoint URL: {}", choice)))
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn filter_debounce(&self) -> Duration {
        Duration::from_millis(self.filter_debounce_millis)
    }

    pub fn resort_delay(&self) -> Duration {
        Duration::from_millis(self.resort_delay_millis)
    }
}

impl PodctlConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Io(e)
            }
        })?;

        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;

        // Ensure the directory exists
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        match Self::load(&path) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => {
                let config = Self::default();
                config.save(&path)?;
                Ok(config)
            }
            Err(e) => Err(e),
        }
    }

    /// Load the file if it exists, otherwise use defaults without writing anything
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("podctl.toml");
        fs::write(
            &path,
            r#"
[rpc]
endpoints = ["https://a.example.org/rpc", "https://b.example.org/rpc"]
with_stats = true

[enrichment]
batch = false
"#,
        )
        .unwrap();

        let config = PodctlConfig::load(&path).unwrap();
        assert!(config.rpc.with_stats);
        assert!(!config.enrichment.batch);
        assert_eq!(config.rpc.max_retry_attempts, 3);
        assert_eq!(config.refresh.interval(), Duration::from_secs(300));
        assert_eq!(config.chat.base_url, "http://localhost:8080");
        assert_eq!(config.rpc.endpoint(None).unwrap(), "https://a.example.org/rpc");
    }

    #[test]
    fn test_endpoint_precedence() {
        let mut rpc = RpcConfig::default();
        rpc.selected = Some("https://selected.example.org/rpc".to_string());
        assert_eq!(rpc.endpoint(None).unwrap(), "https://selected.example.org/rpc");
        assert_eq!(
            rpc.endpoint(Some("https://flag.example.org/rpc")).unwrap(),
            "https://flag.example.org/rpc"
        );

        let empty = RpcConfig {
            endpoints: vec![],
            ..RpcConfig::default()
        };
        assert!(matches!(empty.endpoint(None), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_choose_endpoint() {
        let rpc = RpcConfig {
            endpoints: vec![
                "https://a.example.org/rpc".to_string(),
                "https://b.example.org/rpc".to_string(),
            ],
            ..RpcConfig::default()
        };

        assert_eq!(rpc.choose("2").unwrap(), "https://b.example.org/rpc");
        assert_eq!(
            rpc.choose(" http://10.0.0.5:6000/rpc ").unwrap(),
            "http://10.0.0.5:6000/rpc"
        );
        assert!(matches!(rpc.choose("0"), Err(ConfigError::Invalid(_))));
        assert!(matches!(rpc.choose("3"), Err(ConfigError::Invalid(_))));
        assert!(matches!(rpc.choose("b.example.org"), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("podctl.toml");

        let config = PodctlConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert!(config.enrichment.batch);

        let reloaded = PodctlConfig::load(&path).unwrap();
        assert_eq!(reloaded.rpc.endpoints, config.rpc.endpoints);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(PodctlConfig::load(&missing), Err(ConfigError::NotFound(_))));
        assert!(PodctlConfig::load_or_default(&missing).is_ok());
        assert!(!missing.exists());

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "[rpc\nendpoints = 3").unwrap();
        assert!(matches!(PodctlConfig::load(&bad), Err(ConfigError::Parse(_))));
    }
}
