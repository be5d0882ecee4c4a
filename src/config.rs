//! Configuration file parser for ~/.config/newscache/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as warnings to surface typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Environment variable that overrides `api_key` from the file.
pub const API_KEY_ENV: &str = "NEWS_API_KEY";

/// Upper bound NewsAPI accepts for `pageSize`.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Longest accepted freshness window (five years).
pub const MAX_CACHE_DURATION_HOURS: u32 = 5 * 365 * 24;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Custom Debug impl masks `api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// NewsAPI key. `NEWS_API_KEY` takes precedence.
    pub api_key: Option<String>,

    /// Scheme and host of the API, e.g. `https://newsapi.org`.
    pub api_host: String,

    /// Two-letter country code for the headline feed.
    pub country: String,

    /// Articles per page.
    pub page_size: u32,

    /// How long a fetched article counts as fresh, in hours.
    pub cache_duration_hours: u32,

    /// Daily request cap, kept below the upstream free-tier limit.
    pub max_daily_requests: u32,

    /// Also store search results in the article cache.
    pub persist_search_results: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_host: "https://newsapi.org".to_string(),
            country: "us".to_string(),
            page_size: 20,
            cache_duration_hours: 2,
            max_daily_requests: 80,
            persist_search_results: false,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_host", &self.api_host)
            .field("country", &self.country)
            .field("page_size", &self.page_size)
            .field("cache_duration_hours", &self.cache_duration_hours)
            .field("max_daily_requests", &self.max_daily_requests)
            .field("persist_search_results", &self.persist_search_results)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "api_key",
        "api_host",
        "country",
        "page_size",
        "cache_duration_hours",
        "max_daily_requests",
        "persist_search_results",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            api_host = %config.api_host,
            max_daily_requests = config.max_daily_requests,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Reject values the sync layer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.cache_duration_hours == 0 || self.cache_duration_hours > MAX_CACHE_DURATION_HOURS {
            return Err(ConfigError::Invalid(format!(
                "cache_duration_hours must be between 1 and {MAX_CACHE_DURATION_HOURS}, got {}",
                self.cache_duration_hours
            )));
        }
        if self.max_daily_requests == 0 {
            return Err(ConfigError::Invalid(
                "max_daily_requests must be at least 1".to_string(),
            ));
        }
        if self.country.trim().is_empty() {
            return Err(ConfigError::Invalid("country must not be empty".to_string()));
        }
        Ok(())
    }

    /// API key from `NEWS_API_KEY`, falling back to the file value.
    pub fn api_key(&self) -> Option<SecretString> {
        resolve_api_key(std::env::var(API_KEY_ENV).ok(), self.api_key.as_deref())
    }
}

fn resolve_api_key(env: Option<String>, file: Option<&str>) -> Option<SecretString> {
    env.filter(|k| !k.trim().is_empty())
        .or_else(|| file.filter(|k| !k.trim().is_empty()).map(str::to_string))
        .map(SecretString::from)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("newscache_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.api_key.is_none());
        assert_eq!(config.api_host, "https://newsapi.org");
        assert_eq!(config.country, "us");
        assert_eq!(config.page_size, 20);
        assert_eq!(config.cache_duration_hours, 2);
        assert_eq!(config.max_daily_requests, 80);
        assert!(!config.persist_search_results);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/newscache_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.page_size, 20);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_daily_requests, 80);
        cleanup(&path);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = write_config("partial", "max_daily_requests = 50\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_daily_requests, 50);
        assert_eq!(config.page_size, 20);
        assert_eq!(config.api_host, "https://newsapi.org");
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
api_key = "file-key"
api_host = "https://news.example.com"
country = "gb"
page_size = 50
cache_duration_hours = 6
max_daily_requests = 400
persist_search_results = true
"#;
        let path = write_config("full", content);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("file-key"));
        assert_eq!(config.api_host, "https://news.example.com");
        assert_eq!(config.country, "gb");
        assert_eq!(config.page_size, 50);
        assert_eq!(config.cache_duration_hours, 6);
        assert_eq!(config.max_daily_requests, 400);
        assert!(config.persist_search_results);
        cleanup(&path);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = write_config("unknown", "page_size = 10\ntheme = \"dark\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.page_size, 10);
        cleanup(&path);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let path = write_config("wrongtype", "page_size = \"twenty\"\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
        cleanup(&path);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let path = write_config("range", "page_size = 0\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));
        cleanup(&path);

        let config = Config {
            page_size: MAX_PAGE_SIZE + 1,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            cache_duration_hours: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_daily_requests: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            cache_duration_hours: MAX_CACHE_DURATION_HOURS,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_huge_cache_duration_rejected() {
        let path = write_config("huge_duration", "cache_duration_hours = 4000000000\n");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("cache_duration_hours"));
        cleanup(&path);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        cleanup(&path);
    }

    #[test]
    fn test_env_key_takes_precedence() {
        let key = resolve_api_key(Some("env-key".to_string()), Some("file-key")).unwrap();
        assert_eq!(key.expose_secret(), "env-key");

        let key = resolve_api_key(None, Some("file-key")).unwrap();
        assert_eq!(key.expose_secret(), "file-key");

        let key = resolve_api_key(Some("  ".to_string()), Some("file-key")).unwrap();
        assert_eq!(key.expose_secret(), "file-key");

        assert!(resolve_api_key(None, None).is_none());
        assert!(resolve_api_key(None, Some("")).is_none());
    }

    #[test]
    fn test_debug_masks_api_key() {
        let config = Config {
            api_key: Some("super-secret-key-12345".to_string()),
            ..Config::default()
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-key-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
