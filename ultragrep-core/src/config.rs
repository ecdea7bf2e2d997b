use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::errors::{ConfigError, UltragrepError};
use crate::format::MatcherKind;

/// File names tried, in order, when no explicit configuration path is given.
pub const CONFIG_FILE_NAME: &str = ".ultragrep.toml";
const SYSTEM_CONFIG_PATH: &str = "/etc/ultragrep.toml";

/// Storage engine used for the timestamp and gzip access indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Flat,
    Sqlite,
}

impl IndexBackend {
    fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "flat" | "file" => Some(IndexBackend::Flat),
            "sqlite" | "db" => Some(IndexBackend::Sqlite),
            _ => None,
        }
    }
}

impl Default for IndexBackend {
    fn default() -> Self {
        IndexBackend::Flat
    }
}

/// Index build and lookup settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Directory holding index artifacts. `None` colocates them with the log.
    pub dir: Option<PathBuf>,
    pub backend: IndexBackend,
    /// Width of a timestamp index bucket, in seconds.
    pub granularity_secs: u64,
    /// Uncompressed bytes between two gzip access points.
    pub gzip_span_bytes: u64,
    /// Build or refresh indexes automatically before a query.
    pub auto_build: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            dir: None,
            backend: IndexBackend::Flat,
            granularity_secs: 10,
            gzip_span_bytes: 30_000_000,
            auto_build: true,
        }
    }
}

/// A named group of log files sharing one format.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogTypeConfig {
    #[serde(deserialize_with = "one_or_many")]
    pub glob: Vec<String>,
    #[serde(default = "default_format")]
    pub format: String,
}

/// A user-defined, regex driven log format.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomFormatConfig {
    pub name: String,
    #[serde(default)]
    pub kind: MatcherKind,
    /// Lines matching this pattern open a new request.
    pub start_pattern: Option<String>,
    /// First capture group holds the timestamp text.
    pub time_pattern: String,
    #[serde(default = "default_time_format")]
    pub time_format: String,
    /// First capture group holds the session key (session formats only).
    pub key_pattern: Option<String>,
    /// Lines matching this pattern close their session.
    pub end_pattern: Option<String>,
    #[serde(default)]
    pub blank_lines: usize,
}

/// Global configuration for the search tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub types: BTreeMap<String, LogTypeConfig>,
    pub default_type: Option<String>,
    pub index: IndexSettings,
    pub formats: Vec<CustomFormatConfig>,
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl SearchConfig {
    /// Loads configuration from `explicit`, or from the first default location
    /// that exists. Falls back to built-in defaults when nothing is found.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigError::MissingFile(path.display().to_string()))
            }
            Some(path) => Some(path.to_path_buf()),
            None => default_locations().into_iter().find(|path| path.exists()),
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Parses a configuration file without applying environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml(&raw, path)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    fn from_toml(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Applies `ULTRAGREP_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(dir) = env::var("ULTRAGREP_INDEX_DIR") {
            if !dir.trim().is_empty() {
                self.index.dir = Some(PathBuf::from(dir));
            }
        }

        if let Ok(raw) = env::var("ULTRAGREP_INDEX_BACKEND") {
            self.index.backend =
                IndexBackend::from_str(&raw).ok_or(ConfigError::InvalidValue {
                    key: "ULTRAGREP_INDEX_BACKEND",
                    value: raw,
                })?;
        }

        Ok(())
    }

    /// Resolves a log type by name, falling back to `default_type`.
    pub fn log_type(&self, name: Option<&str>) -> Result<(&str, &LogTypeConfig), ConfigError> {
        if self.types.is_empty() {
            let looked_in = default_locations()
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ConfigError::NotConfigured(looked_in));
        }

        let name = name
            .or(self.default_type.as_deref())
            .or_else(|| self.types.keys().next().map(String::as_str))
            .unwrap_or_default();

        self.types
            .get_key_value(name)
            .map(|(key, value)| (key.as_str(), value))
            .ok_or_else(|| ConfigError::UnknownType(name.to_string()))
    }

    /// Names of the configured log types.
    pub fn available_types(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    /// Returns a user-defined format by name.
    pub fn custom_format(&self, name: &str) -> Option<&CustomFormatConfig> {
        self.formats.iter().find(|format| format.name == name)
    }
}

/// Helper that loads config and converts to the canonical ultragrep error type.
pub fn load_search_config(explicit: Option<&Path>) -> Result<SearchConfig, UltragrepError> {
    Ok(SearchConfig::load(explicit)?)
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(home) = dirs::home_dir() {
        locations.push(home.join(CONFIG_FILE_NAME));
    }
    locations.push(PathBuf::from(SYSTEM_CONFIG_PATH));
    locations
}

fn default_format() -> String {
    "app".to_string()
}

fn default_time_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}
