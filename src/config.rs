//! Session settings, loadable from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration. Loaded configurations are validated before they are
//! returned.
//!
//! ```toml
//! search_workers = 10
//! per_source_limit = 5
//! download_concurrency = 5
//! verify_mode = "fast"
//! default_thread_degree = 3
//! destination = "/home/me/Music"
//!
//! [thread_degrees]
//! netease = 5
//! ```
//!
//! # Examples
//!
//! ```rust
//! use medley::config::{load_config_from_str, Config};
//! use medley::verify::VerifyMode;
//!
//! let config = load_config_from_str("verify_mode = \"thorough\"\nper_source_limit = 8").unwrap();
//! assert_eq!(config.verify_mode, VerifyMode::Thorough);
//! assert_eq!(config.per_source_limit, 8);
//! assert_eq!(config.search_workers, Config::default().search_workers);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::{
    download::DEFAULT_DOWNLOAD_CONCURRENCY,
    error::{Error, Result},
    library::AUDIO_EXTENSIONS,
    search::{CLI_SEARCH_WORKERS, INTERACTIVE_SEARCH_WORKERS},
    source::DEFAULT_THREAD_DEGREE,
    verify::VerifyMode,
};

/// Settings shared by every operation of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound on sources searched at once.
    pub search_workers: usize,
    /// Maximum results kept per source.
    pub per_source_limit: usize,
    /// Downloads running at once.
    pub download_concurrency: usize,
    /// Verification strategy a new session starts with.
    pub verify_mode: VerifyMode,
    /// Thread degree for sources without an entry in `thread_degrees`.
    pub default_thread_degree: usize,
    /// Per-source thread degree keyed by source id.
    pub thread_degrees: HashMap<String, usize>,
    /// Library and download directory.
    pub destination: PathBuf,
    /// Extensions counted when scanning the library.
    pub audio_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_workers: CLI_SEARCH_WORKERS,
            per_source_limit: 5,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            verify_mode: VerifyMode::Fast,
            default_thread_degree: DEFAULT_THREAD_DEGREE,
            thread_degrees: HashMap::new(),
            destination: default_destination(),
            audio_extensions: AUDIO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl Config {
    /// Preset for interactive front ends, which search fewer sources at once.
    pub fn interactive() -> Self {
        Self {
            search_workers: INTERACTIVE_SEARCH_WORKERS,
            ..Self::default()
        }
    }

    /// Thread degree the source `id` searches with.
    pub fn thread_degree_for(&self, id: &str) -> usize {
        self.thread_degrees
            .get(id)
            .copied()
            .unwrap_or(self.default_thread_degree)
    }

    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = destination.into();
        self
    }
}

/// The user's audio directory, else `~/Music`, else the working directory.
pub fn default_destination() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Music")))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load configuration from a TOML file and validate it.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(Error::config(format!(
            "config file not found: {}",
            path.display()
        )));
    }

    let raw = std::fs::read_to_string(path)?;
    load_config_from_str(&raw)
}

/// Load configuration from a TOML string and validate it.
pub fn load_config_from_str(toml_str: &str) -> Result<Config> {
    let config: Config = toml::from_str(toml_str)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
///
/// Rejects zero worker counts, a zero limit, zero thread degrees and an empty
/// extension list.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.search_workers == 0 {
        return Err(Error::config("search_workers must be at least 1"));
    }
    if config.per_source_limit == 0 {
        return Err(Error::config("per_source_limit must be at least 1"));
    }
    if config.download_concurrency == 0 {
        return Err(Error::config("download_concurrency must be at least 1"));
    }
    if config.default_thread_degree == 0 {
        return Err(Error::config("default_thread_degree must be at least 1"));
    }
    if let Some((id, _)) = config.thread_degrees.iter().find(|(_, n)| **n == 0) {
        return Err(Error::config(format!(
            "thread_degrees.{} must be at least 1",
            id
        )));
    }
    if config.audio_extensions.iter().all(|e| e.trim().is_empty()) {
        return Err(Error::config("audio_extensions cannot be empty"));
    }

    Ok(())
}
