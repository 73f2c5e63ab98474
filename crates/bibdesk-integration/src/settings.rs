//! Settings for bibdesk-integration
//!
//! Settings live in a TOML file. Every key is optional; missing keys take
//! the defaults below.
//!
//! ```toml
//! bibtex_filepath = "~/Documents/references.bib"
//! use_native_binary = true
//!
//! [resolver]
//! binary_path = "/usr/local/libexec/bookmark_resolver"
//!
//! [authors]
//! format_type = "first_and_last_author"
//!
//! [journal]
//! highlight_volume = "mark_down"
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bibdesk_bibtex::{AuthorFormatOptions, ChunkedParser, JournalReferenceOptions};
use bibdesk_bookmark::{
    ResolverConfig, BINARY_ARTIFACT, DEFAULT_INTERPRETER, DEFAULT_RELEASE_BASE_URL, SCRIPT_ARTIFACT,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const APP_DIR_NAME: &str = "bibdesk-integration";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Resolver artifacts are released together with this package
pub const RESOLVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no configuration directory on this platform")]
    NoConfigDir,
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// The BibDesk library; empty means none
    pub bibtex_filepath: String,
    /// Delay before the initial import in milliseconds
    pub import_delay_ms: u64,
    pub debug_parser: bool,
    /// Import the built-in demonstration library when no file can be read
    pub use_demo_entries: bool,
    pub use_native_binary: bool,
    /// Entries parsed per parser invocation
    pub max_matches: usize,
    /// Parsing time per scheduling slice in milliseconds
    pub slice_budget_ms: u64,
    pub resolver: ResolverSettings,
    pub authors: AuthorFormatOptions,
    pub journal: JournalReferenceOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bibtex_filepath: String::new(),
            import_delay_ms: 750,
            debug_parser: false,
            use_demo_entries: true,
            use_native_binary: false,
            max_matches: 100,
            slice_budget_ms: 8,
            resolver: ResolverSettings::default(),
            authors: AuthorFormatOptions::default(),
            journal: JournalReferenceOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Expected version of the installed resolver artifacts
    pub version: String,
    /// Defaults to the application data directory
    pub script_path: Option<PathBuf>,
    /// Defaults to the application data directory
    pub binary_path: Option<PathBuf>,
    pub interpreter: String,
    pub release_base_url: String,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            version: RESOLVER_VERSION.to_string(),
            script_path: None,
            binary_path: None,
            interpreter: DEFAULT_INTERPRETER.to_string(),
            release_base_url: DEFAULT_RELEASE_BASE_URL.to_string(),
        }
    }
}

impl Settings {
    /// `<config dir>/bibdesk-integration/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load settings from `path`, or from the default location
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path().ok_or(ConfigError::NoConfigDir)?,
        };

        let settings = match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_toml(&text)?,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No settings file at {}, using defaults", path.display());
                Self::default()
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = self.to_toml()?;
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        std::fs::write(path, text).map_err(write_error)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_matches == 0 {
            return Err(ConfigError::Invalid(
                "max_matches must be positive".to_string(),
            ));
        }
        if self.resolver.version.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "resolver.version must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn import_delay(&self) -> Duration {
        Duration::from_millis(self.import_delay_ms)
    }

    pub fn chunked_parser(&self) -> ChunkedParser {
        ChunkedParser::new(self.max_matches)
            .with_slice_budget(Duration::from_millis(self.slice_budget_ms))
    }

    /// The library path with a leading `~/` expanded, or `None` when unset
    pub fn bibtex_path(&self) -> Option<PathBuf> {
        let path = self.bibtex_filepath.trim();
        if path.is_empty() {
            return None;
        }
        match (path.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => Some(home.join(rest)),
            _ => Some(PathBuf::from(path)),
        }
    }

    /// Default filter for the log subscriber
    pub fn log_filter(&self) -> &'static str {
        if self.debug_parser {
            "debug"
        } else {
            "info"
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        let data_dir = dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME));
        let or_default = |configured: &Option<PathBuf>, artifact: &str| {
            configured
                .clone()
                .or_else(|| data_dir.as_ref().map(|dir| dir.join(artifact)))
        };

        ResolverConfig {
            script_path: or_default(&self.resolver.script_path, SCRIPT_ARTIFACT),
            binary_path: or_default(&self.resolver.binary_path, BINARY_ARTIFACT),
            interpreter: self.resolver.interpreter.clone(),
            use_native_binary: self.use_native_binary,
            release_base_url: self.resolver.release_base_url.clone(),
            ..ResolverConfig::default()
        }
    }
}
