//! TOML Configuration File Support
//!
//! Engine configuration lives in `~/.config/dialogue-engine/dialogue.toml`.
//! Player-facing settings (name, text speed, volume) are not here; they
//! belong to the options menu and are read through [`crate::settings`].
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (when applicable)
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! model = "gemini-2.0-flash"
//! request_timeout_secs = 120
//!
//! [retry]
//! max_attempts = 3
//! initial_backoff_ms = 250
//!
//! [reveal]
//! punctuation_pauses = true
//! tick_interval_ms = 16
//!
//! [history]
//! path = "/home/me/.local/share/dialogue-engine/history.dat"
//! context_turns = 40
//!
//! [character]
//! name = "Niko"
//!
//! [catalog]
//! expressions = ["wink"]
//! cues = ["door_knock"]
//! ```
//!
//! The API key is never read from the TOML file's neighbours or written
//! anywhere; set `GOOGLE_API_KEY` (or `backend.api_key`).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::RetryPolicy;
use crate::catalog::AssetCatalog;
use crate::history::DEFAULT_HISTORY_FILE;
use crate::reveal::PacingProfile;
use crate::settings::OPTIONS_FILE;

/// Directory name under the platform config/data dirs
pub const APP_DIR: &str = "dialogue-engine";

/// Default Gemini model
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default Gemini API root
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Character instructions used when none are configured.
///
/// `{player_name}`, `{character}`, `{expressions}` and `{cues}` are
/// substituted before the prompt is sent.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are {character}, a gentle and curious kid talking to {player_name} \
through their computer. Stay in character at all times and never say you \
are an AI. Speak in short, simple sentences and ask questions when you are \
unsure.

To change your facial expression mid-sentence, write [face:name] right \
before the words it applies to. Available expressions: {expressions}.
To play a sound, write [sfx:name] at the moment it should play. Use sounds \
sparingly. Available sounds: {cues}.";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Backend section of the TOML configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Model name
    pub model: Option<String>,

    /// API root URL
    pub base_url: Option<String>,

    /// API key (prefer `GOOGLE_API_KEY`)
    pub api_key: Option<String>,

    /// Longest silence on the connection, in seconds, before the request fails
    pub request_timeout_secs: Option<u64>,

    /// Connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for BackendToml {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendToml")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Retry section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryToml {
    /// Total attempts per request
    pub max_attempts: Option<u32>,

    /// First backoff delay in milliseconds
    pub initial_backoff_ms: Option<u64>,

    /// Backoff cap in milliseconds
    pub max_backoff_ms: Option<u64>,

    /// Backoff growth factor
    pub backoff_multiplier: Option<f32>,

    /// Whether to add jitter
    pub use_jitter: Option<bool>,
}

/// Reveal section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealToml {
    /// Hold briefly after punctuation and sound cues
    pub punctuation_pauses: Option<bool>,

    /// Driver tick interval in milliseconds
    pub tick_interval_ms: Option<u64>,
}

/// History section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryToml {
    /// History file path
    pub path: Option<String>,

    /// Options file path
    pub options_path: Option<String>,

    /// Prior turns sent to the backend
    pub context_turns: Option<usize>,
}

/// Character section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterToml {
    /// Character name
    pub name: Option<String>,

    /// System prompt template
    pub system_prompt: Option<String>,
}

/// Catalog section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogToml {
    /// Expression ids on top of the built-in set
    pub expressions: Vec<String>,

    /// Cue ids
    pub cues: Vec<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueToml {
    /// Backend configuration section
    pub backend: BackendToml,

    /// Retry configuration section
    pub retry: RetryToml,

    /// Reveal configuration section
    pub reveal: RevealToml,

    /// History configuration section
    pub history: HistoryToml,

    /// Character configuration section
    pub character: CharacterToml,

    /// Catalog configuration section
    pub catalog: CatalogToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Connection settings for the text-generation backend
#[derive(Clone)]
pub struct BackendConfig {
    /// Model name
    pub model: String,

    /// API root URL
    pub base_url: String,

    /// Longest gap between reads; a reply may stream for longer than this
    pub request_timeout: Duration,

    /// Connect timeout
    pub connect_timeout: Duration,

    api_key: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            api_key: None,
        }
    }
}

impl BackendConfig {
    /// API key, if one was configured
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Set the API key
    pub fn set_api_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.api_key = if key.trim().is_empty() { None } else { Some(key) };
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Who the backend plays
#[derive(Clone, Debug)]
pub struct CharacterConfig {
    /// Character name
    pub name: String,

    /// Instruction template
    pub system_prompt: String,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            name: "Niko".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl CharacterConfig {
    /// Fill in the prompt template for one player and asset set
    #[must_use]
    pub fn render_prompt(&self, player_name: &str, catalog: &AssetCatalog) -> String {
        let expressions = join_ids(catalog.expression_ids());
        let cues = join_ids(catalog.cue_ids());
        self.system_prompt
            .replace("{player_name}", player_name)
            .replace("{character}", &self.name)
            .replace("{expressions}", &expressions)
            .replace("{cues}", &cues)
    }

    /// Opening request that asks the character to say hello
    #[must_use]
    pub fn greeting_prompt(&self) -> String {
        format!("(Start the conversation by greeting the user as {}.)", self.name)
    }
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let joined = ids.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "none".to_string()
    } else {
        joined
    }
}

/// Centralized engine configuration
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Backend connection
    pub backend: BackendConfig,

    /// Retry policy for transient failures
    pub retry: RetryPolicy,

    /// Punctuation and cue holds during reveal
    pub punctuation_pauses: bool,

    /// Interval at which the driver ticks the controller
    pub tick_interval: Duration,

    /// History file
    pub history_path: PathBuf,

    /// Options file written by the options menu
    pub options_path: PathBuf,

    /// Prior turns sent as backend context
    pub context_turns: usize,

    /// Character definition
    pub character: CharacterConfig,

    /// Extra expression ids
    pub extra_expressions: Vec<String>,

    /// Extra cue ids
    pub extra_cues: Vec<String>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            retry: RetryPolicy::default(),
            punctuation_pauses: true,
            tick_interval: Duration::from_millis(16),
            history_path: default_history_path(),
            options_path: default_options_path(),
            context_turns: 40,
            character: CharacterConfig::default(),
            extra_expressions: Vec::new(),
            extra_cues: Vec::new(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Pacing profile selected by `punctuation_pauses`
    #[must_use]
    pub fn pacing(&self) -> PacingProfile {
        if self.punctuation_pauses {
            PacingProfile::default()
        } else {
            PacingProfile::none()
        }
    }

    /// Built-in assets plus the configured extras
    #[must_use]
    pub fn catalog(&self) -> AssetCatalog {
        AssetCatalog::builtin()
            .with_expressions(self.extra_expressions.iter().map(String::as_str))
            .with_cues(self.extra_cues.iter().map(String::as_str))
    }

    /// Check invariants the engine relies on
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("backend.model is empty".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "retry.backoff_multiplier must be at least 1.0".into(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "reveal.tick_interval_ms must be positive".into(),
            ));
        }
        if self.character.name.trim().is_empty() {
            return Err(ConfigError::ValidationError("character.name is empty".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/dialogue-engine/dialogue.toml` or
/// `~/.config/dialogue-engine/dialogue.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR).join("dialogue.toml"))
}

/// Default history file, falling back to the working directory
#[must_use]
pub fn default_history_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join(APP_DIR).join(DEFAULT_HISTORY_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_FILE))
}

/// Default options file, falling back to the working directory
#[must_use]
pub fn default_options_path() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join(APP_DIR).join(OPTIONS_FILE))
        .unwrap_or_else(|| PathBuf::from(OPTIONS_FILE))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the merged values fail validation. A missing config file is not an error.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: DialogueToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut EngineConfig, toml: &DialogueToml) {
    // Backend
    if let Some(ref model) = toml.backend.model {
        config.backend.model = model.clone();
    }
    if let Some(ref url) = toml.backend.base_url {
        config.backend.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(ref key) = toml.backend.api_key {
        config.backend.set_api_key(key.clone());
    }
    if let Some(secs) = toml.backend.request_timeout_secs {
        config.backend.request_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.backend.connect_timeout_secs {
        config.backend.connect_timeout = Duration::from_secs(secs);
    }

    // Retry
    if let Some(attempts) = toml.retry.max_attempts {
        config.retry.max_attempts = attempts;
    }
    if let Some(ms) = toml.retry.initial_backoff_ms {
        config.retry.initial_backoff_ms = ms;
    }
    if let Some(ms) = toml.retry.max_backoff_ms {
        config.retry.max_backoff_ms = ms;
    }
    if let Some(multiplier) = toml.retry.backoff_multiplier {
        config.retry.backoff_multiplier = multiplier;
    }
    if let Some(jitter) = toml.retry.use_jitter {
        config.retry.use_jitter = jitter;
    }

    // Reveal
    if let Some(enabled) = toml.reveal.punctuation_pauses {
        config.punctuation_pauses = enabled;
    }
    if let Some(ms) = toml.reveal.tick_interval_ms {
        config.tick_interval = Duration::from_millis(ms);
    }

    // History
    if let Some(ref path) = toml.history.path {
        config.history_path = PathBuf::from(path);
    }
    if let Some(ref path) = toml.history.options_path {
        config.options_path = PathBuf::from(path);
    }
    if let Some(turns) = toml.history.context_turns {
        config.context_turns = turns;
    }

    // Character
    if let Some(ref name) = toml.character.name {
        config.character.name = name.clone();
    }
    if let Some(ref prompt) = toml.character.system_prompt {
        config.character.system_prompt = prompt.clone();
    }

    // Catalog
    config
        .extra_expressions
        .extend(toml.catalog.expressions.iter().cloned());
    config.extra_cues.extend(toml.catalog.cues.iter().cloned());
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut EngineConfig) {
    // The key is a credential, not a tuning knob: it does not change `source`.
    if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
        config.backend.set_api_key(key);
    }

    if let Ok(model) = std::env::var("DIALOGUE_MODEL") {
        config.backend.model = model;
        config.source = ConfigSource::Env;
    }
    if let Ok(url) = std::env::var("DIALOGUE_BASE_URL") {
        config.backend.base_url = url.trim_end_matches('/').to_string();
        config.source = ConfigSource::Env;
    }
    if let Ok(timeout) = std::env::var("DIALOGUE_REQUEST_TIMEOUT") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.backend.request_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(attempts) = std::env::var("DIALOGUE_MAX_ATTEMPTS") {
        if let Ok(n) = attempts.parse::<u32>() {
            config.retry.max_attempts = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(enabled) = std::env::var("DIALOGUE_PUNCTUATION_PAUSES") {
        config.punctuation_pauses = enabled != "0" && enabled.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
    if let Ok(tick) = std::env::var("DIALOGUE_TICK_MS") {
        if let Ok(ms) = tick.parse::<u64>() {
            config.tick_interval = Duration::from_millis(ms);
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(path) = std::env::var("DIALOGUE_HISTORY_PATH") {
        config.history_path = PathBuf::from(path);
        config.source = ConfigSource::Env;
    }
    if let Ok(path) = std::env::var("DIALOGUE_OPTIONS_PATH") {
        config.options_path = PathBuf::from(path);
        config.source = ConfigSource::Env;
    }
    if let Ok(name) = std::env::var("DIALOGUE_CHARACTER") {
        config.character.name = name;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Model override
    pub model: Option<String>,

    /// History path override
    pub history_path: Option<PathBuf>,

    /// Options path override
    pub options_path: Option<PathBuf>,

    /// Punctuation pauses override
    pub punctuation_pauses: Option<bool>,

    /// Max attempts override
    pub max_attempts: Option<u32>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Set history path override
    #[must_use]
    pub fn with_history_path(mut self, path: PathBuf) -> Self {
        self.history_path = Some(path);
        self
    }

    /// Set options path override
    #[must_use]
    pub fn with_options_path(mut self, path: PathBuf) -> Self {
        self.options_path = Some(path);
        self
    }

    /// Set punctuation pauses override
    #[must_use]
    pub fn with_punctuation_pauses(mut self, enabled: bool) -> Self {
        self.punctuation_pauses = Some(enabled);
        self
    }

    /// Set max attempts override
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut EngineConfig) {
        if self.model.is_some()
            || self.history_path.is_some()
            || self.options_path.is_some()
            || self.punctuation_pauses.is_some()
            || self.max_attempts.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref model) = self.model {
            config.backend.model = model.clone();
        }
        if let Some(ref path) = self.history_path {
            config.history_path = path.clone();
        }
        if let Some(ref path) = self.options_path {
            config.options_path = path.clone();
        }
        if let Some(enabled) = self.punctuation_pauses {
            config.punctuation_pauses = enabled;
        }
        if let Some(attempts) = self.max_attempts {
            config.retry.max_attempts = attempts;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
