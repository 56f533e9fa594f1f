//! Session Settings
//!
//! The options menu owns the player's settings; the engine only reads them.
//! [`SessionSettings`] is a plain value handed into every controller tick,
//! so a change made in the menu takes effect on the very next tick and the
//! engine never holds a stale copy.
//!
//! The persisted options record (`options.json`) is loaded here as well.
//! Writing it back is the options menu's job.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::reveal::TextSpeed;

/// Default options file name
pub const OPTIONS_FILE: &str = "options.json";

/// Background shown when none is configured
pub const DEFAULT_BACKGROUND: &str = "bg";

/// Snapshot of the settings the engine reads
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    /// Name the character uses for the player
    pub display_name: String,
    /// Time per revealed character, always positive
    pub reveal_rate_per_char: Duration,
    /// Cue volume in `[0, 1]`
    pub volume: f32,
    /// Background image id
    pub background_id: String,
}

impl SessionSettings {
    /// Validated settings
    ///
    /// Volume is clamped into range; a zero reveal rate is refused.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if `reveal_rate_per_char` is zero.
    pub fn new(
        display_name: impl Into<String>,
        reveal_rate_per_char: Duration,
        volume: f32,
        background_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        if reveal_rate_per_char.is_zero() {
            return Err(ConfigError::ValidationError(
                "reveal rate per character must be positive".to_string(),
            ));
        }
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        Ok(Self {
            display_name: display_name.into(),
            reveal_rate_per_char,
            volume,
            background_id: background_id.into(),
        })
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            display_name: default_player_name(),
            reveal_rate_per_char: TextSpeed::Normal.per_char(),
            volume: 0.5,
            background_id: DEFAULT_BACKGROUND.to_string(),
        }
    }
}

/// Anything that can hand out a fresh settings snapshot
pub trait SettingsSource: Send + Sync {
    /// Current settings
    fn snapshot(&self) -> SessionSettings;
}

impl SettingsSource for SessionSettings {
    fn snapshot(&self) -> SessionSettings {
        self.clone()
    }
}

/// Settings shared with the options menu
///
/// Clones share the same underlying value: the menu keeps one handle and
/// calls [`SharedSettings::update`], the main loop keeps another and calls
/// [`SettingsSource::snapshot`] once per tick.
#[derive(Clone, Debug, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<SessionSettings>>,
}

impl SharedSettings {
    /// Share an initial value
    #[must_use]
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Replace the settings wholesale
    pub fn replace(&self, settings: SessionSettings) {
        *self.inner.write() = settings;
    }

    /// Edit the settings in place
    pub fn update(&self, edit: impl FnOnce(&mut SessionSettings)) {
        let mut guard = self.inner.write();
        edit(&mut guard);
        if guard.reveal_rate_per_char.is_zero() {
            tracing::warn!("Ignoring zero reveal rate, keeping minimum");
            guard.reveal_rate_per_char = TextSpeed::Instant.per_char();
        }
        guard.volume = guard.volume.clamp(0.0, 1.0);
    }
}

impl SettingsSource for SharedSettings {
    fn snapshot(&self) -> SessionSettings {
        self.inner.read().clone()
    }
}

// ============================================================================
// Options File
// ============================================================================

/// Persisted options record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsFile {
    /// Player name
    pub player_name: String,
    /// Named reveal speed
    pub default_text_speed: TextSpeed,
    /// Cue volume
    pub sfx_volume: f32,
    /// Background image path; its file stem is the background id
    pub background_image_path: Option<String>,
    /// Model override for the backend
    pub ai_model_name: Option<String>,
}

impl Default for OptionsFile {
    fn default() -> Self {
        Self {
            player_name: default_player_name(),
            default_text_speed: TextSpeed::Normal,
            sfx_volume: 0.5,
            background_image_path: None,
            ai_model_name: None,
        }
    }
}

impl OptionsFile {
    /// Project onto the settings the engine reads
    #[must_use]
    pub fn to_settings(&self) -> SessionSettings {
        let display_name = if self.player_name.trim().is_empty() {
            default_player_name()
        } else {
            self.player_name.trim().to_string()
        };

        let background_id = self
            .background_image_path
            .as_deref()
            .and_then(|p| Path::new(p).file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or(DEFAULT_BACKGROUND)
            .to_string();

        SessionSettings {
            display_name,
            reveal_rate_per_char: self.default_text_speed.per_char(),
            volume: self.sfx_volume.clamp(0.0, 1.0),
            background_id,
        }
    }
}

/// Load the options record, falling back to defaults
///
/// A missing file is normal on first run. An unreadable or malformed file
/// is logged and ignored; the options menu will overwrite it on next save.
#[must_use]
pub fn load_options(path: &Path) -> OptionsFile {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No options file, using defaults");
            return OptionsFile::default();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read options file, using defaults");
            return OptionsFile::default();
        }
    };

    match serde_json::from_str::<OptionsFile>(&content) {
        Ok(options) => {
            tracing::debug!(path = %path.display(), "Loaded options");
            options
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Invalid options file, using defaults");
            OptionsFile::default()
        }
    }
}

/// System user name, or "Player"
fn default_player_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "Player".to_string())
}
