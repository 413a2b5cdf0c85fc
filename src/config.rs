//! Application configuration
//!
//! A flat settings tree serialized as TOML under the user config directory.
//! Missing file means first run: defaults are written out so there is always
//! a file to edit. Every section falls back to its defaults field by field,
//! so a partial config stays valid across upgrades.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::host::GamepadBackendSettings;
use crate::interaction::InteractionSettings;
use crate::profile::service::DEFAULT_PROFILE_ID;
use crate::session::SessionSettings;

/// Base URL of the public input-profiles asset registry.
pub const DEFAULT_PROFILES_URL: &str =
    "https://cdn.jsdelivr.net/npm/@webxr-input-profiles/assets@1.0/dist/profiles";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no user configuration directory available")]
    NoConfigDir,

    #[error("failed to read or write configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Which host backend drives the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Canned choreography, no hardware required.
    #[default]
    Scripted,

    /// Desktop gamepad mapped onto a simulated controller.
    Gamepad,
}

/// Where input profiles are resolved from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileSource {
    /// Profiles bundled into the binary.
    #[default]
    Bundled,

    /// The input-profiles asset registry over HTTP.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub backend: BackendKind,
    pub stick_deadzone: f32,
    pub move_speed: f32,
    pub turn_speed: f32,
}

impl Default for HostConfig {
    fn default() -> Self {
        let defaults = GamepadBackendSettings::default();
        Self {
            backend: BackendKind::default(),
            stick_deadzone: defaults.stick_deadzone,
            move_speed: defaults.move_speed,
            turn_speed: defaults.turn_speed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub source: ProfileSource,
    pub base_url: String,
    pub default_profile_id: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            source: ProfileSource::default(),
            base_url: DEFAULT_PROFILES_URL.to_string(),
            default_profile_id: DEFAULT_PROFILE_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub default_ray_length: f32,
    pub highlight_radius: f32,
    pub highlight_scale: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        let defaults = InteractionSettings::default();
        Self {
            default_ray_length: defaults.default_ray_length,
            highlight_radius: defaults.highlight_radius,
            highlight_scale: defaults.highlight_scale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_interval_ms: u64,
    pub gamepad_poll_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let defaults = SessionSettings::default();
        Self {
            tick_interval_ms: defaults.tick_interval_ms,
            gamepad_poll_interval_ms: defaults.gamepad_poll_interval_ms,
        }
    }
}

/// Root of the configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: HostConfig,
    pub profiles: ProfileConfig,
    pub interaction: InteractionConfig,
    pub timing: TimingConfig,
}

impl Settings {
    /// Loads settings, writing defaults first when no file exists yet.
    pub fn load_or_init(path: &Path) -> Result<Settings, ConfigError> {
        if path.exists() {
            let text = fs::read_to_string(path)?;
            let settings = toml::from_str(&text)?;
            debug!("Loaded configuration from {}", path.display());
            Ok(settings)
        } else {
            let settings = Settings::default();
            settings.save(path)?;
            info!("Wrote default configuration to {}", path.display());
            Ok(settings)
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn interaction_settings(&self) -> InteractionSettings {
        InteractionSettings {
            default_ray_length: self.interaction.default_ray_length,
            highlight_radius: self.interaction.highlight_radius,
            highlight_scale: self.interaction.highlight_scale,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            tick_interval_ms: self.timing.tick_interval_ms,
            gamepad_poll_interval_ms: self.timing.gamepad_poll_interval_ms,
        }
    }

    pub fn gamepad_settings(&self) -> GamepadBackendSettings {
        GamepadBackendSettings {
            stick_deadzone: self.host.stick_deadzone,
            move_speed: self.host.move_speed,
            turn_speed: self.host.turn_speed,
        }
    }
}

/// Default location: `<user config dir>/xrgrip/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("xrgrip").join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_load_writes_the_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xrgrip").join("config.toml");

        let settings = Settings::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(settings, Settings::default());

        // A second load reads the file it just wrote.
        let reloaded = Settings::load_or_init(&path).unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn modified_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.host.backend = BackendKind::Gamepad;
        settings.timing.gamepad_poll_interval_ms = 150;
        settings.interaction.default_ray_length = 25.0;
        settings.save(&path).unwrap();

        let reloaded = Settings::load_or_init(&path).unwrap();
        assert_eq!(reloaded, settings);
        assert_eq!(reloaded.session_settings().gamepad_poll_interval_ms, 150);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[host]\nbackend = \"gamepad\"\n").unwrap();

        let settings = Settings::load_or_init(&path).unwrap();
        assert_eq!(settings.host.backend, BackendKind::Gamepad);
        assert_eq!(settings.profiles, ProfileConfig::default());
    }

    #[test]
    fn malformed_config_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "not toml at all [[[").unwrap();
        assert!(matches!(
            Settings::load_or_init(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
