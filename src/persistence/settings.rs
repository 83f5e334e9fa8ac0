//! User settings and their JSON file format.
//!
//! Settings capture everything the settings window edits: the fade rate,
//! whether fading is on, the note color, and which devices and channels feed
//! the visualizer. Devices are keyed by name so choices survive restarts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::ChannelMask;
use crate::visualizer::DEFAULT_TRAIL_CAPACITY;

/// Current settings format version.
/// Increment this when making breaking changes to the format.
pub const SETTINGS_VERSION: u32 = 1;

/// Default fade, in percent of opacity lost per frame.
pub const DEFAULT_FADE_RATE: f32 = 5.0;

/// Default visual frame rate driving the fade.
pub const DEFAULT_FRAMES_PER_SECOND: u32 = 60;

/// Default note color (sky blue).
pub const DEFAULT_NOTE_COLOR: [u8; 3] = [66, 165, 245];

/// Settings file name inside the config directory.
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Application directory name inside the platform config directory.
const APP_DIR_NAME: &str = "ilumidi";

/// Per-device input choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Whether notes from this device are visualized.
    pub enabled: bool,
    /// Channels accepted from this device.
    pub channels: ChannelMask,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            channels: ChannelMask::ALL,
        }
    }
}

impl DeviceSettings {
    /// Whether the device is open for at least one channel.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.channels.is_empty()
    }
}

/// Visualizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Settings format version for future compatibility.
    pub version: u32,
    /// Opacity lost per frame, in percent (0-100).
    pub fade_rate: f32,
    /// When false notes stay on screen until pushed out of the trail.
    pub fading_enabled: bool,
    /// RGB color used to draw notes.
    pub note_color: [u8; 3],
    /// Visual frames per second; one fade step is applied per frame.
    pub frames_per_second: u32,
    /// Maximum number of notes on screen.
    pub trail_capacity: usize,
    /// Device choices keyed by device name. Unlisted devices use the defaults.
    pub devices: BTreeMap<String, DeviceSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            fade_rate: DEFAULT_FADE_RATE,
            fading_enabled: true,
            note_color: DEFAULT_NOTE_COLOR,
            frames_per_second: DEFAULT_FRAMES_PER_SECOND,
            trail_capacity: DEFAULT_TRAIL_CAPACITY,
            devices: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Check if this settings version is compatible with the current format.
    pub fn is_compatible(&self) -> bool {
        self.version <= SETTINGS_VERSION
    }

    /// Choices for `name`, falling back to the defaults for unknown devices.
    pub fn device(&self, name: &str) -> DeviceSettings {
        self.devices.get(name).copied().unwrap_or_default()
    }

    /// Mutable choices for `name`, inserting the defaults if missing.
    pub fn device_mut(&mut self, name: &str) -> &mut DeviceSettings {
        self.devices.entry(name.to_string()).or_default()
    }

    /// Clamp every value into its valid range.
    pub fn sanitized(mut self) -> Self {
        self.fade_rate = if self.fade_rate.is_finite() {
            self.fade_rate.clamp(0.0, 100.0)
        } else {
            DEFAULT_FADE_RATE
        };
        self.frames_per_second = self.frames_per_second.clamp(1, 240);
        self.trail_capacity = self.trail_capacity.max(1);
        self
    }
}

/// Error type for settings persistence.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// File I/O error.
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Incompatible settings version.
    #[error("Incompatible settings version: found {found}, expected <= {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },
}

/// Default settings location: `<config dir>/ilumidi/settings.json`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Save settings to a JSON file, creating parent directories as needed.
pub fn save_to_file(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load settings from a JSON file.
pub fn load_from_file(path: &Path) -> Result<Settings, SettingsError> {
    let json = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&json)?;

    // Version check
    if !settings.is_compatible() {
        return Err(SettingsError::IncompatibleVersion {
            found: settings.version,
            expected: SETTINGS_VERSION,
        });
    }

    Ok(settings.sanitized())
}

/// Load settings, falling back to the defaults when the file is missing or unusable.
pub fn load_or_default(path: &Path) -> Settings {
    match load_from_file(path) {
        Ok(settings) => {
            log::info!("loaded settings from {}", path.display());
            settings
        }
        Err(SettingsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("no settings file at {}, using defaults", path.display());
            Settings::default()
        }
        Err(e) => {
            log::warn!("ignoring settings file {}: {}", path.display(), e);
            Settings::default()
        }
    }
}
