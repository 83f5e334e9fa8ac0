//! Persistence module
//!
//! Settings save/load functionality using serde and JSON.

pub mod settings;

pub use settings::{
    default_path, load_from_file, load_or_default, save_to_file, DeviceSettings, Settings,
    SettingsError, SETTINGS_VERSION,
};
