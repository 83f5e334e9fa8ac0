//! Application module
//!
//! Contains the main egui application, the settings window, and theme definitions.

pub mod settings_window;
pub mod theme;
pub mod visualizer_app;

pub use settings_window::{DeviceStatus, DeviceToggle, SettingsChanges, SettingsWindow};
pub use visualizer_app::{AppOptions, VisualizerApp, MIDI_CLIENT_NAME};
