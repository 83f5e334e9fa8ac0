//! Colors for the visualizer window.
//!
//! The canvas stays close to black so fading notes read clearly; the toolbar,
//! status bar and settings window share one slightly lifted surface color.

use eframe::egui::{self, Color32, Stroke};

/// Note canvas background.
pub const CANVAS: Color32 = Color32::from_rgb(10, 10, 18);

/// Octave guide lines on the canvas.
pub const GUIDE: Color32 = Color32::from_rgb(28, 28, 42);

/// Toolbar, status bar and settings window.
pub const SURFACE: Color32 = Color32::from_rgb(32, 32, 48);

pub const TEXT: Color32 = Color32::from_rgb(232, 232, 240);
pub const TEXT_DIM: Color32 = Color32::from_rgb(150, 150, 168);
pub const TEXT_MUTED: Color32 = Color32::from_rgb(96, 96, 112);

/// Device or stream running.
pub const STATUS_OK: Color32 = Color32::from_rgb(120, 200, 130);
/// Device could not be opened.
pub const STATUS_WARN: Color32 = Color32::from_rgb(250, 180, 80);
/// Subsystem unavailable.
pub const STATUS_ERROR: Color32 = Color32::from_rgb(235, 90, 85);

/// Switch to egui's dark visuals with the canvas and surface colors above.
pub fn apply_theme(ctx: &egui::Context) {
    let mut visuals = egui::Visuals::dark();
    visuals.panel_fill = CANVAS;
    visuals.window_fill = SURFACE;
    visuals.window_stroke = Stroke::new(1.0, GUIDE);
    ctx.set_visuals(visuals);
}
