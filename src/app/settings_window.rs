//! Settings window.
//!
//! Lets the user choose which MIDI devices and channels feed the visualizer,
//! the fade rate, whether fading is on at all, and the note color. The list
//! of device toggles is rebuilt whenever the set of visible devices changes.

use eframe::egui::{self, Color32, RichText};

use super::theme;
use crate::engine::{ChannelMask, DeviceId, MidiDeviceInfo, MIDI_CHANNELS};
use crate::persistence::Settings;

/// Channel toggles per grid row.
const CHANNEL_COLUMNS: u8 = 8;

/// Connection state shown next to a device toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Open,
    Closed,
    Unavailable,
}

/// One device toggle row in the settings window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceToggle {
    pub id: DeviceId,
    pub name: String,
    pub status: DeviceStatus,
}

/// What the user changed this frame, applied by the caller after drawing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SettingsChanges {
    /// Fade or color settings changed.
    pub appearance: bool,
    /// A device or channel toggle changed.
    pub routing: bool,
    /// The user asked to clear the screen.
    pub clear_trail: bool,
}

impl SettingsChanges {
    pub fn any(&self) -> bool {
        self.appearance || self.routing
    }
}

#[derive(Debug, Default)]
pub struct SettingsWindow {
    pub open: bool,
    toggles: Vec<DeviceToggle>,
}

impl SettingsWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_open(&mut self) {
        self.open = !self.open;
    }

    /// Current device toggles, in device enumeration order.
    pub fn toggles(&self) -> &[DeviceToggle] {
        &self.toggles
    }

    /// Rebuild the device toggles from a fresh device list.
    pub fn rebuild_devices<F>(&mut self, devices: &[MidiDeviceInfo], status: F)
    where
        F: Fn(DeviceId) -> DeviceStatus,
    {
        self.toggles = devices
            .iter()
            .map(|d| DeviceToggle {
                id: d.id,
                name: d.name.clone(),
                status: status(d.id),
            })
            .collect();
        log::debug!("settings: rebuilt {} device toggle(s)", self.toggles.len());
    }

    /// Refresh the status badges without rebuilding the rows.
    pub fn update_status<F>(&mut self, status: F)
    where
        F: Fn(DeviceId) -> DeviceStatus,
    {
        for toggle in &mut self.toggles {
            toggle.status = status(toggle.id);
        }
    }

    /// Draw the window if open and apply edits to `settings`.
    pub fn show(&mut self, ctx: &egui::Context, settings: &mut Settings) -> SettingsChanges {
        let mut changes = SettingsChanges::default();
        if !self.open {
            return changes;
        }

        let mut open = self.open;
        egui::Window::new("Settings")
            .open(&mut open)
            .default_width(380.0)
            .resizable(true)
            .collapsible(false)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.draw_devices(ui, settings, &mut changes);
                    ui.add_space(8.0);
                    ui.separator();
                    draw_appearance(ui, settings, &mut changes);
                });
            });
        self.open = open;

        changes
    }

    fn draw_devices(
        &self,
        ui: &mut egui::Ui,
        settings: &mut Settings,
        changes: &mut SettingsChanges,
    ) {
        ui.label(RichText::new("MIDI inputs").strong().color(theme::TEXT));
        ui.add_space(4.0);

        if self.toggles.is_empty() {
            ui.label(RichText::new("No MIDI input devices found").color(theme::TEXT_MUTED));
            return;
        }

        for toggle in &self.toggles {
            ui.push_id(toggle.id.0, |ui| {
                // Edit a copy so untouched devices never get a saved entry
                let mut device = settings.device(&toggle.name);
                let mut edited = false;

                ui.horizontal(|ui| {
                    if ui.checkbox(&mut device.enabled, toggle.name.as_str()).changed() {
                        edited = true;
                    }
                    let (text, color) = status_badge(toggle.status);
                    ui.label(RichText::new(text).color(color).small());
                });

                ui.add_enabled_ui(device.enabled, |ui| {
                    egui::CollapsingHeader::new("Channels")
                        .default_open(false)
                        .show(ui, |ui| {
                            let mut all = device.channels.is_all();
                            if ui.checkbox(&mut all, "All channels").changed() {
                                device.channels = if all {
                                    ChannelMask::ALL
                                } else {
                                    ChannelMask::NONE
                                };
                                edited = true;
                            }

                            egui::Grid::new("channel_grid").show(ui, |ui| {
                                for channel in 0..MIDI_CHANNELS {
                                    let mut on = device.channels.contains(channel);
                                    if ui.checkbox(&mut on, format!("{}", channel + 1)).changed() {
                                        device.channels.set(channel, on);
                                        edited = true;
                                    }
                                    if (channel + 1) % CHANNEL_COLUMNS == 0 {
                                        ui.end_row();
                                    }
                                }
                            });
                        });
                });

                if edited {
                    *settings.device_mut(&toggle.name) = device;
                    changes.routing = true;
                }
            });
        }
    }
}

fn status_badge(status: DeviceStatus) -> (&'static str, Color32) {
    match status {
        DeviceStatus::Open => ("● open", theme::STATUS_OK),
        DeviceStatus::Closed => ("○ closed", theme::TEXT_MUTED),
        DeviceStatus::Unavailable => ("⚠ unavailable", theme::STATUS_WARN),
    }
}

fn draw_appearance(ui: &mut egui::Ui, settings: &mut Settings, changes: &mut SettingsChanges) {
    ui.label(RichText::new("Appearance").strong().color(theme::TEXT));
    ui.add_space(4.0);

    let fading = settings.fading_enabled;
    let slider = egui::Slider::new(&mut settings.fade_rate, 0.0..=100.0)
        .text("Fade rate")
        .suffix(" %");
    if ui.add_enabled(fading, slider).changed() {
        changes.appearance = true;
    }

    let mut disabled = !settings.fading_enabled;
    if ui.checkbox(&mut disabled, "Disable fading").changed() {
        settings.fading_enabled = !disabled;
        changes.appearance = true;
    }

    ui.horizontal(|ui| {
        ui.label("Note color");
        if ui.color_edit_button_srgb(&mut settings.note_color).changed() {
            changes.appearance = true;
        }
    });

    ui.add_space(8.0);
    if ui.button("Clear notes").clicked() {
        changes.clear_trail = true;
    }
}
