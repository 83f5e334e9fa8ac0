//! Main application struct for iLumidi
//!
//! Contains the VisualizerApp which implements eframe::App. It owns the MIDI
//! and audio engines, drains note events every frame, fades the note trail,
//! and draws the canvas and the settings window.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui::{self, Align, Color32, Layout, RichText};
use rtrb::Consumer;

use super::settings_window::{DeviceStatus, SettingsWindow};
use super::theme;
use crate::engine::{
    AudioEngine, AudioError, DeviceId, DeviceMidiEvent, MidiEngine, MidiError, DEVICE_SCAN_INTERVAL,
};
use crate::persistence::{self, Settings};
use crate::visualizer::Scene;
use crate::widgets::note_canvas;

/// Client name registered with the MIDI backend.
pub const MIDI_CLIENT_NAME: &str = "iLumidi";

/// Quiet period after the last settings edit before they are written to disk.
const SETTINGS_SAVE_DELAY: Duration = Duration::from_millis(500);

/// Startup options, usually from the command line.
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Settings file; `None` keeps settings in memory only.
    pub settings_path: Option<PathBuf>,
    /// Open the audio output stream.
    pub enable_audio: bool,
    /// Overrides the frame rate stored in the settings.
    pub frames_per_second: Option<u32>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            settings_path: persistence::default_path(),
            enable_audio: true,
            frames_per_second: None,
        }
    }
}

/// Main application state for the visualizer
pub struct VisualizerApp {
    settings: Settings,
    settings_path: Option<PathBuf>,
    /// Set when settings changed and are not yet saved.
    settings_dirty_since: Option<Instant>,

    /// Audio engine handle; `None` when audio was disabled on the command line
    audio_engine: Option<Result<AudioEngine, AudioError>>,

    midi_engine: Result<MidiEngine, MidiError>,
    midi_events: Option<Consumer<DeviceMidiEvent>>,

    scene: Scene,
    settings_window: SettingsWindow,

    /// Last device error to display
    status_message: Option<String>,

    /// Whether theme has been applied
    theme_applied: bool,
}

impl VisualizerApp {
    /// Create the app, open audio output and every enabled MIDI device.
    pub fn new(ctx: &egui::Context, options: AppOptions) -> Self {
        let mut settings = match &options.settings_path {
            Some(path) => persistence::load_or_default(path),
            None => Settings::default(),
        };
        if let Some(fps) = options.frames_per_second {
            settings.frames_per_second = fps;
        }
        let settings = settings.sanitized();

        let audio_engine = options.enable_audio.then(|| {
            let result = AudioEngine::new().and_then(|mut engine| {
                engine.start()?;
                Ok(engine)
            });
            if let Err(e) = &result {
                log::warn!("audio output unavailable: {}", e);
            }
            result
        });

        let (midi_engine, midi_events) = match MidiEngine::new(MIDI_CLIENT_NAME) {
            Ok((engine, events)) => {
                let repaint_ctx = ctx.clone();
                engine.set_waker(Arc::new(move || repaint_ctx.request_repaint()));
                (Ok(engine), Some(events))
            }
            Err(e) => {
                log::error!("MIDI unavailable: {}", e);
                (Err(e), None)
            }
        };

        let mut app = Self {
            scene: Scene::new(&settings),
            settings,
            settings_path: options.settings_path,
            settings_dirty_since: None,
            audio_engine,
            midi_engine,
            midi_events,
            settings_window: SettingsWindow::new(),
            status_message: None,
            theme_applied: false,
        };
        app.reconcile_devices(true);
        app
    }

    /// Open and close devices to match the settings, then refresh the
    /// filter and the settings window.
    ///
    /// `rebuild_toggles` is set when the device list itself changed.
    fn reconcile_devices(&mut self, rebuild_toggles: bool) {
        let Ok(engine) = self.midi_engine.as_mut() else {
            return;
        };

        let settings = &self.settings;
        let failures = engine.sync_open_devices(|d| settings.device(&d.name).is_active());
        for (device, err) in &failures {
            log::warn!("ignoring MIDI device '{}': {}", device.name, err);
        }
        if let Some((device, _)) = failures.last() {
            self.status_message = Some(format!("Could not open MIDI device '{}'", device.name));
        }

        self.scene.rebuild_filter(engine.devices(), settings);

        let engine: &MidiEngine = engine;
        let status = |id: DeviceId| device_status(engine, id);
        if rebuild_toggles {
            self.settings_window.rebuild_devices(engine.devices(), status);
        } else {
            self.settings_window.update_status(status);
        }
    }

    fn mark_settings_dirty(&mut self) {
        self.settings_dirty_since = Some(Instant::now());
    }

    /// Write settings once edits have settled, or immediately with `force`.
    fn flush_settings(&mut self, force: bool) {
        let Some(since) = self.settings_dirty_since else {
            return;
        };
        if !force && since.elapsed() < SETTINGS_SAVE_DELAY {
            return;
        }
        self.settings_dirty_since = None;

        let Some(path) = &self.settings_path else {
            return;
        };
        match persistence::save_to_file(&self.settings, path) {
            Ok(()) => log::debug!("saved settings to {}", path.display()),
            Err(e) => {
                log::error!("failed to save settings to {}: {}", path.display(), e);
                self.status_message = Some(format!("Settings not saved: {}", e));
            }
        }
    }

    fn note_color(&self) -> Color32 {
        let [r, g, b] = self.settings.note_color;
        Color32::from_rgb(r, g, b)
    }

    /// Draw the top toolbar with the settings toggle and device status
    fn draw_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.add_space(8.0);

            ui.label(RichText::new("iLumidi")
                .size(18.0)
                .color(theme::TEXT)
                .strong());

            ui.add_space(20.0);
            ui.separator();
            ui.add_space(20.0);

            let settings_text = if self.settings_window.open { "⚙ Close Settings" } else { "⚙ Settings" };
            if ui.button(settings_text).clicked() {
                self.settings_window.toggle_open();
            }

            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                ui.add_space(8.0);

                match &self.audio_engine {
                    Some(Ok(engine)) if engine.is_running() => {
                        ui.label(RichText::new(format!(
                            "{}Hz • {}ch",
                            engine.sample_rate(),
                            engine.channels()
                        )).color(theme::TEXT_DIM).small());
                    }
                    Some(Ok(_)) => {
                        ui.label(RichText::new("○ Audio stopped").color(theme::TEXT_MUTED).small());
                    }
                    Some(Err(_)) => {
                        ui.label(RichText::new("⚠ No audio").color(theme::STATUS_WARN).small());
                    }
                    None => {}
                }

                ui.add_space(12.0);

                match &self.midi_engine {
                    Ok(engine) => {
                        let open = engine.open_devices().len();
                        let total = engine.devices().len();
                        let color = if open > 0 { theme::STATUS_OK } else { theme::TEXT_MUTED };
                        ui.label(RichText::new(format!("● MIDI {}/{}", open, total)).color(color).small());
                    }
                    Err(_) => {
                        ui.label(RichText::new("⚠ MIDI unavailable").color(theme::STATUS_ERROR).small());
                    }
                }
            });
        });
    }

    /// Draw the bottom status bar
    fn draw_status_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.add_space(8.0);

            let error = match (&self.midi_engine, &self.audio_engine) {
                (Err(e), _) => Some(e.to_string()),
                (_, Some(Err(e))) => Some(e.to_string()),
                _ => self.status_message.clone(),
            };

            if let Some(error) = error {
                ui.label(RichText::new(format!("⚠ {}", error))
                    .color(theme::STATUS_ERROR)
                    .small());
            } else {
                ui.label(RichText::new(format!("{} notes", self.scene.trail().len()))
                    .color(theme::TEXT_DIM)
                    .small());
            }

            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                ui.label(RichText::new(concat!("iLumidi v", env!("CARGO_PKG_VERSION")))
                    .color(theme::TEXT_MUTED)
                    .small());
            });
        });
    }
}

/// Pick the delay before the next frame when no input arrives.
///
/// Fading wins, then a pending settings save, then polling for hot-plugged
/// devices. `None` means egui may sleep until input.
fn next_repaint(
    fade_interval: Option<Duration>,
    settings_dirty: bool,
    watching_devices: bool,
) -> Option<Duration> {
    fade_interval
        .or(settings_dirty.then_some(SETTINGS_SAVE_DELAY))
        .or(watching_devices.then_some(DEVICE_SCAN_INTERVAL))
}

fn device_status(engine: &MidiEngine, id: DeviceId) -> DeviceStatus {
    if engine.is_open(id) {
        DeviceStatus::Open
    } else if engine.is_failed(id) {
        DeviceStatus::Unavailable
    } else {
        DeviceStatus::Closed
    }
}

impl eframe::App for VisualizerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Apply theme on first frame
        if !self.theme_applied {
            theme::apply_theme(ctx);
            self.theme_applied = true;
        }

        let change = self
            .midi_engine
            .as_mut()
            .ok()
            .and_then(|engine| engine.refresh_devices());
        if let Some(change) = change {
            // Ports moving under the same names keep the toggle rows
            self.reconcile_devices(change.devices_changed());
        }

        let pending = self
            .midi_events
            .as_mut()
            .into_iter()
            .flat_map(|events| std::iter::from_fn(move || events.pop().ok()));
        self.scene.frame(Instant::now(), &self.settings, pending);

        egui::TopBottomPanel::top("toolbar")
            .frame(egui::Frame::none()
                .fill(theme::SURFACE)
                .inner_margin(egui::Margin::symmetric(0.0, 8.0)))
            .show(ctx, |ui| {
                self.draw_toolbar(ui);
            });

        egui::TopBottomPanel::bottom("status_bar")
            .frame(egui::Frame::none()
                .fill(theme::SURFACE)
                .inner_margin(egui::Margin::symmetric(0.0, 4.0)))
            .show(ctx, |ui| {
                self.draw_status_bar(ui);
            });

        let color = self.note_color();
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                note_canvas(ui, self.scene.trail(), color);
            });

        // Apply settings edits after drawing (to avoid borrow checker issues)
        let changes = self.settings_window.show(ctx, &mut self.settings);
        if changes.clear_trail {
            self.scene.clear();
        }
        if changes.routing {
            self.reconcile_devices(false);
        }
        if changes.any() {
            self.scene.apply_settings(&self.settings);
            self.mark_settings_dirty();
        }
        self.flush_settings(false);

        let delay = next_repaint(
            self.scene.repaint_after(&self.settings),
            self.settings_dirty_since.is_some(),
            self.midi_engine.is_ok(),
        );
        if let Some(delay) = delay {
            ctx.request_repaint_after(delay);
        }
    }
}

impl Drop for VisualizerApp {
    fn drop(&mut self) {
        self.flush_settings(true);
        if let Some(Ok(engine)) = self.audio_engine.as_mut() {
            if let Err(e) = engine.stop() {
                log::warn!("{}", e);
            }
        }
    }
}
