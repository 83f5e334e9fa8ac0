//! iLumidi - MIDI note visualizer
//!
//! Entry point for the application.

use std::path::PathBuf;

use clap::Parser;
use eframe::egui;
use ilumidi::app::{AppOptions, VisualizerApp};
use ilumidi::persistence;

#[derive(Parser, Debug)]
#[command(version, about = "Visualize incoming MIDI notes as fading triangles")]
struct Args {
    /// Settings file (defaults to the platform config directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Do not persist settings changes
    #[arg(long, conflicts_with = "settings")]
    no_save: bool,

    /// Do not open the audio output stream
    #[arg(long)]
    no_audio: bool,

    /// Visual frame rate driving the fade (overrides the saved setting)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=240))]
    fps: Option<u32>,
}

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings_path = if args.no_save {
        None
    } else {
        args.settings.or_else(persistence::default_path)
    };
    if let Some(path) = &settings_path {
        log::info!("settings file: {}", path.display());
    }

    let app_options = AppOptions {
        settings_path,
        enable_audio: !args.no_audio,
        frames_per_second: args.fps,
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([800.0, 600.0])
            .with_title("iLumidi"),
        ..Default::default()
    };

    eframe::run_native(
        "iLumidi",
        options,
        Box::new(|cc| Ok(Box::new(VisualizerApp::new(&cc.egui_ctx, app_options)))),
    )
}
