//! iLumidi Library
//!
//! Core library for the MIDI note visualizer.

pub mod app;
pub mod engine;
pub mod persistence;
pub mod visualizer;
pub mod widgets;
