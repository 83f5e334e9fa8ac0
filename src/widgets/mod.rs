//! Custom widgets
//!
//! Drawing helpers for the visualizer window.

pub mod note_canvas;

pub use note_canvas::{note_canvas, note_triangle, note_x, triangle_size};
