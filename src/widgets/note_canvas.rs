//! Note canvas widget.
//!
//! Draws the note trail as triangles: horizontal position follows the note
//! number across the full 0-127 range, size follows velocity, and each
//! triangle is blended by its remaining opacity.

use eframe::egui::{self, Color32, Pos2, Rect, Response, Sense, Shape, Stroke, Ui};

use crate::app::theme;
use crate::visualizer::NoteTrail;

/// Number of distinct MIDI notes.
const NOTE_COUNT: f32 = 128.0;

/// Triangle size at the lowest velocity, as a fraction of canvas height.
pub const MIN_SIZE_FRACTION: f32 = 0.05;

/// Triangle size at full velocity, as a fraction of canvas height.
pub const MAX_SIZE_FRACTION: f32 = 0.45;

/// Horizontal centre of `note` inside `rect`.
pub fn note_x(rect: Rect, note: u8) -> f32 {
    let note = note.min(127) as f32;
    rect.left() + (note + 0.5) / NOTE_COUNT * rect.width()
}

/// Side length of the triangle drawn for `velocity` in a canvas `height` tall.
pub fn triangle_size(height: f32, velocity: u8) -> f32 {
    let v = velocity.min(127) as f32 / 127.0;
    height * (MIN_SIZE_FRACTION + v * (MAX_SIZE_FRACTION - MIN_SIZE_FRACTION))
}

/// Vertices of the upward-pointing triangle for a note, apex first.
///
/// The triangle is centred vertically in `rect`.
pub fn note_triangle(rect: Rect, note: u8, velocity: u8) -> [Pos2; 3] {
    let x = note_x(rect, note);
    let size = triangle_size(rect.height(), velocity);
    let half = size / 2.0;
    let cy = rect.center().y;

    [
        Pos2::new(x, cy - half),
        Pos2::new(x + half, cy + half),
        Pos2::new(x - half, cy + half),
    ]
}

/// Faint vertical lines at every C so the keyboard range is readable.
fn draw_octave_guides(painter: &egui::Painter, rect: Rect) {
    let stroke = Stroke::new(1.0, theme::GUIDE);
    for c in (0..128u8).step_by(12) {
        let x = note_x(rect, c);
        painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], stroke);
    }
}

/// Draw the trail into the remaining space of `ui`, oldest note first.
pub fn note_canvas(ui: &mut Ui, trail: &NoteTrail, color: Color32) -> Response {
    let rect = ui.available_rect_before_wrap();
    let response = ui.allocate_rect(rect, Sense::hover());
    let painter = ui.painter_at(rect);

    painter.rect_filled(rect, 0.0, theme::CANVAS);
    draw_octave_guides(&painter, rect);

    for entry in trail.iter() {
        let points = note_triangle(rect, entry.note, entry.velocity);
        painter.add(Shape::convex_polygon(
            points.to_vec(),
            color.gamma_multiply(entry.opacity),
            Stroke::NONE,
        ));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> Rect {
        Rect::from_min_size(Pos2::new(0.0, 0.0), egui::vec2(1280.0, 400.0))
    }

    #[test]
    fn test_notes_spread_left_to_right() {
        let rect = canvas();
        assert!((note_x(rect, 0) - 5.0).abs() < 1e-4);
        assert!((note_x(rect, 127) - 1275.0).abs() < 1e-4);
        assert!(note_x(rect, 60) < note_x(rect, 61));
    }

    #[test]
    fn test_note_x_respects_offset() {
        let rect = Rect::from_min_size(Pos2::new(100.0, 50.0), egui::vec2(128.0, 10.0));
        assert!((note_x(rect, 10) - 110.5).abs() < 1e-4);
    }

    #[test]
    fn test_size_grows_with_velocity() {
        let soft = triangle_size(400.0, 1);
        let loud = triangle_size(400.0, 127);
        assert!(soft < loud);
        assert!((loud - 400.0 * MAX_SIZE_FRACTION).abs() < 1e-3);
        assert!((triangle_size(400.0, 0) - 400.0 * MIN_SIZE_FRACTION).abs() < 1e-3);
    }

    #[test]
    fn test_triangle_is_centred_and_points_up() {
        let rect = canvas();
        let [apex, right, left] = note_triangle(rect, 64, 100);

        let x = note_x(rect, 64);
        assert!((apex.x - x).abs() < 1e-4);
        assert!(apex.y < right.y);
        assert!((right.y - left.y).abs() < 1e-4);
        assert!(((right.x - x) - (x - left.x)).abs() < 1e-4);

        // Vertically centred on the canvas
        let mid = (apex.y + right.y) / 2.0;
        assert!((mid - rect.center().y).abs() < 1e-3);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let rect = canvas();
        assert_eq!(note_triangle(rect, 200, 200), note_triangle(rect, 127, 127));
    }
}
