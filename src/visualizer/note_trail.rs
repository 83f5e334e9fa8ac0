//! Rolling buffer of recently played notes.
//!
//! Every note-on enters the trail at full opacity. Each visual frame the
//! opacity of every entry is scaled down by the fade rate, and entries that
//! have become invisible are dropped. The trail is capped, so a burst of
//! notes pushes the oldest ones out first.

use std::collections::VecDeque;

use crate::engine::DeviceId;

/// Default maximum number of notes held in the trail.
pub const DEFAULT_TRAIL_CAPACITY: usize = 100;

/// Entries fainter than this are removed after a decay step.
pub const PRUNE_THRESHOLD: f32 = 0.01;

/// A single visualized note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailNote {
    /// MIDI note number (0-127).
    pub note: u8,
    /// Note-on velocity (1-127).
    pub velocity: u8,
    /// MIDI channel (0-15).
    pub channel: u8,
    /// Device the note arrived from.
    pub device: DeviceId,
    /// Current opacity, 1.0 when fresh.
    pub opacity: f32,
}

impl TrailNote {
    /// Create a fresh, fully opaque entry.
    pub fn new(device: DeviceId, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            note,
            velocity,
            channel,
            device,
            opacity: 1.0,
        }
    }
}

/// Insertion-ordered, capacity-bounded list of fading notes.
#[derive(Debug, Clone)]
pub struct NoteTrail {
    entries: VecDeque<TrailNote>,
    capacity: usize,
}

impl Default for NoteTrail {
    fn default() -> Self {
        Self::new(DEFAULT_TRAIL_CAPACITY)
    }
}

impl NoteTrail {
    /// Create an empty trail. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Maximum number of entries kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity, dropping the oldest entries if the trail is now too long.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Append a note at full opacity, evicting the oldest entry when over capacity.
    pub fn push(&mut self, mut note: TrailNote) {
        note.opacity = 1.0;
        self.entries.push_back(note);
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Apply one frame of fading and prune expired entries.
    ///
    /// `fade_rate` is a percentage per frame, clamped to 0-100. When
    /// `fading_enabled` is false opacities are left untouched.
    pub fn decay(&mut self, fade_rate: f32, fading_enabled: bool) {
        if fading_enabled {
            let factor = 1.0 - fade_rate.clamp(0.0, 100.0) / 100.0;
            for entry in self.entries.iter_mut() {
                entry.opacity *= factor;
            }
        }
        self.entries.retain(|entry| entry.opacity >= PRUNE_THRESHOLD);
    }

    /// Apply `frames` decay steps in a row.
    pub fn decay_frames(&mut self, frames: u32, fade_rate: f32, fading_enabled: bool) {
        for _ in 0..frames {
            if self.entries.is_empty() {
                break;
            }
            self.decay(fade_rate, fading_enabled);
        }
    }

    /// Iterate entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TrailNote> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(n: u8) -> TrailNote {
        TrailNote::new(DeviceId(0), 0, n, 100)
    }

    #[test]
    fn test_push_starts_fully_opaque() {
        let mut trail = NoteTrail::default();
        let mut faded = note(60);
        faded.opacity = 0.2;
        trail.push(faded);

        let first = trail.iter().next().unwrap();
        assert_eq!(first.note, 60);
        assert!((first.opacity - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut trail = NoteTrail::default();
        for n in 0..=DEFAULT_TRAIL_CAPACITY as u8 {
            trail.push(note(n));
        }

        assert_eq!(trail.len(), DEFAULT_TRAIL_CAPACITY);
        // Note 0 was pushed first and must have been evicted
        assert_eq!(trail.iter().next().unwrap().note, 1);
        assert_eq!(trail.iter().last().unwrap().note, DEFAULT_TRAIL_CAPACITY as u8);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut trail = NoteTrail::new(4);
        for n in [64, 12, 99, 40, 7] {
            trail.push(note(n));
        }
        let notes: Vec<u8> = trail.iter().map(|e| e.note).collect();
        assert_eq!(notes, vec![12, 99, 40, 7]);
    }

    #[test]
    fn test_decay_is_multiplicative() {
        let mut trail = NoteTrail::default();
        trail.push(note(60));

        trail.decay(10.0, true);
        let opacity = trail.iter().next().unwrap().opacity;
        assert!((opacity - 0.9).abs() < 1e-6);

        trail.decay(10.0, true);
        let opacity = trail.iter().next().unwrap().opacity;
        assert!((opacity - 0.81).abs() < 1e-6);
    }

    #[test]
    fn test_decay_prunes_expired_entries() {
        let mut trail = NoteTrail::default();
        trail.push(note(60));

        // 0.5^7 = 0.0078 < 0.01
        for _ in 0..6 {
            trail.decay(50.0, true);
        }
        assert_eq!(trail.len(), 1);
        trail.decay(50.0, true);
        assert!(trail.is_empty());
    }

    #[test]
    fn test_decay_disabled_keeps_entries() {
        let mut trail = NoteTrail::default();
        trail.push(note(60));
        trail.push(note(62));

        for _ in 0..1000 {
            trail.decay(50.0, false);
        }
        assert_eq!(trail.len(), 2);
        assert!(trail.iter().all(|e| (e.opacity - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_full_fade_rate_clears_in_one_frame() {
        let mut trail = NoteTrail::default();
        trail.push(note(60));
        trail.push(note(61));
        trail.decay(100.0, true);
        assert!(trail.is_empty());
    }

    #[test]
    fn test_fade_rate_is_clamped() {
        let mut trail = NoteTrail::default();
        trail.push(note(60));

        // Negative rates must not brighten entries
        trail.decay(-20.0, true);
        assert!((trail.iter().next().unwrap().opacity - 1.0).abs() < f32::EPSILON);

        trail.decay(250.0, true);
        assert!(trail.is_empty());
    }

    #[test]
    fn test_zero_fade_rate_never_prunes() {
        let mut trail = NoteTrail::default();
        trail.push(note(60));
        trail.decay_frames(500, 0.0, true);
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn test_decay_frames_matches_repeated_decay() {
        let mut a = NoteTrail::default();
        let mut b = NoteTrail::default();
        a.push(note(60));
        b.push(note(60));

        a.decay_frames(3, 20.0, true);
        for _ in 0..3 {
            b.decay(20.0, true);
        }
        assert_eq!(a.iter().next(), b.iter().next());
    }

    #[test]
    fn test_set_capacity_truncates_oldest() {
        let mut trail = NoteTrail::new(10);
        for n in 0..10 {
            trail.push(note(n));
        }
        trail.set_capacity(3);
        let notes: Vec<u8> = trail.iter().map(|e| e.note).collect();
        assert_eq!(notes, vec![7, 8, 9]);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut trail = NoteTrail::new(0);
        trail.push(note(1));
        trail.push(note(2));
        assert_eq!(trail.len(), 1);
        assert_eq!(trail.iter().next().unwrap().note, 2);
    }
}
