//! Per-frame visualizer state.
//!
//! Ties the note trail, the frame clock and the note filter together so the
//! UI only has to feed events in and ask how much time passed.

use std::time::{Duration, Instant};

use super::frame_clock::FrameClock;
use super::note_trail::{NoteTrail, TrailNote};
use crate::engine::{DeviceMidiEvent, MidiDeviceInfo, NoteFilter};
use crate::persistence::Settings;

#[derive(Debug)]
pub struct Scene {
    trail: NoteTrail,
    clock: FrameClock,
    filter: NoteFilter,
}

impl Scene {
    pub fn new(settings: &Settings) -> Self {
        Self {
            trail: NoteTrail::new(settings.trail_capacity),
            clock: FrameClock::new(settings.frames_per_second),
            filter: NoteFilter::new(),
        }
    }

    /// Pick up capacity and frame rate changes.
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.trail.set_capacity(settings.trail_capacity);
        self.clock.set_frames_per_second(settings.frames_per_second);
    }

    /// Recompute which devices and channels are let through.
    pub fn rebuild_filter(&mut self, devices: &[MidiDeviceInfo], settings: &Settings) {
        self.filter.clear();
        for device in devices {
            let choice = settings.device(&device.name);
            if choice.enabled {
                self.filter.allow(device.id, choice.channels);
            }
        }
    }

    /// Feed one incoming event. Returns true if it added a note to the trail.
    pub fn ingest(&mut self, event: &DeviceMidiEvent) -> bool {
        match self.filter.route(event) {
            Some(note) => {
                self.trail.push(TrailNote::new(
                    note.device,
                    note.channel,
                    note.note,
                    note.velocity,
                ));
                true
            }
            None => false,
        }
    }

    /// Apply one fade step for every frame elapsed since the last call.
    ///
    /// Returns the number of frames applied.
    pub fn advance(&mut self, now: Instant, settings: &Settings) -> u32 {
        let frames = self.clock.tick(now);
        self.trail
            .decay_frames(frames, settings.fade_rate, settings.fading_enabled);
        frames
    }

    /// Run one UI frame: fade for the time elapsed, then add the notes that
    /// arrived since the previous frame.
    ///
    /// Elapsed frames only age notes that were already on screen, so a note
    /// played after an idle stretch is drawn at full opacity first.
    pub fn frame<I>(&mut self, now: Instant, settings: &Settings, events: I) -> u32
    where
        I: IntoIterator<Item = DeviceMidiEvent>,
    {
        let frames = self.advance(now, settings);
        for event in events {
            self.ingest(&event);
        }
        frames
    }

    /// Whether further frames would change what is on screen.
    pub fn is_animating(&self, settings: &Settings) -> bool {
        !self.trail.is_empty() && settings.fading_enabled && settings.fade_rate > 0.0
    }

    /// Delay until the next frame is due, or `None` when nothing is fading.
    pub fn repaint_after(&self, settings: &Settings) -> Option<Duration> {
        self.is_animating(settings).then(|| self.clock.interval())
    }

    pub fn trail(&self) -> &NoteTrail {
        &self.trail
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn clear(&mut self) {
        self.trail.clear();
    }
}
