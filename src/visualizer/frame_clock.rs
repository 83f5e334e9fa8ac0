//! Fixed-rate frame clock.
//!
//! egui repaints whenever input arrives, so the number of `update` calls per
//! second is not stable. The clock converts wall time into whole visual
//! frames so the fade speed does not depend on how often the UI redraws.

use std::time::{Duration, Instant};

/// Upper bound on frames reported by a single `tick`.
pub const MAX_CATCH_UP_FRAMES: u32 = 120;

#[derive(Debug, Clone)]
pub struct FrameClock {
    interval: Duration,
    last: Option<Instant>,
}

impl FrameClock {
    /// Create a clock ticking `frames_per_second` times a second (minimum 1).
    pub fn new(frames_per_second: u32) -> Self {
        Self {
            interval: Self::interval_for(frames_per_second),
            last: None,
        }
    }

    fn interval_for(frames_per_second: u32) -> Duration {
        Duration::from_secs_f64(1.0 / frames_per_second.max(1) as f64)
    }

    /// Time between two frames.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Change the frame rate without losing the current phase.
    pub fn set_frames_per_second(&mut self, frames_per_second: u32) {
        self.interval = Self::interval_for(frames_per_second);
    }

    /// Number of whole frames elapsed since the previous tick.
    ///
    /// The first call starts the clock and returns 0. Leftover time shorter
    /// than one frame carries over to the next call.
    pub fn tick(&mut self, now: Instant) -> u32 {
        let Some(last) = self.last else {
            self.last = Some(now);
            return 0;
        };

        let elapsed = now.saturating_duration_since(last);
        let frames = (elapsed.as_nanos() / self.interval.as_nanos().max(1)) as u64;

        if frames == 0 {
            return 0;
        }

        if frames > MAX_CATCH_UP_FRAMES as u64 {
            // After a long stall (window hidden, laptop asleep) restart the phase
            self.last = Some(now);
            return MAX_CATCH_UP_FRAMES;
        }

        self.last = Some(last + self.interval * frames as u32);
        frames as u32
    }
}
