//! Visualizer state
//!
//! The fading note trail, the clock that drives its decay, and the scene
//! combining them with note routing.

pub mod frame_clock;
pub mod note_trail;
pub mod scene;

pub use frame_clock::{FrameClock, MAX_CATCH_UP_FRAMES};
pub use note_trail::{NoteTrail, TrailNote, DEFAULT_TRAIL_CAPACITY, PRUNE_THRESHOLD};
pub use scene::Scene;
