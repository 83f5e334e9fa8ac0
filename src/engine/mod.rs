//! Engine module
//!
//! Device I/O for the visualizer: MIDI input lifecycle, note routing, and
//! the audio output stream.

pub mod audio_engine;
pub mod midi_engine;
pub mod routing;

pub use audio_engine::{AudioEngine, AudioError};
pub use midi_engine::{
    DeviceId, DeviceMidiEvent, MidiDeviceInfo, MidiEngine, MidiError, MidiEvent, Waker,
    DEFAULT_MIDI_BUFFER_SIZE, DEVICE_SCAN_INTERVAL,
};
pub use routing::{
    ChannelMask, ConnectionPlan, DeviceRoster, NoteFilter, RosterChange, RoutedNote, MIDI_CHANNELS,
};
