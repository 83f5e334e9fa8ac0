//! MIDI Engine
//!
//! Discovers MIDI input devices and keeps a connection open for every device
//! the user enabled. Uses midir for cross-platform MIDI access and rtrb for
//! lock-free hand-off of note events from the driver threads to the UI.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use midir::{Ignore, MidiInput, MidiInputConnection, MidiInputPort};
use rtrb::{Consumer, Producer, RingBuffer};
use thiserror::Error;

use super::routing::{DeviceRoster, RosterChange};

/// Default buffer size for MIDI events.
pub const DEFAULT_MIDI_BUFFER_SIZE: usize = 512;

/// How often the background thread rescans the port list.
pub const DEVICE_SCAN_INTERVAL: Duration = Duration::from_secs(2);

/// Granularity at which the scan thread checks for shutdown.
const SCAN_POLL_STEP: Duration = Duration::from_millis(100);

/// Identifier of a MIDI input device, stable for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Information about a MIDI input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiDeviceInfo {
    /// Stable device id.
    pub id: DeviceId,
    /// Human-readable device name, unique among the visible devices.
    pub name: String,
    /// Backend identifier of the port currently behind this device.
    pub port_id: String,
}

/// MIDI event types the visualizer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    /// Note On event.
    NoteOn {
        /// MIDI channel (0-15).
        channel: u8,
        /// Note number (0-127).
        note: u8,
        /// Velocity (1-127).
        velocity: u8,
    },
    /// Note Off event.
    NoteOff {
        /// MIDI channel (0-15).
        channel: u8,
        /// Note number (0-127).
        note: u8,
        /// Release velocity (0-127, often ignored).
        velocity: u8,
    },
}

impl MidiEvent {
    /// Parse a MIDI event from raw bytes.
    /// Returns None for unsupported or malformed messages.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        let channel = status & 0x0F;

        match status & 0xF0 {
            0x90 => {
                let [note, velocity, ..] = *rest else {
                    return None;
                };
                let (note, velocity) = (note & 0x7F, velocity & 0x7F);
                // Note On with velocity 0 is a Note Off
                if velocity == 0 {
                    Some(MidiEvent::NoteOff {
                        channel,
                        note,
                        velocity: 0,
                    })
                } else {
                    Some(MidiEvent::NoteOn {
                        channel,
                        note,
                        velocity,
                    })
                }
            }
            0x80 => {
                let [note, velocity, ..] = *rest else {
                    return None;
                };
                Some(MidiEvent::NoteOff {
                    channel,
                    note: note & 0x7F,
                    velocity: velocity & 0x7F,
                })
            }
            _ => None,
        }
    }
}

/// MIDI event tagged with the device it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMidiEvent {
    /// Source device.
    pub device: DeviceId,
    /// The MIDI event.
    pub event: MidiEvent,
    /// Timestamp in microseconds since the device connection started.
    pub timestamp_us: u64,
}

/// Error type for MIDI operations.
#[derive(Debug, Clone, Error)]
pub enum MidiError {
    /// Failed to initialize MIDI subsystem.
    #[error("MIDI init error: {0}")]
    Init(String),
    /// Failed to connect to device.
    #[error("MIDI connection error on '{device}': {reason}")]
    Connection { device: String, reason: String },
    /// Device not found.
    #[error("MIDI device {0} not found")]
    DeviceNotFound(DeviceId),
}

/// Callback run on the driver thread after an event has been queued.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// `(name, port id)` for every input port, in enumeration order.
type PortListing = Vec<(String, String)>;

/// Port list shared with the scan thread.
struct ScanState {
    ports: Vec<MidiInputPort>,
    listing: PortListing,
    /// Bumped whenever a port name or id changes.
    generation: u64,
}

/// An open connection and the port it was opened on.
struct OpenDevice {
    port_id: String,
    connection: MidiInputConnection<()>,
}

/// MIDI engine managing any number of open input devices.
pub struct MidiEngine {
    client_name: String,
    /// Devices as of the last refresh.
    roster: DeviceRoster,
    /// Latest port handles from the scan thread.
    ports: Vec<MidiInputPort>,
    seen_generation: u64,
    connections: HashMap<DeviceId, OpenDevice>,
    /// Devices whose last open attempt failed.
    failed: HashSet<DeviceId>,
    /// Shared by every connection callback.
    producer: Arc<Mutex<Producer<DeviceMidiEvent>>>,
    waker: Arc<Mutex<Option<Waker>>>,
    state: Arc<Mutex<ScanState>>,
    /// Flag to signal device scan thread to stop.
    scan_running: Arc<AtomicBool>,
    /// Handle for the device scan thread.
    scan_thread: Option<thread::JoinHandle<()>>,
}

fn list_ports(midi_in: &MidiInput) -> (Vec<MidiInputPort>, PortListing) {
    let ports: Vec<MidiInputPort> = midi_in.ports().into_iter().collect();
    let listing = ports
        .iter()
        .map(|p| {
            let name = midi_in.port_name(p).unwrap_or_else(|_| "Unknown".to_string());
            (name, p.id())
        })
        .collect();
    (ports, listing)
}

impl MidiEngine {
    /// Create a new MIDI engine and start watching for device changes.
    ///
    /// Returns the engine and a consumer for receiving MIDI events.
    pub fn new(client_name: &str) -> Result<(Self, Consumer<DeviceMidiEvent>), MidiError> {
        let (producer, consumer) = RingBuffer::new(DEFAULT_MIDI_BUFFER_SIZE);

        let midi_in = MidiInput::new(client_name).map_err(|e| MidiError::Init(e.to_string()))?;
        let (ports, listing) = list_ports(&midi_in);

        let mut roster = DeviceRoster::new();
        roster.update(listing.as_slice());
        log::info!("found {} MIDI input device(s)", listing.len());
        for device in roster.devices() {
            log::debug!("MIDI input {}: {}", device.id, device.name);
        }

        let state = Arc::new(Mutex::new(ScanState {
            ports: ports.clone(),
            listing,
            generation: 0,
        }));

        // Background rescan for hot-plugged devices
        let scan_running = Arc::new(AtomicBool::new(true));
        let state_clone = Arc::clone(&state);
        let running_clone = Arc::clone(&scan_running);
        let scanner_name = format!("{} Scanner", client_name);

        let scan_thread = thread::Builder::new()
            .name("midi-scan".to_string())
            .spawn(move || scan_loop(&scanner_name, &state_clone, &running_clone))
            .map_err(|e| MidiError::Init(e.to_string()))?;

        let engine = Self {
            client_name: client_name.to_string(),
            roster,
            ports,
            seen_generation: 0,
            connections: HashMap::new(),
            failed: HashSet::new(),
            producer: Arc::new(Mutex::new(producer)),
            waker: Arc::new(Mutex::new(None)),
            state,
            scan_running,
            scan_thread: Some(scan_thread),
        };

        Ok((engine, consumer))
    }

    /// Register a callback invoked after every queued event, typically a repaint request.
    pub fn set_waker(&self, waker: Waker) {
        if let Ok(mut slot) = self.waker.lock() {
            *slot = Some(waker);
        }
    }

    /// Devices as of the last refresh.
    pub fn devices(&self) -> &[MidiDeviceInfo] {
        self.roster.devices()
    }

    /// Pick up the scan thread's latest port list.
    ///
    /// Port handles are always taken over so retries use live ports. Returns
    /// the change when devices appeared, disappeared or moved to another port
    /// since the previous refresh.
    pub fn refresh_devices(&mut self) -> Option<RosterChange> {
        let listing = {
            let state = self.state.lock().ok()?;
            self.ports = state.ports.clone();
            if state.generation == self.seen_generation {
                return None;
            }
            self.seen_generation = state.generation;
            state.listing.clone()
        };

        let change = self.roster.update(listing.as_slice());
        if change.is_empty() {
            return None;
        }

        for device in &change.added {
            log::info!("MIDI device appeared: {}", device.name);
        }
        for device in &change.removed {
            log::info!("MIDI device disappeared: {}", device.name);
            self.failed.remove(&device.id);
        }
        for device in &change.moved {
            log::info!("MIDI device {} is now on port {}", device.name, device.port_id);
            self.failed.remove(&device.id);
        }
        Some(change)
    }

    /// Open a device and start delivering its events.
    ///
    /// Opening an already open device is a no-op.
    pub fn open(&mut self, id: DeviceId) -> Result<(), MidiError> {
        if self.connections.contains_key(&id) {
            return Ok(());
        }

        let info = self.roster.get(id).ok_or(MidiError::DeviceNotFound(id))?.clone();
        let Some(port) = self.ports.iter().find(|p| p.id() == info.port_id).cloned() else {
            self.failed.insert(id);
            return Err(MidiError::DeviceNotFound(id));
        };

        let result = self.connect(&info, &port);
        match result {
            Ok(connection) => {
                self.connections.insert(
                    id,
                    OpenDevice {
                        port_id: info.port_id.clone(),
                        connection,
                    },
                );
                self.failed.remove(&id);
                log::info!("MIDI connected to device {}: {}", id, info.name);
                Ok(())
            }
            Err(e) => {
                self.failed.insert(id);
                Err(e)
            }
        }
    }

    fn connect(
        &self,
        info: &MidiDeviceInfo,
        port: &MidiInputPort,
    ) -> Result<MidiInputConnection<()>, MidiError> {
        let connection_error = |reason: String| MidiError::Connection {
            device: info.name.clone(),
            reason,
        };

        let mut midi_in = MidiInput::new(&self.client_name).map_err(|e| MidiError::Init(e.to_string()))?;
        midi_in.ignore(Ignore::All);

        let device = info.id;
        let producer = Arc::clone(&self.producer);
        let waker = Arc::clone(&self.waker);

        midi_in
            .connect(
                port,
                &format!("{} Input", self.client_name),
                move |timestamp_us, data, _| {
                    let Some(event) = MidiEvent::from_bytes(data) else {
                        return;
                    };
                    let queued = DeviceMidiEvent {
                        device,
                        event,
                        timestamp_us,
                    };
                    if let Ok(mut prod) = producer.lock() {
                        // Lossy push - drop events if the UI has fallen behind
                        if prod.push(queued).is_err() {
                            return;
                        }
                    }
                    if let Ok(waker) = waker.lock() {
                        if let Some(wake) = waker.as_ref() {
                            wake();
                        }
                    }
                },
                (),
            )
            .map_err(|e| connection_error(e.to_string()))
    }

    /// Close a device. Closing a device that is not open is a no-op.
    pub fn close(&mut self, id: DeviceId) {
        if let Some(open) = self.connections.remove(&id) {
            open.connection.close();
            log::info!("MIDI disconnected from device {}", id);
        }
    }

    pub fn close_all(&mut self) {
        let ids: Vec<DeviceId> = self.connections.keys().copied().collect();
        for id in ids {
            self.close(id);
        }
    }

    pub fn is_open(&self, id: DeviceId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Whether the last attempt to open this device failed.
    pub fn is_failed(&self, id: DeviceId) -> bool {
        self.failed.contains(&id)
    }

    /// Ids of all open devices, sorted.
    pub fn open_devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.connections.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Make the set of open devices match `wanted`.
    ///
    /// Devices that vanished, are no longer wanted, or now sit on a different
    /// port are closed; wanted devices without a live connection are opened.
    /// Devices that fail to open are returned and otherwise ignored.
    pub fn sync_open_devices<F>(&mut self, wanted: F) -> Vec<(MidiDeviceInfo, MidiError)>
    where
        F: Fn(&MidiDeviceInfo) -> bool,
    {
        let opened_on: HashMap<DeviceId, String> = self
            .connections
            .iter()
            .map(|(id, open)| (*id, open.port_id.clone()))
            .collect();
        let plan = self.roster.plan_connections(&opened_on, wanted);

        for id in plan.close {
            self.close(id);
        }

        let mut failures = Vec::new();
        for id in plan.open {
            if let Err(e) = self.open(id) {
                if let Some(device) = self.roster.get(id) {
                    failures.push((device.clone(), e));
                }
            }
        }
        failures
    }
}

fn scan_loop(client_name: &str, state: &Mutex<ScanState>, running: &AtomicBool) {
    'scan: while running.load(Ordering::Relaxed) {
        let mut waited = Duration::ZERO;
        while waited < DEVICE_SCAN_INTERVAL {
            thread::sleep(SCAN_POLL_STEP);
            waited += SCAN_POLL_STEP;
            if !running.load(Ordering::Relaxed) {
                break 'scan;
            }
        }

        let midi_in = match MidiInput::new(client_name) {
            Ok(midi_in) => midi_in,
            Err(e) => {
                log::warn!("MIDI rescan failed: {}", e);
                continue;
            }
        };
        let (ports, listing) = list_ports(&midi_in);

        if let Ok(mut state) = state.lock() {
            if state.listing != listing {
                state.generation += 1;
            }
            // Port handles are refreshed even when the listing matches
            state.ports = ports;
            state.listing = listing;
        }
    }
}

impl Drop for MidiEngine {
    fn drop(&mut self) {
        // Stop the scan thread
        self.scan_running.store(false, Ordering::Relaxed);

        self.close_all();

        // Wait for scan thread to finish
        if let Some(thread) = self.scan_thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_event_from_bytes_note_on() {
        let data = [0x90, 60, 100]; // Note On, channel 0, middle C, velocity 100
        let event = MidiEvent::from_bytes(&data);
        assert_eq!(
            event,
            Some(MidiEvent::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100,
            })
        );
    }

    #[test]
    fn test_midi_event_from_bytes_note_off() {
        let data = [0x80, 60, 64]; // Note Off, channel 0, middle C
        if let Some(MidiEvent::NoteOff { channel, note, velocity }) = MidiEvent::from_bytes(&data) {
            assert_eq!(channel, 0);
            assert_eq!(note, 60);
            assert_eq!(velocity, 64);
        } else {
            panic!("Expected NoteOff event");
        }
    }

    #[test]
    fn test_midi_event_from_bytes_note_on_zero_velocity() {
        // Note On with velocity 0 should be treated as Note Off
        let data = [0x90, 60, 0];
        assert!(matches!(
            MidiEvent::from_bytes(&data),
            Some(MidiEvent::NoteOff { note: 60, .. })
        ));
    }

    #[test]
    fn test_midi_event_from_bytes_channel() {
        let data = [0x95, 60, 100]; // Note On, channel 5
        assert!(matches!(
            MidiEvent::from_bytes(&data),
            Some(MidiEvent::NoteOn { channel: 5, .. })
        ));
    }

    #[test]
    fn test_midi_event_masks_data_bytes() {
        let data = [0x90, 0xBC, 0xFF];
        assert_eq!(
            MidiEvent::from_bytes(&data),
            Some(MidiEvent::NoteOn {
                channel: 0,
                note: 0x3C,
                velocity: 0x7F,
            })
        );
    }

    #[test]
    fn test_midi_event_ignores_other_messages() {
        assert!(MidiEvent::from_bytes(&[0xB0, 1, 64]).is_none()); // CC
        assert!(MidiEvent::from_bytes(&[0xE0, 0, 64]).is_none()); // Pitch bend
        assert!(MidiEvent::from_bytes(&[0xF8]).is_none()); // Clock
        assert!(MidiEvent::from_bytes(&[0xF0, 0x7E, 0xF7]).is_none()); // SysEx
    }

    #[test]
    fn test_midi_event_from_bytes_empty() {
        let data: [u8; 0] = [];
        assert!(MidiEvent::from_bytes(&data).is_none());
    }

    #[test]
    fn test_midi_event_from_bytes_incomplete() {
        assert!(MidiEvent::from_bytes(&[0x90, 60]).is_none()); // Missing velocity byte
        assert!(MidiEvent::from_bytes(&[0x80]).is_none());
    }

    #[test]
    fn test_midi_error_display() {
        let err = MidiError::Connection {
            device: "Keys".to_string(),
            reason: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "MIDI connection error on 'Keys': busy");
        assert_eq!(
            MidiError::DeviceNotFound(DeviceId(4)).to_string(),
            "MIDI device #4 not found"
        );
    }

    #[test]
    fn test_device_event_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<DeviceMidiEvent>();
        assert_send::<MidiError>();
    }
}
