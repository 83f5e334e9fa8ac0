//! Device bookkeeping and note routing.
//!
//! `DeviceRoster` turns the raw port list reported by the MIDI backend into
//! stable device ids, reports which devices appeared, disappeared or moved to
//! another port, and plans which connections to open or close.
//! `NoteFilter` decides which incoming events reach the visualizer.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::midi_engine::{DeviceId, DeviceMidiEvent, MidiDeviceInfo, MidiEvent};

/// Number of MIDI channels.
pub const MIDI_CHANNELS: u8 = 16;

/// Set of enabled MIDI channels, one bit per channel (bit 0 = channel 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMask(pub u16);

impl ChannelMask {
    pub const ALL: ChannelMask = ChannelMask(0xFFFF);
    pub const NONE: ChannelMask = ChannelMask(0);

    /// Whether the zero-based `channel` is enabled.
    pub fn contains(self, channel: u8) -> bool {
        channel < MIDI_CHANNELS && self.0 & (1u16 << channel) != 0
    }

    /// Enable or disable the zero-based `channel`. Out of range channels are ignored.
    pub fn set(&mut self, channel: u8, enabled: bool) {
        if channel >= MIDI_CHANNELS {
            return;
        }
        if enabled {
            self.0 |= 1u16 << channel;
        } else {
            self.0 &= !(1u16 << channel);
        }
    }

    pub fn is_all(self) -> bool {
        self == Self::ALL
    }

    pub fn is_empty(self) -> bool {
        self == Self::NONE
    }
}

impl Default for ChannelMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Devices that appeared, disappeared or changed port in a roster update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterChange {
    pub added: Vec<MidiDeviceInfo>,
    pub removed: Vec<MidiDeviceInfo>,
    /// Devices that kept their name but are now backed by a different port.
    pub moved: Vec<MidiDeviceInfo>,
}

impl RosterChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.moved.is_empty()
    }

    /// Whether the set of visible devices changed, as opposed to only their ports.
    pub fn devices_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Connections to close and devices to open so the open set matches the roster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionPlan {
    /// Open connections to drop: vanished, unwanted, or bound to a stale port.
    pub close: Vec<DeviceId>,
    /// Wanted devices without a connection on their current port.
    pub open: Vec<DeviceId>,
}

/// Tracks the currently visible MIDI input devices.
///
/// A device keeps the same id for as long as the process runs, even if it is
/// unplugged and plugged back in. Ports sharing a name are told apart with a
/// ` #2`, ` #3`, ... suffix in enumeration order, so the port behind an id
/// can change when a same-named port disappears.
#[derive(Debug, Default)]
pub struct DeviceRoster {
    ids: BTreeMap<String, DeviceId>,
    next_id: u32,
    devices: Vec<MidiDeviceInfo>,
}

impl DeviceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the device list with freshly enumerated `(name, port id)` pairs.
    pub fn update<S: AsRef<str>>(&mut self, ports: &[(S, S)]) -> RosterChange {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut devices = Vec::with_capacity(ports.len());

        for (raw, port_id) in ports {
            let raw = raw.as_ref();
            let count = seen.entry(raw).or_insert(0);
            *count += 1;
            let name = if *count == 1 {
                raw.to_string()
            } else {
                format!("{} #{}", raw, count)
            };

            let id = match self.ids.get(&name) {
                Some(id) => *id,
                None => {
                    let id = DeviceId(self.next_id);
                    self.next_id += 1;
                    self.ids.insert(name.clone(), id);
                    id
                }
            };

            devices.push(MidiDeviceInfo {
                id,
                name,
                port_id: port_id.as_ref().to_string(),
            });
        }

        let mut change = RosterChange::default();
        for device in &devices {
            match self.get(device.id) {
                None => change.added.push(device.clone()),
                Some(old) if old.port_id != device.port_id => change.moved.push(device.clone()),
                Some(_) => {}
            }
        }
        change.removed = self
            .devices
            .iter()
            .filter(|old| !devices.iter().any(|d| d.id == old.id))
            .cloned()
            .collect();

        self.devices = devices;
        change
    }

    /// Currently visible devices in enumeration order.
    pub fn devices(&self) -> &[MidiDeviceInfo] {
        &self.devices
    }

    pub fn get(&self, id: DeviceId) -> Option<&MidiDeviceInfo> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Work out which connections to drop and which devices to open.
    ///
    /// `open` maps each connected device to the port id it was opened on. A
    /// connection whose device now sits on another port is closed and, if
    /// still wanted, reopened on the new port.
    pub fn plan_connections<F>(&self, open: &HashMap<DeviceId, String>, wanted: F) -> ConnectionPlan
    where
        F: Fn(&MidiDeviceInfo) -> bool,
    {
        let connected = |device: &MidiDeviceInfo| {
            open.get(&device.id).is_some_and(|port_id| *port_id == device.port_id)
        };

        let mut close: Vec<DeviceId> = open
            .keys()
            .copied()
            .filter(|id| self.get(*id).map_or(true, |d| !wanted(d) || !connected(d)))
            .collect();
        close.sort();

        let to_open = self
            .devices
            .iter()
            .filter(|d| wanted(*d) && !connected(*d))
            .map(|d| d.id)
            .collect();

        ConnectionPlan {
            close,
            open: to_open,
        }
    }
}

/// A note-on that passed the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutedNote {
    pub device: DeviceId,
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
}

/// Gate deciding which device events feed the visualizer.
///
/// Devices without an entry are rejected.
#[derive(Debug, Clone, Default)]
pub struct NoteFilter {
    devices: HashMap<DeviceId, ChannelMask>,
}

impl NoteFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `channels` from `device`. An empty mask rejects the device.
    pub fn allow(&mut self, device: DeviceId, channels: ChannelMask) {
        if channels.is_empty() {
            self.devices.remove(&device);
        } else {
            self.devices.insert(device, channels);
        }
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    /// Return the note if `event` is a note-on from an allowed device and channel.
    pub fn route(&self, event: &DeviceMidiEvent) -> Option<RoutedNote> {
        let MidiEvent::NoteOn {
            channel,
            note,
            velocity,
        } = event.event
        else {
            return None;
        };

        let mask = self.devices.get(&event.device)?;
        if !mask.contains(channel) {
            return None;
        }

        Some(RoutedNote {
            device: event.device,
            channel,
            note,
            velocity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(device: u32, channel: u8, note: u8) -> DeviceMidiEvent {
        DeviceMidiEvent {
            device: DeviceId(device),
            event: MidiEvent::NoteOn {
                channel,
                note,
                velocity: 90,
            },
            timestamp_us: 0,
        }
    }

    #[test]
    fn test_channel_mask_bits() {
        let mut mask = ChannelMask::NONE;
        assert!(!mask.contains(0));
        mask.set(0, true);
        mask.set(15, true);
        assert!(mask.contains(0));
        assert!(mask.contains(15));
        assert!(!mask.contains(7));
        mask.set(0, false);
        assert!(!mask.contains(0));
        assert_eq!(mask, ChannelMask(0x8000));
    }

    #[test]
    fn test_channel_mask_out_of_range() {
        let mut mask = ChannelMask::ALL;
        assert!(!mask.contains(16));
        mask.set(16, false);
        assert!(mask.is_all());
    }

    #[test]
    fn test_channel_mask_serializes_as_integer() {
        let json = serde_json::to_string(&ChannelMask(5)).unwrap();
        assert_eq!(json, "5");
    }

    fn wanted_all(_: &MidiDeviceInfo) -> bool {
        true
    }

    fn opened_on(entries: &[(u32, &str)]) -> HashMap<DeviceId, String> {
        entries
            .iter()
            .map(|(id, port)| (DeviceId(*id), port.to_string()))
            .collect()
    }

    #[test]
    fn test_roster_assigns_stable_ids() {
        let mut roster = DeviceRoster::new();
        let change = roster.update(&[("Keys", "20:0"), ("Pads", "24:0")]);
        assert_eq!(change.added.len(), 2);
        assert!(change.removed.is_empty());

        let keys = roster.devices()[0].id;

        // Unplug and replug
        let change = roster.update(&[("Pads", "24:0")]);
        assert_eq!(change.removed.len(), 1);
        assert_eq!(change.removed[0].id, keys);

        roster.update(&[("Pads", "24:0"), ("Keys", "28:0")]);
        let replugged = &roster.devices()[1];
        assert_eq!(replugged.id, keys);
        assert_eq!(replugged.name, "Keys");
        assert_eq!(replugged.port_id, "28:0");
    }

    #[test]
    fn test_roster_unchanged_list_reports_nothing() {
        let mut roster = DeviceRoster::new();
        roster.update(&[("Keys", "20:0")]);
        assert!(roster.update(&[("Keys", "20:0")]).is_empty());
    }

    #[test]
    fn test_roster_suffixes_duplicate_names() {
        let mut roster = DeviceRoster::new();
        roster.update(&[
            ("USB MIDI", "20:0"),
            ("USB MIDI", "24:0"),
            ("Other", "28:0"),
            ("USB MIDI", "32:0"),
        ]);
        let names: Vec<&str> = roster.devices().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["USB MIDI", "USB MIDI #2", "Other", "USB MIDI #3"]);

        let ids: std::collections::HashSet<DeviceId> =
            roster.devices().iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_roster_reports_port_change_as_moved() {
        let mut roster = DeviceRoster::new();
        roster.update(&[("Keys", "20:0")]);

        // Replugged between two scans: same name, new port
        let change = roster.update(&[("Keys", "36:0")]);
        assert!(change.added.is_empty());
        assert!(change.removed.is_empty());
        assert_eq!(change.moved.len(), 1);
        assert_eq!(change.moved[0].port_id, "36:0");
        assert!(!change.is_empty());
        assert!(!change.devices_changed());
    }

    #[test]
    fn test_plan_opens_wanted_devices() {
        let mut roster = DeviceRoster::new();
        roster.update(&[("Keys", "20:0"), ("Pads", "24:0")]);

        let plan = roster.plan_connections(&HashMap::new(), |d| d.name == "Pads");
        assert!(plan.close.is_empty());
        assert_eq!(plan.open, vec![roster.devices()[1].id]);
    }

    #[test]
    fn test_plan_keeps_connections_in_place() {
        let mut roster = DeviceRoster::new();
        roster.update(&[("Keys", "20:0"), ("Pads", "24:0")]);

        let open = opened_on(&[(0, "20:0"), (1, "24:0")]);
        assert_eq!(
            roster.plan_connections(&open, wanted_all),
            ConnectionPlan::default()
        );
    }

    #[test]
    fn test_plan_closes_unwanted_and_vanished() {
        let mut roster = DeviceRoster::new();
        roster.update(&[("Keys", "20:0"), ("Pads", "24:0")]);
        roster.update(&[("Keys", "20:0")]);

        let open = opened_on(&[(0, "20:0"), (1, "24:0")]);
        let plan = roster.plan_connections(&open, |_| false);
        assert_eq!(plan.close, vec![DeviceId(0), DeviceId(1)]);
        assert!(plan.open.is_empty());
    }

    #[test]
    fn test_plan_follows_same_named_port_after_unplug() {
        let mut roster = DeviceRoster::new();
        roster.update(&[("USB MIDI", "20:0"), ("USB MIDI", "24:0")]);
        let open = opened_on(&[(0, "20:0"), (1, "24:0")]);

        // The first port goes away; the second takes over the plain name.
        let change = roster.update(&[("USB MIDI", "24:0")]);
        assert_eq!(change.removed[0].id, DeviceId(1));
        assert_eq!(change.moved[0].id, DeviceId(0));

        let plan = roster.plan_connections(&open, wanted_all);
        assert_eq!(plan.close, vec![DeviceId(0), DeviceId(1)]);
        assert_eq!(plan.open, vec![DeviceId(0)]);
    }

    #[test]
    fn test_plan_reopens_replugged_device() {
        let mut roster = DeviceRoster::new();
        roster.update(&[("Keys", "20:0")]);
        let open = opened_on(&[(0, "20:0")]);

        roster.update(&[("Keys", "36:0")]);
        let plan = roster.plan_connections(&open, wanted_all);
        assert_eq!(plan.close, vec![DeviceId(0)]);
        assert_eq!(plan.open, vec![DeviceId(0)]);
    }

    #[test]
    fn test_filter_rejects_unknown_device() {
        let filter = NoteFilter::new();
        assert!(filter.route(&note_on(0, 0, 60)).is_none());
    }

    #[test]
    fn test_filter_passes_allowed_note_on() {
        let mut filter = NoteFilter::new();
        filter.allow(DeviceId(3), ChannelMask::ALL);

        let routed = filter.route(&note_on(3, 9, 36)).unwrap();
        assert_eq!(routed.device, DeviceId(3));
        assert_eq!(routed.channel, 9);
        assert_eq!(routed.note, 36);
        assert_eq!(routed.velocity, 90);
    }

    #[test]
    fn test_filter_respects_channel_mask() {
        let mut filter = NoteFilter::new();
        let mut mask = ChannelMask::NONE;
        mask.set(9, true);
        filter.allow(DeviceId(0), mask);

        assert!(filter.route(&note_on(0, 9, 36)).is_some());
        assert!(filter.route(&note_on(0, 0, 36)).is_none());
    }

    #[test]
    fn test_filter_ignores_note_off() {
        let mut filter = NoteFilter::new();
        filter.allow(DeviceId(0), ChannelMask::ALL);
        let event = DeviceMidiEvent {
            device: DeviceId(0),
            event: MidiEvent::NoteOff {
                channel: 0,
                note: 60,
                velocity: 0,
            },
            timestamp_us: 0,
        };
        assert!(filter.route(&event).is_none());
    }

    #[test]
    fn test_filter_empty_mask_rejects_device() {
        let mut filter = NoteFilter::new();
        filter.allow(DeviceId(0), ChannelMask::ALL);
        filter.allow(DeviceId(0), ChannelMask::NONE);
        assert!(filter.route(&note_on(0, 0, 60)).is_none());
    }
}
