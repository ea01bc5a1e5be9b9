// MIDI transport - Output device access
//
// The output queue only needs four things from the platform: the list of
// output names, a way to resolve a name into a handle, and note/cc sending.
// Access is negotiated once; until then no handle resolves.

use crate::midi::MidiError;
use crate::midi::event::MidiEvent;
use midir::{MidiOutput, MidiOutputConnection};
use std::fmt;
use tracing::{info, warn};

pub trait MidiTransport {
    type Handle: Clone + fmt::Debug;

    /// Platform access negotiation has completed
    fn is_ready(&self) -> bool;

    fn output_device_names(&self) -> Vec<String>;

    /// Open (or reuse) the output called `name`
    fn resolve_output(&mut self, name: &str) -> Option<Self::Handle>;

    /// Close an output the sequencer no longer uses
    fn release_output(&mut self, _handle: &Self::Handle) {}

    fn send(&mut self, handle: &Self::Handle, event: MidiEvent) -> Result<(), MidiError>;

    fn send_note_on(
        &mut self,
        handle: &Self::Handle,
        note: u8,
        velocity: u8,
        channel: u8,
    ) -> Result<(), MidiError> {
        self.send(
            handle,
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            },
        )
    }

    fn send_note_off(
        &mut self,
        handle: &Self::Handle,
        note: u8,
        velocity: u8,
        channel: u8,
    ) -> Result<(), MidiError> {
        self.send(
            handle,
            MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            },
        )
    }

    fn send_control_change(
        &mut self,
        handle: &Self::Handle,
        cc: u8,
        value: u8,
        channel: u8,
    ) -> Result<(), MidiError> {
        self.send(
            handle,
            MidiEvent::ControlChange {
                channel,
                controller: cc,
                value,
            },
        )
    }
}

/// Hardware/virtual outputs through midir
pub struct MidirTransport {
    client_name: String,
    ready: bool,
    connections: Vec<Option<(String, MidiOutputConnection)>>,
}

impl MidirTransport {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            ready: false,
            connections: Vec::new(),
        }
    }

    /// Check that the MIDI backend can be opened
    pub fn request_access(&mut self) -> Result<(), MidiError> {
        MidiOutput::new(&self.client_name)?;
        self.ready = true;
        info!(client = %self.client_name, "MIDI output access granted");
        Ok(())
    }

    fn connect(&self, name: &str) -> Result<MidiOutputConnection, MidiError> {
        let midi_out = MidiOutput::new(&self.client_name)?;
        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|port_name| port_name == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| MidiError::DeviceUnavailable(name.to_string()))?;

        Ok(midi_out.connect(port, "stepgrid-out")?)
    }
}

impl MidiTransport for MidirTransport {
    type Handle = usize;

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn output_device_names(&self) -> Vec<String> {
        match MidiOutput::new(&self.client_name) {
            Ok(midi_out) => midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn resolve_output(&mut self, name: &str) -> Option<usize> {
        if !self.ready {
            return None;
        }

        let existing = self
            .connections
            .iter()
            .position(|slot| matches!(slot, Some((n, _)) if n == name));
        if existing.is_some() {
            return existing;
        }

        match self.connect(name) {
            Ok(connection) => {
                info!(device = name, "MIDI output connected");
                let slot = Some((name.to_string(), connection));
                match self.connections.iter().position(Option::is_none) {
                    Some(free) => {
                        self.connections[free] = slot;
                        Some(free)
                    }
                    None => {
                        self.connections.push(slot);
                        Some(self.connections.len() - 1)
                    }
                }
            }
            Err(e) => {
                warn!(device = name, error = %e, "MIDI output not available");
                None
            }
        }
    }

    fn release_output(&mut self, handle: &usize) {
        if let Some(slot) = self.connections.get_mut(*handle) {
            if let Some((name, connection)) = slot.take() {
                connection.close();
                info!(device = %name, "MIDI output closed");
            }
        }
    }

    fn send(&mut self, handle: &usize, event: MidiEvent) -> Result<(), MidiError> {
        let (_, connection) = self
            .connections
            .get_mut(*handle)
            .and_then(Option::as_mut)
            .ok_or_else(|| MidiError::DeviceUnavailable(format!("handle {}", handle)))?;
        connection.send(&event.to_bytes())?;
        Ok(())
    }
}

/// A message recorded by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub device: String,
    pub bytes: [u8; 3],
}

impl SentMessage {
    pub fn event(&self) -> Option<MidiEvent> {
        MidiEvent::from_bytes(&self.bytes)
    }
}

/// In-process transport recording raw bytes per device
///
/// Used for offline rendering and tests. Created "pending" it models a
/// platform whose access negotiation has not finished yet.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    devices: Vec<String>,
    ready: bool,
    sent: Vec<SentMessage>,
}

impl MemoryTransport {
    /// Transport with access already granted
    pub fn new<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            devices: devices.into_iter().map(Into::into).collect(),
            ready: true,
            sent: Vec::new(),
        }
    }

    /// Transport still negotiating access
    pub fn pending<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ready: false,
            ..Self::new(devices)
        }
    }

    pub fn grant_access(&mut self) {
        self.ready = true;
    }

    pub fn add_device(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.devices.contains(&name) {
            self.devices.push(name);
        }
    }

    pub fn remove_device(&mut self, name: &str) {
        self.devices.retain(|d| d != name);
    }

    pub fn sent(&self) -> &[SentMessage] {
        &self.sent
    }

    /// Decoded events sent to one device, in order
    pub fn events_for(&self, device: &str) -> Vec<MidiEvent> {
        self.sent
            .iter()
            .filter(|m| m.device == device)
            .filter_map(SentMessage::event)
            .collect()
    }

    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }
}

impl MidiTransport for MemoryTransport {
    type Handle = String;

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn output_device_names(&self) -> Vec<String> {
        if self.ready {
            self.devices.clone()
        } else {
            Vec::new()
        }
    }

    fn resolve_output(&mut self, name: &str) -> Option<String> {
        (self.ready && self.devices.iter().any(|d| d == name)).then(|| name.to_string())
    }

    fn send(&mut self, handle: &String, event: MidiEvent) -> Result<(), MidiError> {
        if !self.devices.contains(handle) {
            return Err(MidiError::DeviceUnavailable(handle.clone()));
        }
        self.sent.push(SentMessage {
            device: handle.clone(),
            bytes: event.to_bytes(),
        });
        Ok(())
    }
}
