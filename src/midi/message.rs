// Outbound messages queued per device

use serde::{Deserialize, Serialize};

/// Velocity used when a note-on carries none
pub const DEFAULT_VELOCITY: u8 = 127;

/// A message waiting in a device queue
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    Note {
        channel: u8,
        note: u8,
        velocity: Option<u8>,
        /// Automatic note-off after this many milliseconds
        duration_ms: Option<f64>,
        is_note_off: bool,
        /// Cut every other sounding note of the device first
        is_monophonic: bool,
    },
    ControlChange {
        channel: u8,
        cc: u8,
        value: Option<u8>,
    },
}

impl OutboundMessage {
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        OutboundMessage::Note {
            channel,
            note,
            velocity: Some(velocity),
            duration_ms: None,
            is_note_off: false,
            is_monophonic: false,
        }
    }

    pub fn note_off(channel: u8, note: u8) -> Self {
        OutboundMessage::Note {
            channel,
            note,
            velocity: None,
            duration_ms: None,
            is_note_off: true,
            is_monophonic: false,
        }
    }

    pub fn control_change(channel: u8, cc: u8, value: u8) -> Self {
        OutboundMessage::ControlChange {
            channel,
            cc,
            value: Some(value),
        }
    }

    /// Schedule a note-off after `duration_ms` (note messages only)
    pub fn with_duration(mut self, duration: f64) -> Self {
        if let OutboundMessage::Note { duration_ms, .. } = &mut self {
            *duration_ms = Some(duration);
        }
        self
    }

    /// Mark a note-on as monophonic (note messages only)
    pub fn monophonic(mut self) -> Self {
        if let OutboundMessage::Note { is_monophonic, .. } = &mut self {
            *is_monophonic = true;
        }
        self
    }

    /// `(channel, note)` for note messages
    pub fn note_key(&self) -> Option<(u8, u8)> {
        match *self {
            OutboundMessage::Note { channel, note, .. } => Some((channel, note)),
            OutboundMessage::ControlChange { .. } => None,
        }
    }

    /// Whether this message plays or releases `(channel, note)`
    pub fn targets(&self, channel: u8, note: u8) -> bool {
        self.note_key() == Some((channel, note))
    }
}
