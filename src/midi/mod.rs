// MIDI output subsystem
// Outbound messages, per-device output queues, step-to-MIDI translation and
// the transports that reach actual devices.

pub mod event;
pub mod message;
pub mod queue;
pub mod translate;
pub mod transport;

pub use event::MidiEvent;
pub use message::OutboundMessage;
pub use queue::MidiOutputRouter;
pub use transport::{MemoryTransport, MidiTransport, MidirTransport, SentMessage};

use thiserror::Error;

/// MIDI error types
#[derive(Debug, Error)]
pub enum MidiError {
    #[error("Failed to initialize MIDI: {0}")]
    Init(String),

    #[error("Failed to connect to MIDI output: {0}")]
    Connect(String),

    #[error("Failed to send MIDI message: {0}")]
    Send(String),

    #[error("MIDI device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl From<midir::InitError> for MidiError {
    fn from(e: midir::InitError) -> Self {
        MidiError::Init(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiOutput>> for MidiError {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        MidiError::Connect(e.to_string())
    }
}

impl From<midir::SendError> for MidiError {
    fn from(e: midir::SendError) -> Self {
        MidiError::Send(e.to_string())
    }
}
