// stepgrid - Library exports for the sequencer engine and its tests

pub mod config;
pub mod connection;
pub mod context;
pub mod midi;
pub mod project;
pub mod sequencer;
pub mod timing;

// Re-export commonly used types for convenience
pub use config::{ConfigError, SequencerConfig};
pub use connection::DeviceStatus;
pub use context::{ScheduledTask, SequencerContext};
pub use midi::{
    MemoryTransport, MidiError, MidiEvent, MidiOutputRouter, MidiTransport, MidirTransport,
    OutboundMessage,
};
pub use project::{SnapshotError, StoreSnapshot};
pub use sequencer::{
    ActionMessage, ChannelConfig, ChannelKind, Page, Pattern, Scale, Sequence, SequenceKind,
    SequenceStore, Step, StepDispatcher, SynthSettings, TriggerSink,
};
pub use timing::{Clock, ManualTime, MonotonicTime, Scheduler, Tempo, Tick, TimeSource};
