// Sequencer module
// Sequence/pattern/page/step model, the store that owns it and the dispatcher
// that reads it on every clock tick.

pub mod dispatcher;
pub mod model;
pub mod scale;
pub mod store;
pub mod update;

pub use dispatcher::{Playhead, StepDispatcher, TriggerSink};
pub use model::{
    ChannelConfig, ChannelKind, Page, Pattern, Sequence, SequenceKind, Step, SynthSettings,
};
pub use scale::Scale;
pub use store::{RemovedSequence, SequenceStore};
pub use update::{
    ActionMessage, ChannelConfigUpdate, ParameterChange, SequenceUpdate, SequenceUpdateOutcome,
    StepUpdate,
};
