// Typed partial updates
// Each update lists exactly which fields of an entity can change; `None`
// leaves the current value untouched.

use crate::sequencer::model::{ChannelConfig, ChannelKind, Sequence, SequenceKind, Step};
use crate::sequencer::scale::Scale;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Mutable fields of a [`Step`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpdate {
    pub volume: Option<f32>,
    pub probability: Option<f32>,
}

impl StepUpdate {
    pub fn apply_to(&self, step: &mut Step) {
        if let Some(volume) = self.volume {
            step.volume = Some(volume);
        }
        if let Some(probability) = self.probability {
            step.probability = Some(probability);
        }
    }
}

/// Mutable fields of a [`ChannelConfig`]
///
/// Variant-specific fields are ignored when the target channel is of another
/// kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfigUpdate {
    pub name: Option<String>,
    pub is_muted: Option<bool>,
    pub is_hidden: Option<bool>,
    pub volume: Option<f32>,
    pub channel: Option<u8>,
    pub note: Option<u8>,
    #[serde(rename = "volumeCC")]
    pub volume_cc: Option<u8>,
    pub cc: Option<u8>,
    pub is_fixed_value: Option<bool>,
    pub fixed_value: Option<u8>,
    pub audio_file: Option<String>,
    pub pitch: Option<f32>,
}

impl ChannelConfigUpdate {
    pub fn apply_to(&self, config: &mut ChannelConfig) {
        if let Some(name) = &self.name {
            config.name = Some(name.clone());
        }
        if let Some(is_muted) = self.is_muted {
            config.is_muted = is_muted;
        }
        if let Some(is_hidden) = self.is_hidden {
            config.is_hidden = is_hidden;
        }
        if let Some(volume) = self.volume {
            config.volume = Some(volume);
        }

        match &mut config.kind {
            ChannelKind::Midi {
                channel,
                note,
                volume_cc,
            } => {
                merge(channel, self.channel);
                merge(note, self.note);
                if self.volume_cc.is_some() {
                    *volume_cc = self.volume_cc;
                }
            }
            ChannelKind::MidiCc {
                channel,
                cc,
                is_fixed_value,
                fixed_value,
            } => {
                merge(channel, self.channel);
                merge(cc, self.cc);
                merge(is_fixed_value, self.is_fixed_value);
                if self.fixed_value.is_some() {
                    *fixed_value = self.fixed_value;
                }
            }
            ChannelKind::Sample { audio_file, pitch } => {
                if let Some(file) = &self.audio_file {
                    *audio_file = file.clone();
                }
                merge(pitch, self.pitch);
            }
            ChannelKind::LineIn => {}
        }
    }
}

/// Mutable top-level fields of a [`Sequence`]
///
/// Synth fields are ignored on drum machines. `midi_out_device_name` uses
/// `Some(None)` to detach the sequence from its device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceUpdate {
    pub name: Option<String>,
    pub n_steps: Option<usize>,
    pub step_length: Option<u32>,
    pub current_pattern_index: Option<usize>,
    pub midi_out_device_name: Option<Option<String>>,
    pub is_muted: Option<bool>,
    pub root_note: Option<u8>,
    pub scale: Option<Scale>,
    pub range: Option<u32>,
    pub note_duration: Option<f64>,
    pub midi_channel: Option<u8>,
    pub is_polyphonic: Option<bool>,
}

/// Values replaced by [`SequenceUpdate::apply_to`] that carry side effects
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ReplacedValues {
    pub device: Option<Option<String>>,
    pub range: Option<(u32, u32)>,
}

impl SequenceUpdate {
    pub(crate) fn apply_to(&self, sequence: &mut Sequence) -> ReplacedValues {
        let mut replaced = ReplacedValues::default();

        if let Some(name) = &self.name {
            sequence.name = name.clone();
        }
        if let Some(n_steps) = self.n_steps.filter(|n| *n > 0) {
            sequence.n_steps = n_steps;
        }
        if let Some(step_length) = self.step_length.filter(|n| *n > 0) {
            sequence.step_length = step_length;
        }
        if let Some(index) = self.current_pattern_index {
            if index < sequence.patterns.len() {
                sequence.current_pattern_index = index;
            }
        }
        if let Some(device) = &self.midi_out_device_name {
            if *device != sequence.midi_out_device_name {
                let old = std::mem::replace(&mut sequence.midi_out_device_name, device.clone());
                replaced.device = Some(old);
            }
        }
        merge(&mut sequence.is_muted, self.is_muted);

        if let SequenceKind::Synth(settings) = &mut sequence.kind {
            merge(&mut settings.root_note, self.root_note);
            merge(&mut settings.scale, self.scale);
            merge(&mut settings.note_duration, self.note_duration);
            merge(&mut settings.midi_channel, self.midi_channel);
            merge(&mut settings.is_polyphonic, self.is_polyphonic);
            if let Some(range) = self.range {
                if range != settings.range {
                    replaced.range = Some((settings.range, range));
                    settings.range = range;
                }
            }
        }

        replaced
    }
}

/// Result of a sequence-level mutation
#[must_use]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceUpdateOutcome {
    /// The target sequence was found
    pub applied: bool,
    /// Device no longer referenced by any sequence; should be unregistered
    pub released_device: Option<String>,
    /// Channel offset applied to existing steps after a range change
    pub channel_shift: i32,
}

/// Channel shift keeping steps on the same pitch after a range change
///
/// `floor(delta / 2)` when the previous range is even, `ceil(delta / 2)` when
/// it is odd.
pub fn range_channel_shift(old_range: u32, new_range: u32) -> i32 {
    let delta = new_range as i32 - old_range as i32;
    if old_range % 2 == 0 {
        delta.div_euclid(2)
    } else {
        -(-delta).div_euclid(2)
    }
}

/// A single parameter change, as found in serialized action messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "parameter", content = "value", rename_all = "camelCase")]
pub enum ParameterChange {
    Name(String),
    IsMuted(bool),
    IsHidden(bool),
    Volume(f32),
    NSteps(usize),
    StepLength(u32),
    CurrentPatternIndex(usize),
    MidiOutDeviceName(Option<String>),
    RootNote(u8),
    Scale(Scale),
    Range(u32),
    NoteDuration(f64),
    MidiChannel(u8),
    IsPolyphonic(bool),
    Channel(u8),
    Note(u8),
    #[serde(rename = "volumeCC")]
    VolumeCc(u8),
    Cc(u8),
    IsFixedValue(bool),
    FixedValue(u8),
    AudioFile(String),
    Pitch(f32),
}

impl ParameterChange {
    /// Sequence-level reading of this change, if it has one
    pub fn into_sequence_update(self) -> Option<SequenceUpdate> {
        let mut update = SequenceUpdate::default();
        match self {
            ParameterChange::Name(name) => update.name = Some(name),
            ParameterChange::IsMuted(muted) => update.is_muted = Some(muted),
            ParameterChange::NSteps(n) => update.n_steps = Some(n),
            ParameterChange::StepLength(n) => update.step_length = Some(n),
            ParameterChange::CurrentPatternIndex(i) => update.current_pattern_index = Some(i),
            ParameterChange::MidiOutDeviceName(device) => {
                update.midi_out_device_name = Some(device)
            }
            ParameterChange::RootNote(note) => update.root_note = Some(note),
            ParameterChange::Scale(scale) => update.scale = Some(scale),
            ParameterChange::Range(range) => update.range = Some(range),
            ParameterChange::NoteDuration(ms) => update.note_duration = Some(ms),
            ParameterChange::MidiChannel(channel) => update.midi_channel = Some(channel),
            ParameterChange::IsPolyphonic(poly) => update.is_polyphonic = Some(poly),
            ParameterChange::IsHidden(_)
            | ParameterChange::Volume(_)
            | ParameterChange::Channel(_)
            | ParameterChange::Note(_)
            | ParameterChange::VolumeCc(_)
            | ParameterChange::Cc(_)
            | ParameterChange::IsFixedValue(_)
            | ParameterChange::FixedValue(_)
            | ParameterChange::AudioFile(_)
            | ParameterChange::Pitch(_) => return None,
        }
        Some(update)
    }

    /// Channel-level reading of this change, if it has one
    pub fn into_channel_update(self) -> Option<ChannelConfigUpdate> {
        let mut update = ChannelConfigUpdate::default();
        match self {
            ParameterChange::Name(name) => update.name = Some(name),
            ParameterChange::IsMuted(muted) => update.is_muted = Some(muted),
            ParameterChange::IsHidden(hidden) => update.is_hidden = Some(hidden),
            ParameterChange::Volume(volume) => update.volume = Some(volume),
            ParameterChange::Channel(channel) | ParameterChange::MidiChannel(channel) => {
                update.channel = Some(channel)
            }
            ParameterChange::Note(note) => update.note = Some(note),
            ParameterChange::VolumeCc(cc) => update.volume_cc = Some(cc),
            ParameterChange::Cc(cc) => update.cc = Some(cc),
            ParameterChange::IsFixedValue(fixed) => update.is_fixed_value = Some(fixed),
            ParameterChange::FixedValue(value) => update.fixed_value = Some(value),
            ParameterChange::AudioFile(file) => update.audio_file = Some(file),
            ParameterChange::Pitch(pitch) => update.pitch = Some(pitch),
            ParameterChange::NSteps(_)
            | ParameterChange::StepLength(_)
            | ParameterChange::CurrentPatternIndex(_)
            | ParameterChange::MidiOutDeviceName(_)
            | ParameterChange::RootNote(_)
            | ParameterChange::Scale(_)
            | ParameterChange::Range(_)
            | ParameterChange::NoteDuration(_)
            | ParameterChange::IsPolyphonic(_) => return None,
        }
        Some(update)
    }
}

/// Serializable description of "what changed"
///
/// ```
/// use stepgrid::sequencer::ActionMessage;
///
/// let json = r#"{"sequenceName":"Drums","channelIndex":2,"parameter":"isMuted","value":true}"#;
/// let action: ActionMessage = serde_json::from_str(json).unwrap();
/// assert_eq!(action.channel_index, Some(2));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMessage {
    pub sequence_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_index: Option<usize>,
    pub parameter: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl ActionMessage {
    pub fn sequence(
        sequence_name: impl Into<String>,
        parameter: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            sequence_name: sequence_name.into(),
            channel_index: None,
            parameter: parameter.into(),
            value,
        }
    }

    pub fn channel(
        sequence_name: impl Into<String>,
        channel_index: usize,
        parameter: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            channel_index: Some(channel_index),
            ..Self::sequence(sequence_name, parameter, value)
        }
    }

    /// Typed reading of `parameter` / `value`
    pub fn change(&self) -> Result<ParameterChange, serde_json::Error> {
        serde_json::from_value(json!({
            "parameter": self.parameter,
            "value": self.value,
        }))
    }
}

fn merge<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}
