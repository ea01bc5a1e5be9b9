// Sequence model - Sequence → Pattern → Page → Step, plus channel configs
// Everything here is plain serializable data; mutation rules live in the store.

use crate::sequencer::scale::Scale;
use serde::{Deserialize, Serialize};

/// Default number of steps per page
pub const DEFAULT_N_STEPS: usize = 16;

/// A potential musical event at a `(channel, step_index)` coordinate
///
/// `channel` is signed: a synth range change may shift existing steps outside
/// the visible window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub channel: i32,
    pub step_index: usize,
    /// Relative loudness (0.0 to 1.0), `None` = full
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    /// Chance of firing (0.0 to 1.0), `None` = always
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f32>,
}

impl Step {
    pub fn new(channel: i32, step_index: usize) -> Self {
        Self {
            channel,
            step_index,
            volume: None,
            probability: None,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_probability(mut self, probability: f32) -> Self {
        self.probability = Some(probability);
        self
    }

    /// Same grid coordinate as `other`
    pub fn same_cell(&self, other: &Step) -> bool {
        self.channel == other.channel && self.step_index == other.step_index
    }
}

/// One bank of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    steps: Vec<Step>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Steps sitting on a given column
    pub fn steps_at(&self, step_index: usize) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |s| s.step_index == step_index)
    }

    pub fn find(&self, channel: i32, step_index: usize) -> Option<&Step> {
        self.steps
            .iter()
            .find(|s| s.channel == channel && s.step_index == step_index)
    }

    pub fn find_mut(&mut self, channel: i32, step_index: usize) -> Option<&mut Step> {
        self.steps
            .iter_mut()
            .find(|s| s.channel == channel && s.step_index == step_index)
    }

    /// Insert a step, displacing conflicting ones
    ///
    /// Polyphonic: at most one step per `(channel, step_index)`.
    /// Monophonic: at most one step per `step_index`.
    pub fn insert(&mut self, step: Step, monophonic: bool) {
        if monophonic {
            self.steps.retain(|s| s.step_index != step.step_index);
        } else {
            self.steps.retain(|s| !s.same_cell(&step));
        }
        self.steps.push(step);
    }

    pub fn remove(&mut self, channel: i32, step_index: usize) -> Option<Step> {
        let index = self
            .steps
            .iter()
            .position(|s| s.channel == channel && s.step_index == step_index)?;
        Some(self.steps.remove(index))
    }

    pub fn shift_channels(&mut self, delta: i32) {
        for step in self.steps.iter_mut() {
            step.channel += delta;
        }
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A named arrangement of pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    pub pages: Vec<Page>,
}

impl Pattern {
    /// New pattern with a single blank page
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pages: vec![Page::new()],
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// What a drum-machine channel plays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ChannelKind {
    Midi {
        channel: u8,
        note: u8,
        #[serde(default, rename = "volumeCC", skip_serializing_if = "Option::is_none")]
        volume_cc: Option<u8>,
    },
    MidiCc {
        channel: u8,
        cc: u8,
        #[serde(default)]
        is_fixed_value: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fixed_value: Option<u8>,
    },
    Sample {
        audio_file: String,
        /// Playback pitch in semitones
        #[serde(default)]
        pitch: f32,
    },
    LineIn,
}

/// Per-channel configuration of a drum machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(flatten)]
    pub kind: ChannelKind,
}

impl ChannelConfig {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            name: None,
            is_muted: false,
            is_hidden: false,
            volume: None,
            kind,
        }
    }

    pub fn midi(channel: u8, note: u8) -> Self {
        Self::new(ChannelKind::Midi {
            channel,
            note,
            volume_cc: None,
        })
    }

    pub fn midi_cc(channel: u8, cc: u8) -> Self {
        Self::new(ChannelKind::MidiCc {
            channel,
            cc,
            is_fixed_value: false,
            fixed_value: None,
        })
    }

    pub fn sample(audio_file: impl Into<String>) -> Self {
        Self::new(ChannelKind::Sample {
            audio_file: audio_file.into(),
            pitch: 0.0,
        })
    }

    pub fn line_in() -> Self {
        Self::new(ChannelKind::LineIn)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Muted or hidden channels never fire
    pub fn is_silenced(&self) -> bool {
        self.is_muted || self.is_hidden
    }

    pub fn volume_or_default(&self) -> f32 {
        self.volume.unwrap_or(1.0)
    }
}

/// Pitched sequence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthSettings {
    pub root_note: u8,
    pub scale: Scale,
    /// Number of visible rows, centered on the root note
    pub range: u32,
    /// Note length in milliseconds
    pub note_duration: f64,
    pub midi_channel: u8,
    #[serde(default)]
    pub is_polyphonic: bool,
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            root_note: 60,
            scale: Scale::Major,
            range: 15,
            note_duration: 200.0,
            midi_channel: 0,
            is_polyphonic: false,
        }
    }
}

impl SynthSettings {
    /// Scale degree shown on a given row; row 0 is the highest pitch
    pub fn degree_for_channel(&self, channel: i32) -> i32 {
        (self.range / 2) as i32 - channel
    }

    pub fn note_for_channel(&self, channel: i32) -> u8 {
        self.scale
            .note_for_degree(self.root_note, self.degree_for_channel(channel))
    }
}

/// Instrument-specific part of a sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SequenceKind {
    DrumMachine { channels_config: Vec<ChannelConfig> },
    Synth(SynthSettings),
}

/// One instrument lane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: SequenceKind,
    pub n_steps: usize,
    /// Clock ticks per step advance
    pub step_length: u32,
    pub current_pattern_index: usize,
    pub patterns: Vec<Pattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_out_device_name: Option<String>,
    #[serde(default)]
    pub is_muted: bool,
}

impl Sequence {
    pub fn new(name: impl Into<String>, kind: SequenceKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            n_steps: DEFAULT_N_STEPS,
            step_length: 1,
            current_pattern_index: 0,
            patterns: vec![Pattern::new("A")],
            midi_out_device_name: None,
            is_muted: false,
        }
    }

    pub fn drum_machine(name: impl Into<String>, channels_config: Vec<ChannelConfig>) -> Self {
        Self::new(name, SequenceKind::DrumMachine { channels_config })
    }

    pub fn synth(name: impl Into<String>, settings: SynthSettings) -> Self {
        Self::new(name, SequenceKind::Synth(settings))
    }

    pub fn with_n_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = n_steps.max(1);
        self
    }

    pub fn with_step_length(mut self, step_length: u32) -> Self {
        self.step_length = step_length.max(1);
        self
    }

    pub fn with_midi_out(mut self, device_name: impl Into<String>) -> Self {
        self.midi_out_device_name = Some(device_name.into());
        self
    }

    /// Only non-polyphonic synths are monophonic
    pub fn is_monophonic(&self) -> bool {
        match &self.kind {
            SequenceKind::DrumMachine { .. } => false,
            SequenceKind::Synth(settings) => !settings.is_polyphonic,
        }
    }

    pub fn synth_settings(&self) -> Option<&SynthSettings> {
        match &self.kind {
            SequenceKind::Synth(settings) => Some(settings),
            SequenceKind::DrumMachine { .. } => None,
        }
    }

    pub fn channels(&self) -> &[ChannelConfig] {
        match &self.kind {
            SequenceKind::DrumMachine { channels_config } => channels_config,
            SequenceKind::Synth(_) => &[],
        }
    }

    pub fn channel_config(&self, channel: i32) -> Option<&ChannelConfig> {
        let index = usize::try_from(channel).ok()?;
        self.channels().get(index)
    }

    pub fn channel_config_mut(&mut self, channel_index: usize) -> Option<&mut ChannelConfig> {
        match &mut self.kind {
            SequenceKind::DrumMachine { channels_config } => channels_config.get_mut(channel_index),
            SequenceKind::Synth(_) => None,
        }
    }

    pub fn current_pattern(&self) -> Option<&Pattern> {
        self.patterns.get(self.current_pattern_index)
    }

    pub fn current_pattern_mut(&mut self) -> Option<&mut Pattern> {
        self.patterns.get_mut(self.current_pattern_index)
    }

    /// Page of the current pattern
    pub fn page(&self, page_index: usize) -> Option<&Page> {
        self.current_pattern()?.pages.get(page_index)
    }

    pub fn page_mut(&mut self, page_index: usize) -> Option<&mut Page> {
        self.current_pattern_mut()?.pages.get_mut(page_index)
    }

    /// Every page of every pattern
    pub fn pages_mut(&mut self) -> impl Iterator<Item = &mut Page> {
        self.patterns.iter_mut().flat_map(|p| p.pages.iter_mut())
    }

    /// Whether a step on `channel` is allowed to sound
    pub fn is_channel_silenced(&self, channel: i32) -> bool {
        self.channel_config(channel)
            .map(ChannelConfig::is_silenced)
            .unwrap_or(false)
    }
}
