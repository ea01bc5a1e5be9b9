// SequenceStore - Owner of all sequence state
//
// Every mutation resolves its target sequence by id or name first. Stale
// references (unknown sequence, page or channel) are silent no-ops: the UI may
// race ahead of the state it is editing, and the playback loop must keep going.
//
// Atomicity comes from the single-threaded event loop: an operation always
// completes before the next tick reads the store.

use crate::project::StoreSnapshot;
use crate::sequencer::model::{Page, Pattern, Sequence, Step};
use crate::sequencer::update::{
    ActionMessage, ChannelConfigUpdate, SequenceUpdate, SequenceUpdateOutcome, StepUpdate,
    range_channel_shift,
};
use tracing::debug;

/// A sequence taken out of the store
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedSequence {
    pub sequence: Sequence,
    /// Device no longer referenced by any remaining sequence
    pub released_device: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SequenceStore {
    sequences: Vec<Sequence>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sequences(sequences: Vec<Sequence>) -> Self {
        Self { sequences }
    }

    /// Add a sequence, returning its id
    pub fn add_sequence(&mut self, sequence: Sequence) -> String {
        let id = sequence.id.clone();
        self.sequences.push(sequence);
        id
    }

    pub fn remove_sequence(&mut self, key: &str) -> Option<RemovedSequence> {
        let index = self.position(key)?;
        let sequence = self.sequences.remove(index);
        let released_device = sequence
            .midi_out_device_name
            .clone()
            .filter(|device| !self.device_in_use(device, None));
        Some(RemovedSequence {
            sequence,
            released_device,
        })
    }

    /// Look up a sequence by id or name
    pub fn get(&self, key: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| s.id == key || s.name == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sequence> {
        self.sequences.iter()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn clear(&mut self) {
        self.sequences.clear();
    }

    /// Whether any sequence (other than `except_id`) targets `device`
    pub fn device_in_use(&self, device: &str, except_id: Option<&str>) -> bool {
        self.sequences.iter().any(|s| {
            Some(s.id.as_str()) != except_id && s.midi_out_device_name.as_deref() == Some(device)
        })
    }

    /// Insert `step`, first removing whatever conflicts with it
    pub fn set_step(&mut self, key: &str, step: Step, page_index: usize) -> bool {
        let Some(sequence) = self.resolve(key) else {
            return false;
        };
        let monophonic = sequence.is_monophonic();
        match sequence.page_mut(page_index) {
            Some(page) => {
                page.insert(step, monophonic);
                true
            }
            None => {
                debug!(sequence = key, page_index, "set_step: no such page");
                false
            }
        }
    }

    /// Remove the step at `step`'s `(channel, step_index)`
    pub fn remove_step(&mut self, key: &str, step: &Step, page_index: usize) -> Option<Step> {
        self.resolve(key)?
            .page_mut(page_index)?
            .remove(step.channel, step.step_index)
    }

    /// Merge `update` into the step at `target`'s `(channel, step_index)`
    pub fn update_step(
        &mut self,
        key: &str,
        target: &Step,
        page_index: usize,
        update: StepUpdate,
    ) -> bool {
        let step = self
            .resolve(key)
            .and_then(|s| s.page_mut(page_index))
            .and_then(|page| page.find_mut(target.channel, target.step_index));
        match step {
            Some(step) => {
                update.apply_to(step);
                true
            }
            None => false,
        }
    }

    /// Append a page (blank, or the one supplied) to the current pattern
    pub fn add_page(&mut self, key: &str, page: Option<Page>) -> Option<usize> {
        let pattern = self.resolve(key)?.current_pattern_mut()?;
        pattern.pages.push(page.unwrap_or_default());
        Some(pattern.pages.len() - 1)
    }

    /// Copy of an existing page of the current pattern, appended at the end
    pub fn duplicate_page(&mut self, key: &str, page_index: usize) -> Option<usize> {
        let copy = self.get(key)?.page(page_index)?.clone();
        self.add_page(key, Some(copy))
    }

    /// Delete a page of the current pattern
    ///
    /// A pattern keeps at least one page: removing the last one is refused.
    pub fn remove_page(&mut self, key: &str, page_index: usize) -> Option<Page> {
        let pattern = self.resolve(key)?.current_pattern_mut()?;
        if page_index >= pattern.pages.len() {
            return None;
        }
        if pattern.pages.len() == 1 {
            debug!(sequence = key, "remove_page: refusing to remove the only page");
            return None;
        }
        Some(pattern.pages.remove(page_index))
    }

    pub fn clear_page(&mut self, key: &str, page_index: usize) -> bool {
        match self.resolve(key).and_then(|s| s.page_mut(page_index)) {
            Some(page) => {
                page.clear();
                true
            }
            None => false,
        }
    }

    /// Append a pattern, returning its index
    pub fn add_pattern(&mut self, key: &str, pattern: Pattern) -> Option<usize> {
        let sequence = self.resolve(key)?;
        let mut pattern = pattern;
        if pattern.pages.is_empty() {
            pattern.pages.push(Page::new());
        }
        sequence.patterns.push(pattern);
        Some(sequence.patterns.len() - 1)
    }

    pub fn update_channel_config(
        &mut self,
        key: &str,
        channel_index: usize,
        update: &ChannelConfigUpdate,
    ) -> bool {
        match self
            .resolve(key)
            .and_then(|s| s.channel_config_mut(channel_index))
        {
            Some(config) => {
                update.apply_to(config);
                true
            }
            None => {
                debug!(sequence = key, channel_index, "update_channel_config: no such channel");
                false
            }
        }
    }

    /// Merge top-level fields into a sequence
    ///
    /// Side effects:
    /// - a device that no other sequence references any more is reported in
    ///   the outcome so the caller can unregister it;
    /// - a synth range change shifts every existing step so it keeps its pitch.
    pub fn update_sequence(
        &mut self,
        key: &str,
        update: &SequenceUpdate,
    ) -> SequenceUpdateOutcome {
        let Some(index) = self.position(key) else {
            debug!(sequence = key, "update_sequence: unknown sequence");
            return SequenceUpdateOutcome::default();
        };

        let sequence = &mut self.sequences[index];
        let replaced = update.apply_to(sequence);

        let mut outcome = SequenceUpdateOutcome {
            applied: true,
            ..Default::default()
        };

        if let Some((old_range, new_range)) = replaced.range {
            let shift = range_channel_shift(old_range, new_range);
            if shift != 0 {
                for page in sequence.pages_mut() {
                    page.shift_channels(shift);
                }
            }
            outcome.channel_shift = shift;
        }

        if let Some(Some(old_device)) = replaced.device {
            let id = self.sequences[index].id.clone();
            if !self.device_in_use(&old_device, Some(&id)) {
                outcome.released_device = Some(old_device);
            }
        }

        outcome
    }

    /// Apply a serialized `{sequenceName, channelIndex?, parameter, value}` change
    pub fn perform_action(&mut self, action: &ActionMessage) -> SequenceUpdateOutcome {
        let change = match action.change() {
            Ok(change) => change,
            Err(e) => {
                debug!(
                    parameter = %action.parameter,
                    error = %e,
                    "perform_action: unsupported change"
                );
                return SequenceUpdateOutcome::default();
            }
        };

        match action.channel_index {
            Some(channel_index) => {
                let applied = change.into_channel_update().is_some_and(|update| {
                    self.update_channel_config(&action.sequence_name, channel_index, &update)
                });
                SequenceUpdateOutcome {
                    applied,
                    ..Default::default()
                }
            }
            None => match change.into_sequence_update() {
                Some(update) => self.update_sequence(&action.sequence_name, &update),
                None => SequenceUpdateOutcome::default(),
            },
        }
    }

    /// Plain serializable copy of the whole store
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            sequences: self.sequences.clone(),
        }
    }

    /// Replace the store content with a snapshot
    pub fn restore(&mut self, snapshot: StoreSnapshot) {
        self.sequences = snapshot.sequences;
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.sequences
            .iter()
            .position(|s| s.id == key || s.name == key)
    }

    fn resolve(&mut self, key: &str) -> Option<&mut Sequence> {
        let sequence = self
            .sequences
            .iter_mut()
            .find(|s| s.id == key || s.name == key);
        if sequence.is_none() {
            debug!(sequence = key, "unknown sequence");
        }
        sequence
    }
}
