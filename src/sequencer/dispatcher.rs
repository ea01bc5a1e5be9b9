// Step trigger dispatcher
//
// Driven by clock ticks. For each sequence it tracks where the playhead is,
// collects the steps of the active column and hands the eligible ones to a
// trigger sink. It never talks to MIDI or audio output itself.

use crate::sequencer::model::{Sequence, Step};
use crate::sequencer::store::SequenceStore;
use crate::timing::Tick;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Receiver of fired steps (MIDI dispatch, sample playback, line-in envelope)
///
/// `step` is `None` for auditions that are not tied to a grid cell.
pub trait TriggerSink {
    fn trigger(&mut self, sequence: &Sequence, channel_index: i32, step: Option<&Step>);
}

impl<F> TriggerSink for F
where
    F: FnMut(&Sequence, i32, Option<&Step>),
{
    fn trigger(&mut self, sequence: &Sequence, channel_index: i32, step: Option<&Step>) {
        self(sequence, channel_index, step)
    }
}

/// Playback position of one sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Playhead {
    pub last_effective_tick: Tick,
    /// Active column, -1 while stopped
    pub active_step_index: i64,
    pub active_page_index: usize,
}

impl Default for Playhead {
    fn default() -> Self {
        Self {
            last_effective_tick: -1,
            active_step_index: -1,
            active_page_index: 0,
        }
    }
}

impl Playhead {
    /// Advance for a published tick. Returns true when the column changed.
    pub fn advance(
        &mut self,
        tick: Tick,
        step_length: u32,
        n_steps: usize,
        page_count: usize,
    ) -> bool {
        let effective = tick.div_euclid(step_length.max(1) as i64);
        if effective == self.last_effective_tick {
            return false;
        }
        self.last_effective_tick = effective;

        if tick <= 0 {
            self.active_step_index = tick;
            self.active_page_index = 0;
        } else {
            // A playhead joining mid-run starts on its first column, not a wrap
            let previous = self.active_step_index;
            self.active_step_index = (previous + 1).rem_euclid(n_steps.max(1) as i64);
            if previous >= 0 && self.active_step_index == 0 {
                self.active_page_index = (self.active_page_index + 1) % page_count.max(1);
            }
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.active_step_index >= 0
    }
}

/// Probability gate: `None` or exactly 1.0 always fires
pub fn passes_probability<R: Rng + ?Sized>(probability: Option<f32>, rng: &mut R) -> bool {
    match probability {
        None => true,
        Some(p) if p == 1.0 => true,
        Some(p) => rng.gen_range(0.0f32..1.0) < p,
    }
}

pub struct StepDispatcher {
    playheads: HashMap<String, Playhead>,
    rng: StdRng,
}

impl StepDispatcher {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic dispatcher for reproducible probability draws
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            playheads: HashMap::new(),
            rng,
        }
    }

    pub fn playhead(&self, sequence_id: &str) -> Option<&Playhead> {
        self.playheads.get(sequence_id)
    }

    /// Forget every playhead (next tick starts from scratch)
    pub fn reset(&mut self) {
        self.playheads.clear();
    }

    /// Evaluate one clock tick for every sequence in the store
    pub fn on_tick(&mut self, tick: Tick, store: &SequenceStore, sink: &mut dyn TriggerSink) {
        self.playheads
            .retain(|id, _| store.iter().any(|sequence| &sequence.id == id));

        for sequence in store.iter() {
            let playhead = self.playheads.entry(sequence.id.clone()).or_default();
            Self::evaluate(sequence, playhead, tick, &mut self.rng, sink);
        }
    }

    fn evaluate(
        sequence: &Sequence,
        playhead: &mut Playhead,
        tick: Tick,
        rng: &mut StdRng,
        sink: &mut dyn TriggerSink,
    ) {
        let page_count = sequence.current_pattern().map_or(1, |p| p.page_count());
        if !playhead.advance(tick, sequence.step_length, sequence.n_steps, page_count) {
            return;
        }
        if !playhead.is_running() || sequence.is_muted {
            return;
        }

        let Some(page) = sequence.page(playhead.active_page_index % page_count.max(1)) else {
            return;
        };

        let column = playhead.active_step_index as usize;
        for step in page.steps_at(column) {
            if sequence.is_channel_silenced(step.channel) {
                continue;
            }
            if passes_probability(step.probability, rng) {
                sink.trigger(sequence, step.channel, Some(step));
            }
        }
    }
}

impl Default for StepDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::model::{ChannelConfig, Page};

    type Fired = Vec<(i32, usize)>;

    fn collect(fired: &mut Fired) -> impl FnMut(&Sequence, i32, Option<&Step>) + '_ {
        move |_seq: &Sequence, channel: i32, step: Option<&Step>| {
            if let Some(step) = step {
                fired.push((channel, step.step_index));
            }
        }
    }

    fn drums_store(steps: Vec<Step>) -> SequenceStore {
        let mut seq = Sequence::drum_machine(
            "Drums",
            vec![ChannelConfig::midi(9, 36), ChannelConfig::midi(9, 38)],
        )
        .with_n_steps(4);
        seq.patterns[0].pages[0] = Page::with_steps(steps);
        SequenceStore::with_sequences(vec![seq])
    }

    #[test]
    fn test_playhead_walks_columns() {
        let mut playhead = Playhead::default();
        let mut columns = Vec::new();
        for tick in 0..6 {
            playhead.advance(tick, 1, 4, 1);
            columns.push(playhead.active_step_index);
        }
        assert_eq!(columns, vec![0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn test_playhead_subdivision() {
        let mut playhead = Playhead::default();
        let changed: Vec<bool> = (0..6).map(|t| playhead.advance(t, 3, 16, 1)).collect();
        assert_eq!(changed, vec![true, false, false, true, false, false]);
        assert_eq!(playhead.active_step_index, 1);
    }

    #[test]
    fn test_playhead_page_wrap() {
        let mut playhead = Playhead::default();
        let mut pages = Vec::new();
        for tick in 0..8 {
            playhead.advance(tick, 1, 4, 2);
            pages.push(playhead.active_page_index);
        }
        assert_eq!(pages, vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_playhead_joining_mid_run_starts_on_first_page() {
        let mut playhead = Playhead::default();
        let mut positions = Vec::new();
        for tick in 6..12 {
            playhead.advance(tick, 1, 4, 2);
            positions.push((playhead.active_step_index, playhead.active_page_index));
        }
        assert_eq!(
            positions,
            vec![(0, 0), (1, 0), (2, 0), (3, 0), (0, 1), (1, 1)]
        );
    }

    #[test]
    fn test_stop_resets_playhead() {
        let mut playhead = Playhead::default();
        for tick in 0..6 {
            playhead.advance(tick, 2, 4, 2);
        }
        assert!(playhead.advance(-1, 2, 4, 2));
        assert_eq!(playhead.active_step_index, -1);
        assert!(!playhead.is_running());
        assert_eq!(playhead.active_page_index, 0);

        assert!(playhead.advance(0, 2, 4, 2));
        assert_eq!(playhead.active_step_index, 0);
    }

    #[test]
    fn test_fires_active_column() {
        let store = drums_store(vec![Step::new(0, 0), Step::new(1, 0), Step::new(1, 2)]);
        let mut dispatcher = StepDispatcher::with_seed(1);
        let mut fired = Fired::new();

        for tick in 0..4 {
            dispatcher.on_tick(tick, &store, &mut collect(&mut fired));
        }
        assert_eq!(fired, vec![(0, 0), (1, 0), (1, 2)]);
    }

    #[test]
    fn test_stop_tick_fires_nothing() {
        let store = drums_store(vec![Step::new(0, 0)]);
        let mut dispatcher = StepDispatcher::with_seed(1);
        let mut fired = Fired::new();

        dispatcher.on_tick(-1, &store, &mut collect(&mut fired));
        assert!(fired.is_empty());
        let id = &store.iter().next().unwrap().id;
        assert_eq!(dispatcher.playhead(id).unwrap().active_step_index, -1);
    }

    #[test]
    fn test_muted_sequence_and_channels_are_skipped() {
        let mut store = drums_store(vec![Step::new(0, 0), Step::new(1, 0)]);
        let mut dispatcher = StepDispatcher::with_seed(1);
        let mut fired = Fired::new();

        let mut muted = store.clone();
        let _ = muted.update_sequence(
            "Drums",
            &crate::sequencer::update::SequenceUpdate {
                is_muted: Some(true),
                ..Default::default()
            },
        );
        dispatcher.on_tick(0, &muted, &mut collect(&mut fired));
        assert!(fired.is_empty());

        store.update_channel_config(
            "Drums",
            1,
            &crate::sequencer::update::ChannelConfigUpdate {
                is_hidden: Some(true),
                ..Default::default()
            },
        );
        let mut dispatcher = StepDispatcher::with_seed(1);
        dispatcher.on_tick(0, &store, &mut collect(&mut fired));
        assert_eq!(fired, vec![(0, 0)]);
    }

    #[test]
    fn test_probability_gate() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!((0..1000).all(|_| !passes_probability(Some(0.0), &mut rng)));
        assert!((0..1000).all(|_| passes_probability(None, &mut rng)));
        assert!((0..1000).all(|_| passes_probability(Some(1.0), &mut rng)));
        assert!((0..1000).all(|_| passes_probability(Some(1.5), &mut rng)));
        assert!((0..1000).all(|_| !passes_probability(Some(-0.2), &mut rng)));

        let hits = (0..1000)
            .filter(|_| passes_probability(Some(0.5), &mut rng))
            .count();
        assert!((350..650).contains(&hits), "hits = {}", hits);
    }

    #[test]
    fn test_removed_sequences_lose_playhead() {
        let mut store = drums_store(vec![]);
        let mut dispatcher = StepDispatcher::with_seed(1);
        let id = store.iter().next().unwrap().id.clone();

        dispatcher.on_tick(0, &store, &mut collect(&mut Fired::new()));
        assert!(dispatcher.playhead(&id).is_some());

        store.remove_sequence(&id);
        dispatcher.on_tick(1, &store, &mut collect(&mut Fired::new()));
        assert!(dispatcher.playhead(&id).is_none());
    }
}
