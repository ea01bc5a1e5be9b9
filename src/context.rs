// Sequencer context - Owner of the event loop
//
// Clock, store, dispatcher and MIDI router all live here and are driven from
// one cooperative loop. Every task runs to completion before the next one
// starts, so store mutations never interleave with a tick evaluation.

use crate::config::SequencerConfig;
use crate::midi::message::OutboundMessage;
use crate::midi::queue::MidiOutputRouter;
use crate::midi::translate::{StepRoute, route_step};
use crate::midi::transport::MidiTransport;
use crate::sequencer::{
    ActionMessage, Sequence, SequenceStore, SequenceUpdate, SequenceUpdateOutcome,
    Step, StepDispatcher, TriggerSink,
};
use crate::timing::{Clock, ManualTime, Scheduler, SubscriberId, Tempo, Tick, TimeSource};
use std::time::Duration;
use tracing::{debug, info};

/// Work items of the event loop
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduledTask {
    ClockFire,
    /// One drain step of a device queue
    DrainMidi(String),
    /// Delayed submission of a message (note-offs)
    DeferredSend {
        device: String,
        message: OutboundMessage,
    },
}

pub struct SequencerContext<T: MidiTransport> {
    config: SequencerConfig,
    tempo: Tempo,
    scheduler: Scheduler<ScheduledTask>,
    clock: Clock,
    store: SequenceStore,
    dispatcher: StepDispatcher,
    router: MidiOutputRouter<T>,
    audio_sink: Option<Box<dyn TriggerSink>>,
}

impl<T: MidiTransport> SequencerContext<T> {
    pub fn init(config: SequencerConfig, transport: T, time: Box<dyn TimeSource>) -> Self {
        let tempo = config.tempo();
        let mut clock = Clock::new(config.tick_interval_ms());
        clock.set_swing(config.swing);
        let router =
            MidiOutputRouter::with_drain_interval(transport, config.midi_drain_interval_ms);

        info!(
            bpm = tempo.bpm(),
            ticks_per_beat = config.ticks_per_beat,
            midi_ready = router.transport().is_ready(),
            "Sequencer context initialized"
        );

        Self {
            config,
            tempo,
            scheduler: Scheduler::new(time),
            clock,
            store: SequenceStore::new(),
            dispatcher: StepDispatcher::new(),
            router,
            audio_sink: None,
        }
    }

    /// Replace the dispatcher (e.g. one with a seeded RNG)
    pub fn with_dispatcher(mut self, dispatcher: StepDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Stop playback, drop every device queue and clear all state
    pub fn teardown(&mut self) {
        self.stop();
        self.router.unregister_all(&mut self.scheduler);
        self.store.clear();
        self.dispatcher.reset();
        self.scheduler.clear();
        info!("Sequencer context torn down");
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn now_ms(&self) -> f64 {
        self.scheduler.now_ms()
    }

    // ===== Event loop =====

    /// Deadline of the next scheduled task
    pub fn next_deadline(&mut self) -> Option<f64> {
        self.scheduler.next_deadline()
    }

    /// Run every task that is due now. Returns the number of tasks run.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.scheduler.pop_due() {
            self.run_task(task);
            ran += 1;
        }
        ran
    }

    /// Advance simulated time to `until_ms`, running tasks at their deadlines
    pub fn run_until(&mut self, time: &ManualTime, until_ms: f64) -> usize {
        let mut ran = self.run_pending();
        while let Some(deadline) = self.scheduler.next_deadline() {
            if deadline > until_ms {
                break;
            }
            if deadline > self.now_ms() {
                time.set(deadline);
            }
            ran += self.run_pending();
        }
        if until_ms > self.now_ms() {
            time.set(until_ms);
        }
        ran
    }

    /// Run the loop in real time for `duration`, sleeping between deadlines
    pub fn run_for(&mut self, duration: Duration) -> usize {
        let end = self.now_ms() + duration.as_secs_f64() * 1000.0;
        let mut ran = 0;
        loop {
            ran += self.run_pending();

            let now = self.now_ms();
            if now >= end {
                break;
            }
            let wake = self.scheduler.next_deadline().map_or(end, |d| d.min(end));
            if wake > now {
                std::thread::sleep(Duration::from_secs_f64((wake - now) / 1000.0));
            }
        }
        ran
    }

    fn run_task(&mut self, task: ScheduledTask) {
        match task {
            ScheduledTask::ClockFire => {
                if let Some(tick) = self.clock.fire(&mut self.scheduler) {
                    self.dispatch_tick(tick);
                }
            }
            ScheduledTask::DrainMidi(device) => self.router.drain(&mut self.scheduler, &device),
            ScheduledTask::DeferredSend { device, message } => {
                self.router
                    .deferred_send(&mut self.scheduler, &device, message)
            }
        }
    }

    fn dispatch_tick(&mut self, tick: Tick) {
        let mut sink = SessionTrigger {
            router: &mut self.router,
            scheduler: &mut self.scheduler,
            audio: self.audio_sink.as_deref_mut(),
            default_note_duration_ms: self.config.default_note_duration_ms,
        };
        self.dispatcher.on_tick(tick, &self.store, &mut sink);
    }

    // ===== Clock =====

    pub fn start(&mut self) {
        info!(interval_ms = self.clock.interval_ms(), "Clock started");
        self.clock.start(&mut self.scheduler);
    }

    /// Stop the clock; the stop tick also resets every playhead
    pub fn stop(&mut self) {
        if let Some(tick) = self.clock.stop(&mut self.scheduler) {
            info!("Clock stopped");
            self.dispatch_tick(tick);
        }
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    pub fn current_tick(&self) -> Tick {
        self.clock.current_tick()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn set_interval(&mut self, interval_ms: f64) {
        self.clock.set_interval(interval_ms);
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Change the tempo; the clock interval follows from `ticks_per_beat`
    pub fn set_tempo(&mut self, bpm: f64) {
        self.tempo.set_bpm(bpm);
        self.config.bpm = self.tempo.bpm();
        self.clock
            .set_interval(self.tempo.tick_interval_ms(self.config.ticks_per_beat));
        debug!(tempo = %self.tempo, "Tempo changed");
    }

    pub fn set_swing(&mut self, swing: f64) {
        self.clock.set_swing(swing);
        self.config.swing = self.clock.swing();
    }

    /// Listen to every published tick (including the stop tick)
    pub fn subscribe(&mut self, handler: impl FnMut(Tick) + 'static) -> SubscriberId {
        self.clock.subscribe(Box::new(handler))
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.clock.unsubscribe(id)
    }

    // ===== Store =====

    pub fn store(&self) -> &SequenceStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SequenceStore {
        &mut self.store
    }

    pub fn dispatcher(&self) -> &StepDispatcher {
        &self.dispatcher
    }

    pub fn add_sequence(&mut self, sequence: Sequence) -> String {
        self.store.add_sequence(sequence)
    }

    /// Update a sequence and unregister a device it stopped using
    pub fn update_sequence(&mut self, key: &str, update: &SequenceUpdate) -> SequenceUpdateOutcome {
        let outcome = self.store.update_sequence(key, update);
        self.release_device(outcome.released_device.as_deref());
        outcome
    }

    pub fn perform_action(&mut self, action: &ActionMessage) -> SequenceUpdateOutcome {
        let outcome = self.store.perform_action(action);
        self.release_device(outcome.released_device.as_deref());
        outcome
    }

    pub fn remove_sequence(&mut self, key: &str) -> Option<Sequence> {
        let removed = self.store.remove_sequence(key)?;
        self.release_device(removed.released_device.as_deref());
        Some(removed.sequence)
    }

    fn release_device(&mut self, device: Option<&str>) {
        if let Some(device) = device {
            self.router.unregister(&mut self.scheduler, device);
        }
    }

    // ===== Output =====

    /// Receiver of sample and line-in triggers
    pub fn set_audio_sink(&mut self, sink: Box<dyn TriggerSink>) {
        self.audio_sink = Some(sink);
    }

    pub fn clear_audio_sink(&mut self) {
        self.audio_sink = None;
    }

    /// Play one channel of a sequence outside the grid
    pub fn audition(&mut self, key: &str, channel_index: i32) -> bool {
        let Some(sequence) = self.store.get(key) else {
            debug!(sequence = key, "audition: unknown sequence");
            return false;
        };
        let mut sink = SessionTrigger {
            router: &mut self.router,
            scheduler: &mut self.scheduler,
            audio: self.audio_sink.as_deref_mut(),
            default_note_duration_ms: self.config.default_note_duration_ms,
        };
        sink.trigger(sequence, channel_index, None);
        true
    }

    pub fn send_midi(&mut self, device: &str, message: OutboundMessage) {
        self.router.send(&mut self.scheduler, device, message);
    }

    pub fn midi(&self) -> &MidiOutputRouter<T> {
        &self.router
    }

    pub fn midi_transport_mut(&mut self) -> &mut T {
        self.router.transport_mut()
    }

    /// The platform granted MIDI access; queued messages start flowing
    pub fn midi_access_granted(&mut self) {
        self.router.on_access_granted(&mut self.scheduler);
    }

    pub fn refresh_midi_devices(&mut self) {
        self.router.refresh_devices(&mut self.scheduler);
    }
}

/// Routes dispatcher triggers to the MIDI router or the audio sink
struct SessionTrigger<'a, T: MidiTransport> {
    router: &'a mut MidiOutputRouter<T>,
    scheduler: &'a mut Scheduler<ScheduledTask>,
    audio: Option<&'a mut (dyn TriggerSink + 'static)>,
    default_note_duration_ms: f64,
}

impl<T: MidiTransport> TriggerSink for SessionTrigger<'_, T> {
    fn trigger(&mut self, sequence: &Sequence, channel_index: i32, step: Option<&Step>) {
        match route_step(sequence, channel_index, step, self.default_note_duration_ms) {
            StepRoute::Midi { device, messages } => {
                for message in messages {
                    self.router.send(self.scheduler, device, message);
                }
            }
            StepRoute::Audio => {
                if let Some(audio) = self.audio.as_deref_mut() {
                    audio.trigger(sequence, channel_index, step);
                }
            }
            StepRoute::Silent => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::MidiEvent;
    use crate::midi::transport::MemoryTransport;
    use crate::sequencer::{ChannelConfig, Page};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn context(devices: &[&str]) -> (ManualTime, SequencerContext<MemoryTransport>) {
        let time = ManualTime::new(0.0);
        let config = SequencerConfig {
            bpm: 150.0,
            ticks_per_beat: 4,
            ..SequencerConfig::default()
        };
        let ctx = SequencerContext::init(
            config,
            MemoryTransport::new(devices.iter().copied()),
            Box::new(time.clone()),
        );
        (time, ctx)
    }

    #[test]
    fn test_tempo_sets_interval() {
        let (_time, mut ctx) = context(&[]);
        assert!((ctx.clock().interval_ms() - 100.0).abs() < 1e-9);

        ctx.set_tempo(120.0);
        assert!((ctx.clock().interval_ms() - 125.0).abs() < 1e-9);
        assert_eq!(ctx.config().bpm, 120.0);
    }

    #[test]
    fn test_ticks_reach_subscribers_and_dispatcher() {
        let (time, mut ctx) = context(&["Drums"]);
        let mut seq = Sequence::drum_machine("Drums", vec![ChannelConfig::midi(9, 36)])
            .with_n_steps(4)
            .with_midi_out("Drums");
        seq.patterns[0].pages[0] = Page::with_steps(vec![Step::new(0, 0), Step::new(0, 2)]);
        ctx.add_sequence(seq);

        let ticks = Rc::new(RefCell::new(Vec::new()));
        let recorded = ticks.clone();
        ctx.subscribe(move |tick| recorded.borrow_mut().push(tick));

        ctx.start();
        ctx.run_until(&time, 350.0);
        ctx.stop();

        assert_eq!(*ticks.borrow(), vec![0, 1, 2, 3, -1]);
        let note_ons = ctx
            .midi()
            .transport()
            .events_for("Drums")
            .into_iter()
            .filter(|event| matches!(event, MidiEvent::NoteOn { .. }))
            .count();
        assert_eq!(note_ons, 2);
    }

    #[test]
    fn test_audio_channels_go_to_sink() {
        let (time, mut ctx) = context(&[]);
        let mut seq = Sequence::drum_machine(
            "Kit",
            vec![ChannelConfig::sample("kick.wav"), ChannelConfig::midi(9, 38)],
        )
        .with_n_steps(2);
        seq.patterns[0].pages[0] = Page::with_steps(vec![Step::new(0, 0), Step::new(1, 0)]);
        ctx.add_sequence(seq);

        let hits = Rc::new(RefCell::new(Vec::new()));
        let recorded = hits.clone();
        ctx.set_audio_sink(Box::new(
            move |_seq: &Sequence, channel: i32, step: Option<&Step>| {
                recorded.borrow_mut().push((channel, step.is_some()));
            },
        ));

        ctx.start();
        ctx.run_until(&time, 50.0);
        assert!(ctx.audition("Kit", 0));
        assert!(!ctx.audition("Missing", 0));

        assert_eq!(*hits.borrow(), vec![(0, true), (0, false)]);
    }

    #[test]
    fn test_device_change_unregisters_old_queue() {
        let (time, mut ctx) = context(&["A", "B"]);
        ctx.add_sequence(Sequence::drum_machine("Drums", vec![]).with_midi_out("A"));
        ctx.send_midi("A", OutboundMessage::note_on(0, 60, 100));
        ctx.run_until(&time, 20.0);
        assert_eq!(ctx.midi().devices(), vec!["A"]);

        let update = SequenceUpdate {
            midi_out_device_name: Some(Some("B".to_string())),
            ..Default::default()
        };
        let outcome = ctx.update_sequence("Drums", &update);
        assert_eq!(outcome.released_device.as_deref(), Some("A"));
        assert!(ctx.midi().devices().is_empty());
    }

    #[test]
    fn test_teardown_clears_everything() {
        let (time, mut ctx) = context(&["A"]);
        ctx.add_sequence(Sequence::drum_machine("Drums", vec![]).with_midi_out("A"));
        ctx.send_midi("A", OutboundMessage::note_on(0, 60, 100));
        ctx.start();
        ctx.run_until(&time, 5.0);

        ctx.teardown();
        assert!(!ctx.is_running());
        assert!(ctx.store().is_empty());
        assert!(ctx.midi().devices().is_empty());
        assert_eq!(ctx.run_until(&time, 1000.0), 0);
    }
}
