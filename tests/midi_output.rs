// Integration test: MIDI output from sequencer playback
//
// Uses the in-memory transport to observe exactly what reaches each device.

use stepgrid::midi::queue::SoundingNote;
use stepgrid::{
    ChannelConfig, ChannelKind, DeviceStatus, ManualTime, MemoryTransport, MidiEvent,
    OutboundMessage, Page, Sequence, SequencerConfig, SequencerContext, Step, SynthSettings,
};

fn context(transport: MemoryTransport) -> (ManualTime, SequencerContext<MemoryTransport>) {
    let time = ManualTime::new(0.0);
    let config = SequencerConfig {
        bpm: 150.0,
        ticks_per_beat: 4,
        default_note_duration_ms: 50.0,
        ..SequencerConfig::default()
    };
    let ctx = SequencerContext::init(config, transport, Box::new(time.clone()));
    (time, ctx)
}

fn note_ons(events: &[MidiEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            MidiEvent::NoteOn { note, .. } => Some(*note),
            _ => None,
        })
        .collect()
}

fn note_offs(events: &[MidiEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            MidiEvent::NoteOff { note, .. } => Some(*note),
            _ => None,
        })
        .collect()
}

#[test]
fn test_same_note_sent_twice_reaches_device_once() {
    let (time, mut ctx) = context(MemoryTransport::new(["Synth"]));
    ctx.send_midi("Synth", OutboundMessage::note_on(0, 60, 40));
    ctx.send_midi("Synth", OutboundMessage::note_on(0, 60, 100));
    ctx.run_until(&time, 100.0);

    assert_eq!(
        ctx.midi().transport().events_for("Synth"),
        vec![MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100
        }]
    );
}

#[test]
fn test_drum_hits_play_and_release() {
    let (time, mut ctx) = context(MemoryTransport::new(["Drums"]));
    let mut seq = Sequence::drum_machine(
        "Drums",
        vec![ChannelConfig::midi(9, 36), ChannelConfig::midi(9, 38)],
    )
    .with_n_steps(4)
    .with_midi_out("Drums");
    seq.patterns[0].pages[0] = Page::with_steps(vec![
        Step::new(0, 0),
        Step::new(1, 2).with_volume(0.5),
    ]);
    ctx.add_sequence(seq);

    ctx.start();
    ctx.run_until(&time, 390.0);
    ctx.stop();
    ctx.run_until(&time, 1000.0);

    assert_eq!(
        ctx.midi().transport().events_for("Drums"),
        vec![
            MidiEvent::NoteOn {
                channel: 9,
                note: 36,
                velocity: 127
            },
            MidiEvent::NoteOff {
                channel: 9,
                note: 36,
                velocity: 0
            },
            MidiEvent::NoteOn {
                channel: 9,
                note: 38,
                velocity: 64
            },
            MidiEvent::NoteOff {
                channel: 9,
                note: 38,
                velocity: 0
            },
        ]
    );
}

#[test]
fn test_volume_cc_reaches_device_before_its_note() {
    let (time, mut ctx) = context(MemoryTransport::new(["Drums"]));
    let mut kick = ChannelConfig::midi(9, 36);
    if let ChannelKind::Midi { volume_cc, .. } = &mut kick.kind {
        *volume_cc = Some(7);
    }
    let mut seq = Sequence::drum_machine("Drums", vec![kick])
        .with_n_steps(4)
        .with_midi_out("Drums");
    seq.patterns[0].pages[0] = Page::with_steps(vec![
        Step::new(0, 0),
        Step::new(0, 2).with_volume(0.5),
        Step::new(0, 3).with_volume(0.0),
    ]);
    ctx.add_sequence(seq);

    ctx.start();
    ctx.run_until(&time, 390.0);
    ctx.stop();
    ctx.run_until(&time, 1000.0);

    let cc = |value| MidiEvent::ControlChange {
        channel: 9,
        controller: 7,
        value,
    };
    let on = |velocity| MidiEvent::NoteOn {
        channel: 9,
        note: 36,
        velocity,
    };
    let off = MidiEvent::NoteOff {
        channel: 9,
        note: 36,
        velocity: 0,
    };
    // The silent step at column 3 sends nothing
    assert_eq!(
        ctx.midi().transport().events_for("Drums"),
        vec![cc(127), on(127), off, cc(64), on(64), off]
    );
}

#[test]
fn test_monophonic_synth_cuts_previous_note() {
    let (time, mut ctx) = context(MemoryTransport::new(["Synth"]));
    let settings = SynthSettings {
        note_duration: 500.0,
        ..SynthSettings::default()
    };
    let mut seq = Sequence::synth("Lead", settings)
        .with_n_steps(2)
        .with_midi_out("Synth");
    // Row 7 is the root (60), row 5 two degrees higher (64)
    seq.patterns[0].pages[0] = Page::with_steps(vec![Step::new(7, 0), Step::new(5, 1)]);
    ctx.add_sequence(seq);

    ctx.start();
    ctx.run_until(&time, 50.0);
    let first: Vec<u8> = ctx
        .midi()
        .sounding_notes("Synth")
        .iter()
        .map(|n: &SoundingNote| n.note)
        .collect();
    assert_eq!(first, vec![60]);

    ctx.run_until(&time, 150.0);
    ctx.stop();
    let sounding: Vec<u8> = ctx
        .midi()
        .sounding_notes("Synth")
        .iter()
        .map(|n| n.note)
        .collect();
    assert_eq!(sounding, vec![64]);

    ctx.run_until(&time, 2000.0);
    let events = ctx.midi().transport().events_for("Synth");
    assert_eq!(note_ons(&events), vec![60, 64]);
    // The first note's release was cancelled by the override
    assert_eq!(note_offs(&events), vec![64]);
}

#[test]
fn test_polyphonic_synth_releases_every_note() {
    let (time, mut ctx) = context(MemoryTransport::new(["Synth"]));
    let settings = SynthSettings {
        note_duration: 500.0,
        is_polyphonic: true,
        ..SynthSettings::default()
    };
    let mut seq = Sequence::synth("Pad", settings)
        .with_n_steps(2)
        .with_midi_out("Synth");
    seq.patterns[0].pages[0] = Page::with_steps(vec![Step::new(7, 0), Step::new(5, 1)]);
    ctx.add_sequence(seq);

    ctx.start();
    ctx.run_until(&time, 150.0);
    ctx.stop();
    ctx.run_until(&time, 2000.0);

    let events = ctx.midi().transport().events_for("Synth");
    assert_eq!(note_ons(&events), vec![60, 64]);
    assert_eq!(note_offs(&events), vec![60, 64]);
}

#[test]
fn test_messages_wait_for_midi_access() {
    let (time, mut ctx) = context(MemoryTransport::pending(["Synth"]));
    ctx.send_midi("Synth", OutboundMessage::note_on(0, 60, 100));
    ctx.run_until(&time, 100.0);

    assert_eq!(ctx.midi().device_status("Synth"), Some(DeviceStatus::Connecting));
    assert!(ctx.midi().transport().sent().is_empty());

    ctx.midi_transport_mut().grant_access();
    ctx.midi_access_granted();
    ctx.run_until(&time, 200.0);

    assert_eq!(ctx.midi().device_status("Synth"), Some(DeviceStatus::Connected));
    assert_eq!(ctx.midi().transport().events_for("Synth").len(), 1);
}

#[test]
fn test_vanished_device_is_torn_down() {
    let (time, mut ctx) = context(MemoryTransport::new(["Synth"]));
    ctx.send_midi(
        "Synth",
        OutboundMessage::note_on(0, 60, 100).with_duration(300.0),
    );
    ctx.run_until(&time, 50.0);

    ctx.midi_transport_mut().remove_device("Synth");
    ctx.refresh_midi_devices();
    assert_eq!(ctx.midi().device_status("Synth"), None);

    // The pending note-off fires against a missing device and is dropped
    ctx.run_until(&time, 1000.0);
    assert_eq!(ctx.midi().transport().sent().len(), 1);
    assert!(ctx.midi().devices().is_empty());
}

#[test]
fn test_removing_sequence_releases_its_device() {
    let (time, mut ctx) = context(MemoryTransport::new(["A", "B"]));
    ctx.add_sequence(Sequence::drum_machine("One", vec![]).with_midi_out("A"));
    ctx.add_sequence(Sequence::drum_machine("Two", vec![]).with_midi_out("A"));
    ctx.add_sequence(Sequence::drum_machine("Three", vec![]).with_midi_out("B"));
    ctx.send_midi("A", OutboundMessage::control_change(0, 7, 100));
    ctx.send_midi("B", OutboundMessage::control_change(0, 7, 100));
    ctx.run_until(&time, 20.0);

    assert!(ctx.remove_sequence("One").is_some());
    assert_eq!(ctx.midi().devices(), vec!["A", "B"]);

    assert!(ctx.remove_sequence("Two").is_some());
    assert_eq!(ctx.midi().devices(), vec!["B"]);

    assert!(ctx.remove_sequence("Two").is_none());
}

#[test]
fn test_action_message_switches_device() {
    let (time, mut ctx) = context(MemoryTransport::new(["A", "B"]));
    ctx.add_sequence(Sequence::drum_machine("Drums", vec![]).with_midi_out("A"));
    ctx.send_midi("A", OutboundMessage::control_change(0, 7, 100));
    ctx.run_until(&time, 20.0);

    let action: stepgrid::ActionMessage = serde_json::from_str(
        r#"{"sequenceName": "Drums", "parameter": "midiOutDeviceName", "value": "B"}"#,
    )
    .unwrap();
    let outcome = ctx.perform_action(&action);

    assert!(outcome.applied);
    assert_eq!(outcome.released_device.as_deref(), Some("A"));
    assert!(ctx.midi().devices().is_empty());
    assert_eq!(
        ctx.store().get("Drums").unwrap().midi_out_device_name.as_deref(),
        Some("B")
    );
}
