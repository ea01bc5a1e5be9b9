// stepgrid demo - plays a short pattern on the first MIDI output
//
// Usage: stepgrid [device name] [seconds]

use std::time::Duration;
use stepgrid::{
    ChannelConfig, MidiTransport, MidirTransport, MonotonicTime, Page, Scale, Sequence,
    SequencerConfig, SequencerContext, Step, SynthSettings,
};
use tracing::{error, info, warn};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== stepgrid ===");

    let config = match SequencerConfig::default_path() {
        Some(path) => match SequencerConfig::load_or_default(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Config not readable, using defaults");
                SequencerConfig::default()
            }
        },
        None => SequencerConfig::default(),
    };

    let mut args = std::env::args().skip(1);
    let device_arg = args.next();
    let seconds = args
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(8);

    let mut transport = MidirTransport::new(config.client_name.clone());
    if let Err(e) = transport.request_access() {
        error!(error = %e, "MIDI unavailable");
        return;
    }

    let available = transport.output_device_names();
    println!("MIDI outputs:");
    for name in &available {
        println!("  - {}", name);
    }

    let Some(device) = device_arg.or_else(|| available.first().cloned()) else {
        error!("No MIDI output found");
        return;
    };
    info!(device = %device, "Playing demo pattern");

    let mut ctx = SequencerContext::init(config, transport, Box::new(MonotonicTime::new()));
    ctx.midi_access_granted();

    let mut drums = Sequence::drum_machine(
        "Drums",
        vec![
            ChannelConfig::midi(9, 36).with_name("Kick"),
            ChannelConfig::midi(9, 38).with_name("Snare"),
            ChannelConfig::midi(9, 42).with_name("Hat"),
        ],
    )
    .with_midi_out(device.clone());
    let mut steps = vec![
        Step::new(0, 0),
        Step::new(0, 8),
        Step::new(1, 4),
        Step::new(1, 12),
    ];
    steps.extend((0..16).step_by(2).map(|i| Step::new(2, i).with_volume(0.6)));
    steps.push(Step::new(0, 14).with_probability(0.5));
    drums.patterns[0].pages[0] = Page::with_steps(steps);

    let mut bass = Sequence::synth(
        "Bass",
        SynthSettings {
            root_note: 36,
            scale: Scale::PentatonicMinor,
            midi_channel: 1,
            note_duration: 180.0,
            ..SynthSettings::default()
        },
    )
    .with_midi_out(device)
    .with_step_length(2);
    bass.patterns[0].pages[0] = Page::with_steps(vec![
        Step::new(7, 0),
        Step::new(7, 2),
        Step::new(5, 3),
        Step::new(4, 5),
        Step::new(6, 6),
    ]);

    ctx.add_sequence(drums);
    ctx.add_sequence(bass);

    ctx.start();
    ctx.run_for(Duration::from_secs(seconds));
    ctx.stop();
    // Let the last note-offs through
    ctx.run_for(Duration::from_millis(500));
    ctx.teardown();

    println!("Done.");
}
