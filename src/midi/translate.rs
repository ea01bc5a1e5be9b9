// Step to MIDI translation

use crate::midi::message::OutboundMessage;
use crate::sequencer::model::{ChannelKind, Sequence, SequenceKind, Step};

/// Where a fired step goes
#[derive(Debug, Clone, PartialEq)]
pub enum StepRoute<'a> {
    /// Messages to queue on `device`, in submission order
    ///
    /// The device queue sends the newest message first, so anything that must
    /// reach the device before a note is submitted after it.
    Midi {
        device: &'a str,
        messages: Vec<OutboundMessage>,
    },
    /// Sample or line-in channel, handled by the audio collaborator
    Audio,
    /// Nothing to play (no output device, unknown channel)
    Silent,
}

/// Velocity 0-127 from a step volume and a channel volume (both 0.0-1.0)
pub fn velocity(step_volume: Option<f32>, channel_volume: f32) -> u8 {
    let scaled = step_volume.unwrap_or(1.0) * channel_volume * 127.0;
    scaled.round().clamp(0.0, 127.0) as u8
}

/// Translate one trigger into its output route
///
/// `step` is `None` for auditions, which play at full step volume. A note
/// whose velocity rounds to 0 is not played.
pub fn route_step<'a>(
    sequence: &'a Sequence,
    channel_index: i32,
    step: Option<&Step>,
    default_note_duration_ms: f64,
) -> StepRoute<'a> {
    let step_volume = step.and_then(|s| s.volume);

    match &sequence.kind {
        SequenceKind::DrumMachine { .. } => {
            let Some(config) = sequence.channel_config(channel_index) else {
                return StepRoute::Silent;
            };
            let velocity = velocity(step_volume, config.volume_or_default());

            let messages = match config.kind {
                ChannelKind::Sample { .. } | ChannelKind::LineIn => return StepRoute::Audio,
                ChannelKind::Midi {
                    channel,
                    note,
                    volume_cc,
                } => {
                    if velocity == 0 {
                        return StepRoute::Silent;
                    }
                    let mut messages = vec![
                        OutboundMessage::note_on(channel, note, velocity)
                            .with_duration(default_note_duration_ms),
                    ];
                    // Volume goes out ahead of the note
                    if let Some(cc) = volume_cc {
                        messages.push(OutboundMessage::control_change(channel, cc, velocity));
                    }
                    messages
                }
                ChannelKind::MidiCc {
                    channel,
                    cc,
                    is_fixed_value,
                    fixed_value,
                } => {
                    let value = if is_fixed_value {
                        fixed_value.unwrap_or(0)
                    } else {
                        velocity
                    };
                    vec![OutboundMessage::control_change(channel, cc, value)]
                }
            };

            match sequence.midi_out_device_name.as_deref() {
                Some(device) => StepRoute::Midi { device, messages },
                None => StepRoute::Silent,
            }
        }
        SequenceKind::Synth(settings) => {
            let Some(device) = sequence.midi_out_device_name.as_deref() else {
                return StepRoute::Silent;
            };
            let velocity = velocity(step_volume, 1.0);
            if velocity == 0 {
                return StepRoute::Silent;
            }
            let mut message = OutboundMessage::note_on(
                settings.midi_channel,
                settings.note_for_channel(channel_index),
                velocity,
            )
            .with_duration(settings.note_duration);
            if !settings.is_polyphonic {
                message = message.monophonic();
            }
            StepRoute::Midi {
                device,
                messages: vec![message],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::model::{ChannelConfig, SynthSettings};
    use crate::sequencer::scale::Scale;

    #[test]
    fn test_velocity() {
        assert_eq!(velocity(None, 1.0), 127);
        assert_eq!(velocity(Some(0.5), 1.0), 64);
        assert_eq!(velocity(Some(0.5), 0.5), 32);
        assert_eq!(velocity(Some(2.0), 1.0), 127);
        assert_eq!(velocity(Some(0.0), 1.0), 0);
    }

    #[test]
    fn test_drum_note_with_volume_cc() {
        let mut kick = ChannelConfig::midi(9, 36);
        if let ChannelKind::Midi { volume_cc, .. } = &mut kick.kind {
            *volume_cc = Some(7);
        }
        let seq = Sequence::drum_machine("Drums", vec![kick]).with_midi_out("Drums Out");
        let step = Step::new(0, 0).with_volume(0.5);

        let route = route_step(&seq, 0, Some(&step), 150.0);
        assert_eq!(
            route,
            StepRoute::Midi {
                device: "Drums Out",
                messages: vec![
                    OutboundMessage::note_on(9, 36, 64).with_duration(150.0),
                    OutboundMessage::control_change(9, 7, 64),
                ],
            }
        );
    }

    #[test]
    fn test_silent_step_plays_nothing() {
        let seq = Sequence::drum_machine("Drums", vec![ChannelConfig::midi(9, 36)])
            .with_midi_out("Drums Out");
        let step = Step::new(0, 0).with_volume(0.0);
        assert_eq!(route_step(&seq, 0, Some(&step), 100.0), StepRoute::Silent);

        let synth = Sequence::synth("Lead", SynthSettings::default()).with_midi_out("Synth");
        let step = Step::new(7, 0).with_volume(0.001);
        assert_eq!(route_step(&synth, 7, Some(&step), 100.0), StepRoute::Silent);
    }

    #[test]
    fn test_fixed_value_cc() {
        let mut config = ChannelConfig::midi_cc(0, 74);
        if let ChannelKind::MidiCc {
            is_fixed_value,
            fixed_value,
            ..
        } = &mut config.kind
        {
            *is_fixed_value = true;
            *fixed_value = Some(20);
        }
        let seq = Sequence::drum_machine("Filter", vec![config]).with_midi_out("Out");

        let route = route_step(&seq, 0, Some(&Step::new(0, 3)), 100.0);
        assert_eq!(
            route,
            StepRoute::Midi {
                device: "Out",
                messages: vec![OutboundMessage::control_change(0, 74, 20)],
            }
        );
    }

    #[test]
    fn test_audio_channels() {
        let seq = Sequence::drum_machine(
            "Kit",
            vec![ChannelConfig::sample("kick.wav"), ChannelConfig::line_in()],
        );
        assert_eq!(route_step(&seq, 0, None, 100.0), StepRoute::Audio);
        assert_eq!(route_step(&seq, 1, None, 100.0), StepRoute::Audio);
        assert_eq!(route_step(&seq, 2, None, 100.0), StepRoute::Silent);
    }

    #[test]
    fn test_midi_without_device_is_silent() {
        let seq = Sequence::drum_machine("Drums", vec![ChannelConfig::midi(9, 36)]);
        assert_eq!(route_step(&seq, 0, None, 100.0), StepRoute::Silent);
    }

    #[test]
    fn test_synth_note() {
        let settings = SynthSettings {
            root_note: 60,
            scale: Scale::Chromatic,
            range: 15,
            note_duration: 300.0,
            midi_channel: 3,
            is_polyphonic: false,
        };
        let seq = Sequence::synth("Lead", settings).with_midi_out("Synth");

        // Row 7 is the root in a 15-row grid
        let route = route_step(&seq, 7, Some(&Step::new(7, 0)), 100.0);
        assert_eq!(
            route,
            StepRoute::Midi {
                device: "Synth",
                messages: vec![
                    OutboundMessage::note_on(3, 60, 127)
                        .with_duration(300.0)
                        .monophonic()
                ],
            }
        );

        // Row 0 is the top of the range
        let StepRoute::Midi { messages, .. } = route_step(&seq, 0, None, 100.0) else {
            panic!("expected a MIDI route");
        };
        assert_eq!(messages[0].note_key(), Some((3, 67)));
    }

    #[test]
    fn test_polyphonic_synth_is_not_monophonic() {
        let settings = SynthSettings {
            is_polyphonic: true,
            ..SynthSettings::default()
        };
        let seq = Sequence::synth("Pad", settings).with_midi_out("Synth");
        let StepRoute::Midi { messages, .. } = route_step(&seq, 7, None, 100.0) else {
            panic!("expected a MIDI route");
        };
        assert!(matches!(
            messages[0],
            OutboundMessage::Note {
                is_monophonic: false,
                ..
            }
        ));
    }
}
