// Scales used to map synth rows to MIDI notes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Musical scale as semitone offsets within one octave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scale {
    Chromatic,
    #[default]
    Major,
    Minor,
    HarmonicMinor,
    Dorian,
    PentatonicMajor,
    PentatonicMinor,
    Blues,
}

impl Scale {
    pub fn intervals(&self) -> &'static [i32] {
        match self {
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Scale::PentatonicMajor => &[0, 2, 4, 7, 9],
            Scale::PentatonicMinor => &[0, 3, 5, 7, 10],
            Scale::Blues => &[0, 3, 5, 6, 7, 10],
        }
    }

    /// Semitone offset of a scale degree relative to the root
    ///
    /// Degrees below zero walk down from the root, wrapping octaves.
    pub fn semitone_offset(&self, degree: i32) -> i32 {
        let intervals = self.intervals();
        let len = intervals.len() as i32;
        let octave = degree.div_euclid(len);
        let index = degree.rem_euclid(len) as usize;
        octave * 12 + intervals[index]
    }

    /// MIDI note for a scale degree, clamped to 0..=127
    pub fn note_for_degree(&self, root_note: u8, degree: i32) -> u8 {
        (root_note as i32 + self.semitone_offset(degree)).clamp(0, 127) as u8
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scale::Chromatic => "Chromatic",
            Scale::Major => "Major",
            Scale::Minor => "Minor",
            Scale::HarmonicMinor => "Harmonic Minor",
            Scale::Dorian => "Dorian",
            Scale::PentatonicMajor => "Pentatonic Major",
            Scale::PentatonicMinor => "Pentatonic Minor",
            Scale::Blues => "Blues",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_scale_degrees() {
        let scale = Scale::Major;
        assert_eq!(scale.note_for_degree(60, 0), 60);
        assert_eq!(scale.note_for_degree(60, 2), 64);
        assert_eq!(scale.note_for_degree(60, 7), 72);
    }

    #[test]
    fn test_negative_degrees_wrap_down() {
        let scale = Scale::Major;
        assert_eq!(scale.note_for_degree(60, -1), 59);
        assert_eq!(scale.note_for_degree(60, -7), 48);
    }

    #[test]
    fn test_notes_are_clamped() {
        assert_eq!(Scale::Chromatic.note_for_degree(120, 20), 127);
        assert_eq!(Scale::Chromatic.note_for_degree(5, -20), 0);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Scale::PentatonicMinor).unwrap();
        assert_eq!(json, "\"pentatonic-minor\"");
        let scale: Scale = serde_json::from_str("\"harmonic-minor\"").unwrap();
        assert_eq!(scale, Scale::HarmonicMinor);
    }
}
