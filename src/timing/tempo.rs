// Tempo - BPM to clock interval conversion

use std::fmt;

/// Lowest accepted tempo
pub const MIN_BPM: f64 = 20.0;
/// Highest accepted tempo
pub const MAX_BPM: f64 = 999.0;

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo
    /// BPM is clamped to [20.0, 999.0]; a live tempo knob must never stop the clock
    pub fn new(bpm: f64) -> Self {
        let mut tempo = Self { bpm: 120.0 };
        tempo.set_bpm(bpm);
        tempo
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Set BPM value (non-finite values are ignored)
    pub fn set_bpm(&mut self, bpm: f64) {
        if bpm.is_finite() {
            self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        }
    }

    /// Duration of one beat in milliseconds
    pub fn beat_duration_ms(&self) -> f64 {
        60_000.0 / self.bpm
    }

    /// Clock interval for a given number of ticks per beat
    /// Example: 120 BPM with 4 ticks per beat = 125ms (sixteenth notes)
    pub fn tick_interval_ms(&self, ticks_per_beat: u32) -> f64 {
        self.beat_duration_ms() / ticks_per_beat.max(1) as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}
