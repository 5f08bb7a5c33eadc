// Timeline - Musical time value types
// Tick, tempo, meter and measure-beat-tick positions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer musical time unit, `tpqn` ticks per quarter note
pub type Tick = i64;

/// Default ticks per quarter note (standard MIDI resolution)
pub const DEFAULT_TPQN: Tick = 480;

/// Tempo used before the first tempo break point
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

/// Smallest tempo accepted; anything below (or non-finite) is clamped here
pub const MIN_TEMPO_BPM: f64 = 1.0;

/// Tempo in BPM (quarter notes per minute)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo, clamping invalid values to [`MIN_TEMPO_BPM`]
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm: Self::sanitize(bpm),
        }
    }

    fn sanitize(bpm: f64) -> f64 {
        if bpm.is_finite() && bpm >= MIN_TEMPO_BPM {
            bpm
        } else {
            MIN_TEMPO_BPM
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = Self::sanitize(bpm);
    }

    /// Duration of one quarter note in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one tick in seconds at the given resolution
    pub fn tick_duration_seconds(&self, tpqn: Tick) -> f64 {
        self.beat_duration_seconds() / tpqn.max(1) as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPO_BPM)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Meter (time signature), e.g. 4/4 = `Meter { numerator: 4, denominator: 4 }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Meter {
    pub numerator: u32,
    pub denominator: u32,
}

impl Meter {
    /// Creates a meter. A zero numerator becomes 1 and a zero denominator
    /// becomes 4 so measure arithmetic stays well-defined.
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator: numerator.max(1),
            denominator: if denominator == 0 { 4 } else { denominator },
        }
    }

    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    pub fn six_eight() -> Self {
        Self::new(6, 8)
    }

    /// Length of one beat (one denominator note) in ticks
    pub fn beat_length(&self, tpqn: Tick) -> Tick {
        (tpqn * 4 / self.denominator as Tick).max(1)
    }

    /// Length of one measure in ticks: `tpqn * 4 * numerator / denominator`
    pub fn measure_length(&self, tpqn: Tick) -> Tick {
        (tpqn * 4 * self.numerator as Tick / self.denominator as Tick).max(1)
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Measure-Beat-Tick position. Measure and beat are 1-based, tick is the
/// remainder inside the beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mbt {
    pub measure: u32,
    pub beat: u32,
    pub tick: Tick,
}

impl Mbt {
    pub fn new(measure: u32, beat: u32, tick: Tick) -> Self {
        Self {
            measure,
            beat,
            tick,
        }
    }

    /// Measure 1, beat 1, tick 0
    pub fn zero() -> Self {
        Self::new(1, 1, 0)
    }
}

impl Default for Mbt {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Mbt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}:{:03}", self.measure, self.beat, self.tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter() {
        let meter = Meter::four_four();
        assert_eq!(meter.numerator, 4);
        assert_eq!(meter.denominator, 4);
        assert_eq!(meter.to_string(), "4/4");
        assert_eq!(meter.measure_length(480), 1920);
        assert_eq!(meter.beat_length(480), 480);
    }

    #[test]
    fn test_different_meters() {
        // 3/4: 3 quarter notes per measure
        assert_eq!(Meter::three_four().measure_length(480), 1440);

        // 6/8: 6 eighth notes per measure, beat = eighth note
        let six_eight = Meter::six_eight();
        assert_eq!(six_eight.measure_length(480), 1440);
        assert_eq!(six_eight.beat_length(480), 240);
    }

    #[test]
    fn test_meter_clamps_invalid_input() {
        let meter = Meter::new(0, 0);
        assert_eq!(meter, Meter::new(1, 4));
    }

    #[test]
    fn test_tempo() {
        let tempo = Tempo::new(120.0);
        assert_eq!(tempo.bpm(), 120.0);
        assert_eq!(tempo.beat_duration_seconds(), 0.5);

        // At 120 BPM and 480 TPQN, one tick lasts 1/960 s
        assert!((tempo.tick_duration_seconds(480) - 1.0 / 960.0).abs() < 1e-12);
    }

    #[test]
    fn test_tempo_clamps_non_positive() {
        assert_eq!(Tempo::new(0.0).bpm(), MIN_TEMPO_BPM);
        assert_eq!(Tempo::new(-30.0).bpm(), MIN_TEMPO_BPM);
        assert_eq!(Tempo::new(f64::NAN).bpm(), MIN_TEMPO_BPM);
        assert_eq!(Tempo::new(f64::INFINITY).bpm(), MIN_TEMPO_BPM);

        let mut tempo = Tempo::default();
        tempo.set_bpm(-1.0);
        assert_eq!(tempo.bpm(), MIN_TEMPO_BPM);
    }

    #[test]
    fn test_mbt_display() {
        assert_eq!(Mbt::zero().to_string(), "1:01:000");
        assert_eq!(Mbt::new(12, 3, 240).to_string(), "12:03:240");
    }
}
