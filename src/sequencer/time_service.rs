// Musical time service - tick / second / sample / PPQ / MBT conversions
//
// All conversions are pure functions of the tempo map, the meter map,
// the sample rate and TPQN. `TimeMap` caches the seconds and measure index
// at every break point so a conversion is a binary search plus one
// multiply.

use super::tempo_map::{MeterMap, TempoMap};
use super::timeline::{DEFAULT_TPQN, Mbt, Meter, Tempo, Tick};
use std::sync::Arc;

/// Sample rate assumed until a device reports one
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Conversions between the musical and absolute time domains
pub trait MusicalTimeService {
    fn sample_rate(&self) -> f64;

    fn tpqn(&self) -> Tick;

    /// Seconds from tick 0 to `tick`, integrating the tempo segments
    fn tick_to_sec(&self, tick: f64) -> f64;

    /// Inverse of [`tick_to_sec`](Self::tick_to_sec)
    fn sec_to_tick(&self, sec: f64) -> f64;

    fn tick_to_sample(&self, tick: f64) -> f64 {
        self.tick_to_sec(tick) * self.sample_rate()
    }

    /// Exact (fractional) inverse of [`tick_to_sample`](Self::tick_to_sample)
    fn sample_to_tick_exact(&self, sample: f64) -> f64 {
        self.sec_to_tick(sample / self.sample_rate())
    }

    /// Inverse of [`tick_to_sample`](Self::tick_to_sample), rounded to the nearest tick
    fn sample_to_tick(&self, sample: f64) -> Tick {
        self.sample_to_tick_exact(sample).round() as Tick
    }

    fn sec_to_sample(&self, sec: f64) -> f64 {
        sec * self.sample_rate()
    }

    fn sample_to_sec(&self, sample: f64) -> f64 {
        sample / self.sample_rate()
    }

    fn tick_to_ppq(&self, tick: f64) -> f64 {
        tick / self.tpqn() as f64
    }

    fn ppq_to_tick(&self, ppq: f64) -> f64 {
        ppq * self.tpqn() as f64
    }

    fn tick_to_mbt(&self, tick: Tick) -> Mbt;

    fn mbt_to_tick(&self, mbt: Mbt) -> Tick;

    fn tempo_at(&self, tick: f64) -> Tempo;

    fn meter_at(&self, tick: f64) -> Meter;
}

/// Immutable tempo + meter snapshot with conversion caches
#[derive(Debug, Clone)]
pub struct TimeMap {
    tpqn: Tick,
    tempo: TempoMap,
    meter: MeterMap,
    /// Seconds elapsed at each tempo point
    tempo_seconds: Vec<f64>,
    /// Zero-based measure index at each meter point
    meter_measures: Vec<i64>,
}

impl TimeMap {
    pub fn new(tpqn: Tick, tempo: TempoMap, meter: MeterMap) -> Self {
        let tpqn = tpqn.max(1);

        let mut tempo_seconds = Vec::with_capacity(tempo.points().len());
        let mut seconds = 0.0;
        for (i, point) in tempo.points().iter().enumerate() {
            if i > 0 {
                let prev = &tempo.points()[i - 1];
                seconds +=
                    (point.tick - prev.tick) as f64 * prev.tempo.tick_duration_seconds(tpqn);
            }
            tempo_seconds.push(seconds);
        }

        let mut meter_measures = Vec::with_capacity(meter.points().len());
        let mut measures = 0i64;
        for (i, point) in meter.points().iter().enumerate() {
            if i > 0 {
                let prev = &meter.points()[i - 1];
                let length = prev.meter.measure_length(tpqn);
                // A meter change inside a measure starts a new one
                measures += (point.tick - prev.tick + length - 1) / length;
            }
            meter_measures.push(measures);
        }

        Self {
            tpqn,
            tempo,
            meter,
            tempo_seconds,
            meter_measures,
        }
    }

    pub fn tpqn(&self) -> Tick {
        self.tpqn
    }

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo
    }

    pub fn meter_map(&self) -> &MeterMap {
        &self.meter
    }

    /// Copy of this map with a different tempo map
    pub fn with_tempo_map(&self, tempo: TempoMap) -> Self {
        Self::new(self.tpqn, tempo, self.meter.clone())
    }

    /// Copy of this map with a different meter map
    pub fn with_meter_map(&self, meter: MeterMap) -> Self {
        Self::new(self.tpqn, self.tempo.clone(), meter)
    }

    pub fn tick_to_sec(&self, tick: f64) -> f64 {
        let index = self.tempo.segment_index(tick);
        let point = &self.tempo.points()[index];
        self.tempo_seconds[index]
            + (tick - point.tick as f64) * point.tempo.tick_duration_seconds(self.tpqn)
    }

    pub fn sec_to_tick(&self, sec: f64) -> f64 {
        let index = self
            .tempo_seconds
            .partition_point(|s| *s <= sec)
            .saturating_sub(1);
        let point = &self.tempo.points()[index];
        point.tick as f64
            + (sec - self.tempo_seconds[index]) / point.tempo.tick_duration_seconds(self.tpqn)
    }

    pub fn tick_to_mbt(&self, tick: Tick) -> Mbt {
        let tick = tick.max(0);
        let index = self.meter.segment_index(tick as f64);
        let point = &self.meter.points()[index];

        let measure_length = point.meter.measure_length(self.tpqn);
        let beat_length = point.meter.beat_length(self.tpqn);

        let offset = tick - point.tick;
        let measure = self.meter_measures[index] + offset / measure_length;
        let in_measure = offset % measure_length;

        Mbt::new(
            measure as u32 + 1,
            (in_measure / beat_length) as u32 + 1,
            in_measure % beat_length,
        )
    }

    pub fn mbt_to_tick(&self, mbt: Mbt) -> Tick {
        let measure = mbt.measure.max(1) as i64 - 1;
        let index = self
            .meter_measures
            .partition_point(|m| *m <= measure)
            .saturating_sub(1);
        let point = &self.meter.points()[index];

        point.tick
            + (measure - self.meter_measures[index]) * point.meter.measure_length(self.tpqn)
            + (mbt.beat.max(1) as Tick - 1) * point.meter.beat_length(self.tpqn)
            + mbt.tick
    }

    pub fn tempo_at(&self, tick: f64) -> Tempo {
        self.tempo.tempo_at(tick)
    }

    pub fn meter_at(&self, tick: f64) -> Meter {
        self.meter.meter_at(tick)
    }
}

impl Default for TimeMap {
    fn default() -> Self {
        Self::new(DEFAULT_TPQN, TempoMap::new(), MeterMap::new())
    }
}

/// A time map bound to a sample rate; the value handed to conversion users
#[derive(Debug, Clone)]
pub struct TimeContext {
    map: Arc<TimeMap>,
    sample_rate: f64,
}

impl TimeContext {
    /// Non-positive or non-finite sample rates fall back to [`DEFAULT_SAMPLE_RATE`]
    pub fn new(map: Arc<TimeMap>, sample_rate: f64) -> Self {
        let sample_rate = if sample_rate.is_finite() && sample_rate > 0.0 {
            sample_rate
        } else {
            DEFAULT_SAMPLE_RATE
        };
        Self { map, sample_rate }
    }

    pub fn map(&self) -> &TimeMap {
        &self.map
    }
}

impl MusicalTimeService for TimeContext {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn tpqn(&self) -> Tick {
        self.map.tpqn()
    }

    fn tick_to_sec(&self, tick: f64) -> f64 {
        self.map.tick_to_sec(tick)
    }

    fn sec_to_tick(&self, sec: f64) -> f64 {
        self.map.sec_to_tick(sec)
    }

    fn tick_to_mbt(&self, tick: Tick) -> Mbt {
        self.map.tick_to_mbt(tick)
    }

    fn mbt_to_tick(&self, mbt: Mbt) -> Tick {
        self.map.mbt_to_tick(mbt)
    }

    fn tempo_at(&self, tick: f64) -> Tempo {
        self.map.tempo_at(tick)
    }

    fn meter_at(&self, tick: f64) -> Meter {
        self.map.meter_at(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(map: TimeMap) -> TimeContext {
        TimeContext::new(Arc::new(map), 48000.0)
    }

    #[test]
    fn test_constant_tempo_conversion() {
        let time = context(TimeMap::default());

        // 120 BPM: one quarter note (480 ticks) = 0.5s = 24000 samples
        assert!((time.tick_to_sec(480.0) - 0.5).abs() < 1e-12);
        assert!((time.tick_to_sample(480.0) - 24000.0).abs() < 1e-9);
        assert_eq!(time.sample_to_tick(24000.0), 480);
        assert_eq!(time.sample_to_tick(24020.0), 480); // rounds to nearest
        assert_eq!(time.sample_to_tick(24030.0), 481);
    }

    #[test]
    fn test_piecewise_tempo_integration() {
        let mut tempo = TempoMap::new();
        tempo.insert(960, 60.0);
        let time = context(TimeMap::new(480, tempo, MeterMap::new()));

        // 960 ticks at 120 BPM = 1s, then 480 ticks at 60 BPM = 1s
        assert!((time.tick_to_sec(960.0) - 1.0).abs() < 1e-12);
        assert!((time.tick_to_sec(1440.0) - 2.0).abs() < 1e-12);
        assert!((time.sec_to_tick(1.5) - 1200.0).abs() < 1e-9);
        assert!((time.sec_to_tick(0.25) - 240.0).abs() < 1e-9);
    }

    #[test]
    fn test_ppq() {
        let time = context(TimeMap::default());
        assert_eq!(time.tick_to_ppq(960.0), 2.0);
        assert_eq!(time.ppq_to_tick(1.5), 720.0);
    }

    #[test]
    fn test_mbt_default_meter() {
        let time = context(TimeMap::default());

        assert_eq!(time.tick_to_mbt(0), Mbt::new(1, 1, 0));
        assert_eq!(time.tick_to_mbt(480), Mbt::new(1, 2, 0));
        assert_eq!(time.tick_to_mbt(1920), Mbt::new(2, 1, 0));
        assert_eq!(time.tick_to_mbt(1000), Mbt::new(1, 3, 40));

        assert_eq!(time.mbt_to_tick(Mbt::new(2, 1, 0)), 1920);
        assert_eq!(time.mbt_to_tick(Mbt::new(1, 3, 40)), 1000);
    }

    #[test]
    fn test_mbt_with_meter_change() {
        let mut meter = MeterMap::new();
        meter.insert(1920, Meter::three_four());
        meter.insert(1920 + 2 * 1440, Meter::six_eight());
        let time = context(TimeMap::new(480, TempoMap::new(), meter));

        assert_eq!(time.tick_to_mbt(1920), Mbt::new(2, 1, 0));
        assert_eq!(time.tick_to_mbt(1920 + 1440), Mbt::new(3, 1, 0));
        assert_eq!(time.tick_to_mbt(1920 + 2 * 1440 + 240), Mbt::new(4, 2, 0));

        for tick in (0..20_000).step_by(37) {
            assert_eq!(time.mbt_to_tick(time.tick_to_mbt(tick)), tick);
        }
    }

    #[test]
    fn test_mbt_meter_change_mid_measure() {
        // A change at tick 1000 (inside measure 1) starts measure 2 there
        let mut meter = MeterMap::new();
        meter.insert(1000, Meter::three_four());
        let time = context(TimeMap::new(480, TempoMap::new(), meter));

        assert_eq!(time.tick_to_mbt(999), Mbt::new(1, 3, 39));
        assert_eq!(time.tick_to_mbt(1000), Mbt::new(2, 1, 0));
        for tick in 0..5000 {
            assert_eq!(time.mbt_to_tick(time.tick_to_mbt(tick)), tick);
        }
    }

    #[test]
    fn test_tempo_and_meter_lookup() {
        let mut tempo = TempoMap::new();
        tempo.insert(480, 90.0);
        let time = context(TimeMap::new(480, tempo, MeterMap::new()));

        assert_eq!(time.tempo_at(0.0).bpm(), 120.0);
        assert_eq!(time.tempo_at(480.0).bpm(), 90.0);
        assert_eq!(time.meter_at(99_999.0), Meter::four_four());
    }

    #[test]
    fn test_invalid_sample_rate_falls_back() {
        let time = TimeContext::new(Arc::new(TimeMap::default()), 0.0);
        assert_eq!(time.sample_rate(), DEFAULT_SAMPLE_RATE);
    }
}
