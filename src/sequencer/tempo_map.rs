// Tempo and meter maps - piecewise-constant break points over tick time
//
// Both maps always hold an entry at tick 0 (the defaults 120 BPM and 4/4),
// so a lookup never falls before the first point.

use super::timeline::{Meter, Tempo, Tick};
use serde::{Deserialize, Serialize};

/// Tempo change at a tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoPoint {
    pub tick: Tick,
    pub tempo: Tempo,
}

/// Meter change at a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterPoint {
    pub tick: Tick,
    pub meter: Meter,
}

/// Index of the last point whose tick is at or before `tick`
fn last_at_or_before<T>(points: &[T], tick: f64, tick_of: impl Fn(&T) -> Tick) -> usize {
    points
        .partition_point(|p| tick_of(p) as f64 <= tick)
        .saturating_sub(1)
}

/// Ordered tempo break points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoMap {
    points: Vec<TempoPoint>,
}

impl TempoMap {
    /// Map with the single default point (120 BPM at tick 0)
    pub fn new() -> Self {
        Self::with_tempo(Tempo::default())
    }

    /// Map with a constant tempo
    pub fn with_tempo(tempo: Tempo) -> Self {
        Self {
            points: vec![TempoPoint { tick: 0, tempo }],
        }
    }

    /// Insert (or replace) a tempo point. Negative ticks are moved to 0.
    pub fn insert(&mut self, tick: Tick, bpm: f64) {
        let point = TempoPoint {
            tick: tick.max(0),
            tempo: Tempo::new(bpm),
        };
        match self.points.binary_search_by_key(&point.tick, |p| p.tick) {
            Ok(index) => self.points[index] = point,
            Err(index) => self.points.insert(index, point),
        }
    }

    /// Remove the point at `tick`. The tick-0 point is reset to the default
    /// instead of being removed.
    pub fn remove(&mut self, tick: Tick) -> bool {
        match self.points.binary_search_by_key(&tick, |p| p.tick) {
            Ok(0) => {
                self.points[0].tempo = Tempo::default();
                true
            }
            Ok(index) => {
                self.points.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    pub fn points(&self) -> &[TempoPoint] {
        &self.points
    }

    /// Index of the segment containing `tick`
    pub fn segment_index(&self, tick: f64) -> usize {
        last_at_or_before(&self.points, tick, |p| p.tick)
    }

    /// Tempo of the last point at or before `tick`
    pub fn tempo_at(&self, tick: f64) -> Tempo {
        self.points[self.segment_index(tick)].tempo
    }
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered meter break points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterMap {
    points: Vec<MeterPoint>,
}

impl MeterMap {
    /// Map with the single default point (4/4 at tick 0)
    pub fn new() -> Self {
        Self::with_meter(Meter::default())
    }

    pub fn with_meter(meter: Meter) -> Self {
        Self {
            points: vec![MeterPoint { tick: 0, meter }],
        }
    }

    /// Insert (or replace) a meter point. Negative ticks are moved to 0.
    pub fn insert(&mut self, tick: Tick, meter: Meter) {
        let point = MeterPoint {
            tick: tick.max(0),
            meter: Meter::new(meter.numerator, meter.denominator),
        };
        match self.points.binary_search_by_key(&point.tick, |p| p.tick) {
            Ok(index) => self.points[index] = point,
            Err(index) => self.points.insert(index, point),
        }
    }

    /// Remove the point at `tick`; the tick-0 point is reset to 4/4
    pub fn remove(&mut self, tick: Tick) -> bool {
        match self.points.binary_search_by_key(&tick, |p| p.tick) {
            Ok(0) => {
                self.points[0].meter = Meter::default();
                true
            }
            Ok(index) => {
                self.points.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    pub fn points(&self) -> &[MeterPoint] {
        &self.points
    }

    pub fn segment_index(&self, tick: f64) -> usize {
        last_at_or_before(&self.points, tick, |p| p.tick)
    }

    /// Meter of the last point at or before `tick`
    pub fn meter_at(&self, tick: f64) -> Meter {
        self.points[self.segment_index(tick)].meter
    }
}

impl Default for MeterMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tempo_map() {
        let map = TempoMap::new();
        assert_eq!(map.points().len(), 1);
        assert_eq!(map.tempo_at(0.0).bpm(), 120.0);
        assert_eq!(map.tempo_at(1_000_000.0).bpm(), 120.0);
        assert_eq!(map.tempo_at(-10.0).bpm(), 120.0);
    }

    #[test]
    fn test_tempo_points_stay_sorted() {
        let mut map = TempoMap::new();
        map.insert(1920, 90.0);
        map.insert(960, 140.0);
        map.insert(1920, 100.0); // replaces

        let ticks: Vec<Tick> = map.points().iter().map(|p| p.tick).collect();
        assert_eq!(ticks, vec![0, 960, 1920]);

        assert_eq!(map.tempo_at(959.0).bpm(), 120.0);
        assert_eq!(map.tempo_at(960.0).bpm(), 140.0);
        assert_eq!(map.tempo_at(5000.0).bpm(), 100.0);
    }

    #[test]
    fn test_tempo_insert_clamps() {
        let mut map = TempoMap::new();
        map.insert(-50, 0.0);
        assert_eq!(map.points().len(), 1);
        assert!(map.tempo_at(0.0).bpm() > 0.0);
    }

    #[test]
    fn test_remove_tick_zero_resets_default() {
        let mut map = TempoMap::with_tempo(Tempo::new(90.0));
        assert!(map.remove(0));
        assert_eq!(map.points().len(), 1);
        assert_eq!(map.tempo_at(0.0).bpm(), 120.0);
        assert!(!map.remove(42));
    }

    #[test]
    fn test_meter_map_lookup() {
        let mut map = MeterMap::new();
        map.insert(1920, Meter::three_four());

        assert_eq!(map.meter_at(0.0), Meter::four_four());
        assert_eq!(map.meter_at(1919.0), Meter::four_four());
        assert_eq!(map.meter_at(1920.0), Meter::three_four());

        assert!(map.remove(1920));
        assert_eq!(map.meter_at(1920.0), Meter::four_four());
    }
}
