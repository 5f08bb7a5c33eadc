// Transport - Play/stop state machine and playhead position
//
// Shared between the control thread and the audio thread through atomics.
// The position is kept in fractional ticks so a loop wrap can carry the
// overrun exactly.

use super::time_service::MusicalTimeService;
use super::timeline::Tick;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering, fence};
use std::sync::Arc;

/// Reads of the position/epoch pair before giving up on this block
const CONSISTENT_READ_ATTEMPTS: usize = 8;

/// Transport state (play/stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }
}

/// Loop region `[start, end)` in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopRegion {
    pub start: Tick,
    pub end: Tick,
    pub enabled: bool,
}

impl LoopRegion {
    pub fn new(start: Tick, end: Tick, enabled: bool) -> Self {
        Self {
            start,
            end,
            enabled,
        }
    }

    /// Enabled and non-empty
    pub fn is_active(&self) -> bool {
        self.enabled && self.end > self.start
    }

    pub fn length(&self) -> Tick {
        (self.end - self.start).max(0)
    }

    /// Whether advancing from `from` to `to` reaches or passes the loop end
    pub fn crosses(&self, from: f64, to: f64) -> bool {
        let end = self.end as f64;
        self.is_active() && from <= end && to >= end && to > from
    }

    /// Position after advancing from `from` to `to`, wrapping back to
    /// `start + overrun` when the loop end is crossed
    pub fn wrap(&self, from: f64, to: f64) -> f64 {
        if self.crosses(from, to) {
            let overrun = to - self.end as f64;
            self.start as f64 + overrun % self.length() as f64
        } else {
            to
        }
    }
}

/// Play/stop state machine and playhead
#[derive(Debug)]
pub struct Transporter {
    playing: AtomicBool,
    /// Position in ticks, stored as f64 bits
    position: AtomicU64,
    /// Bumped twice by every explicit relocation; odd while one is being
    /// written
    position_epoch: AtomicU64,
    loop_region: ArcSwap<LoopRegion>,
}

impl Transporter {
    /// Stopped at tick 0, no loop
    pub fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            position: AtomicU64::new(0f64.to_bits()),
            position_epoch: AtomicU64::new(0),
            loop_region: ArcSwap::from_pointee(LoopRegion::default()),
        }
    }

    pub fn state(&self) -> TransportState {
        if self.playing.load(Ordering::Acquire) {
            TransportState::Playing
        } else {
            TransportState::Stopped
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state().is_playing()
    }

    /// Stopped -> Playing, from the current position
    pub fn play(&self) {
        self.playing.store(true, Ordering::Release);
    }

    /// Playing -> Stopped; the position is kept
    pub fn stop(&self) {
        self.playing.store(false, Ordering::Release);
    }

    pub fn toggle_play(&self) {
        if self.is_playing() {
            self.stop();
        } else {
            self.play();
        }
    }

    /// Current position in (fractional) ticks
    pub fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Acquire))
    }

    /// Current position rounded down to a whole tick
    pub fn position_tick(&self) -> Tick {
        self.position().floor() as Tick
    }

    /// Current position in samples
    pub fn position_sample(&self, time: &impl MusicalTimeService) -> f64 {
        time.tick_to_sample(self.position())
    }

    /// Relocate the playhead. Legal in both states; while playing the next
    /// block continues from here.
    pub fn set_position(&self, tick: f64) {
        let tick = if tick.is_finite() { tick.max(0.0) } else { 0.0 };

        // Claim the epoch (even -> odd), one relocation at a time
        let mut epoch = self.position_epoch.load(Ordering::Relaxed);
        loop {
            if epoch % 2 == 1 {
                std::hint::spin_loop();
                epoch = self.position_epoch.load(Ordering::Relaxed);
                continue;
            }
            match self.position_epoch.compare_exchange_weak(
                epoch,
                epoch + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => epoch = current,
            }
        }
        fence(Ordering::Release);
        self.position.store(tick.to_bits(), Ordering::Release);
        self.position_epoch.store(epoch + 2, Ordering::Release);
    }

    /// Counter advanced by every [`set_position`](Self::set_position)
    pub fn position_epoch(&self) -> u64 {
        self.position_epoch.load(Ordering::Acquire)
    }

    /// Position together with the epoch it belongs to. `None` while a
    /// relocation is being written; never blocks.
    pub fn position_with_epoch(&self) -> Option<(f64, u64)> {
        for _ in 0..CONSISTENT_READ_ATTEMPTS {
            let before = self.position_epoch.load(Ordering::Acquire);
            if before % 2 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let position = self.position();
            fence(Ordering::Acquire);
            if self.position_epoch.load(Ordering::Relaxed) == before {
                return Some((position, before));
            }
        }
        None
    }

    /// Advance by `delta` ticks, applying the loop wrap. Returns the new
    /// position (or the concurrently set one if a relocation won the race).
    pub fn advance(&self, delta: f64) -> f64 {
        let current = self.position();
        let next = self.loop_region().wrap(current, current + delta);
        if self.commit_advance(current, next) {
            next
        } else {
            self.position()
        }
    }

    /// Store `next` only if the position is still `expected`, so a
    /// concurrent [`set_position`](Self::set_position) is never overwritten
    pub fn commit_advance(&self, expected: f64, next: f64) -> bool {
        self.position
            .compare_exchange(
                expected.to_bits(),
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn loop_region(&self) -> LoopRegion {
        **self.loop_region.load()
    }

    /// Set loop bounds; a region with `end <= start` is kept but inactive
    pub fn set_loop_region(&self, start: Tick, end: Tick) {
        if end <= start {
            tracing::warn!(start, end, "loop end is not after loop start; looping inactive");
        }
        self.loop_region.rcu(|current| LoopRegion {
            start,
            end,
            enabled: current.enabled,
        });
    }

    pub fn set_loop_enabled(&self, enabled: bool) {
        self.loop_region.rcu(|current| LoopRegion {
            enabled,
            ..**current
        });
    }

    pub fn is_loop_enabled(&self) -> bool {
        self.loop_region().enabled
    }
}

impl Default for Transporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle used by the project and the engine
pub type SharedTransporter = Arc<Transporter>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let transport = Transporter::new();
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.position(), 0.0);
        assert!(!transport.is_loop_enabled());
    }

    #[test]
    fn test_play_stop_keeps_position() {
        let transport = Transporter::new();
        transport.set_position(960.0);

        transport.play();
        assert_eq!(transport.state(), TransportState::Playing);
        assert_eq!(transport.position(), 960.0);

        transport.advance(100.0);
        transport.stop();
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.position(), 1060.0);

        // Stopping twice is a no-op
        transport.stop();
        assert_eq!(transport.position(), 1060.0);
    }

    #[test]
    fn test_toggle_play() {
        let transport = Transporter::new();
        transport.toggle_play();
        assert!(transport.is_playing());
        transport.toggle_play();
        assert!(!transport.is_playing());
    }

    #[test]
    fn test_set_position_bumps_epoch() {
        let transport = Transporter::new();
        let epoch = transport.position_epoch();
        transport.set_position(-20.0);
        assert_eq!(transport.position(), 0.0);
        assert!(transport.position_epoch() > epoch);
        assert_eq!(transport.position_epoch() % 2, 0);
    }

    #[test]
    fn test_position_read_with_matching_epoch() {
        let transport = Transporter::new();
        transport.set_position(960.0);
        let epoch = transport.position_epoch();
        assert_eq!(transport.position_with_epoch(), Some((960.0, epoch)));

        // A relocation half-way written is never paired with an epoch
        transport.position_epoch.fetch_add(1, Ordering::AcqRel);
        assert_eq!(transport.position_with_epoch(), None);
        transport.position_epoch.fetch_add(1, Ordering::AcqRel);
        assert_eq!(transport.position_with_epoch(), Some((960.0, epoch + 2)));
    }

    #[test]
    fn test_commit_advance_keeps_epoch() {
        let transport = Transporter::new();
        let (position, epoch) = transport.position_with_epoch().unwrap();
        assert!(transport.commit_advance(position, 42.0));
        assert_eq!(transport.position_with_epoch(), Some((42.0, epoch)));
    }

    #[test]
    fn test_loop_wrap_preserves_overrun() {
        let transport = Transporter::new();
        transport.set_loop_region(0, 1920);
        transport.set_loop_enabled(true);
        transport.set_position(1900.0);

        // 1900 + 30.25 = 1930.25 -> wraps to 10.25
        let position = transport.advance(30.25);
        assert!((position - 10.25).abs() < 1e-9);
    }

    #[test]
    fn test_loop_disabled_no_wrap() {
        let transport = Transporter::new();
        transport.set_loop_region(0, 1920);
        transport.set_position(1900.0);
        assert_eq!(transport.advance(100.0), 2000.0);
    }

    #[test]
    fn test_position_past_loop_end_does_not_wrap() {
        let region = LoopRegion::new(0, 1920, true);
        assert_eq!(region.wrap(2000.0, 2100.0), 2100.0);
        assert!(region.crosses(1920.0, 1921.0));
        assert!(!region.crosses(1920.0, 1920.0));
    }

    #[test]
    fn test_overrun_longer_than_loop() {
        let region = LoopRegion::new(100, 200, true);
        // 150 -> 470: overrun 270 = 2 full loops + 70
        assert_eq!(region.wrap(150.0, 470.0), 170.0);
    }

    #[test]
    fn test_invalid_loop_region_inactive() {
        let transport = Transporter::new();
        transport.set_loop_region(500, 100);
        transport.set_loop_enabled(true);
        assert!(!transport.loop_region().is_active());
        transport.set_position(400.0);
        assert_eq!(transport.advance(200.0), 600.0);
    }

    #[test]
    fn test_commit_advance_loses_to_relocation() {
        let transport = Transporter::new();
        let seen = transport.position();
        transport.set_position(5000.0);
        assert!(!transport.commit_advance(seen, 10.0));
        assert_eq!(transport.position(), 5000.0);
    }
}
