// Process info - descriptor of one processing (sub-)block

use crate::sequencer::timeline::{Meter, Tempo, Tick};
use crate::sequencer::transport::TransportState;

/// Built fresh for every block or sub-block and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessInfo {
    pub sample_rate: f64,
    /// Frames in this (sub-)block
    pub block_size: usize,
    /// Transport position of the first frame, in samples
    pub sample_position: f64,
    /// `[start_tick, end_tick)` covered by the block (fractional ticks)
    pub start_tick: f64,
    pub end_tick: f64,
    pub transport: TransportState,
    pub tpqn: Tick,
    pub tempo: Tempo,
    pub meter: Meter,
}

impl ProcessInfo {
    /// Info for a block processed while no musical time is running
    /// (before the first `process`, or with the transport stopped)
    pub fn idle(sample_rate: f64, block_size: usize, tpqn: Tick) -> Self {
        Self {
            sample_rate,
            block_size,
            sample_position: 0.0,
            start_tick: 0.0,
            end_tick: 0.0,
            transport: TransportState::Stopped,
            tpqn,
            tempo: Tempo::default(),
            meter: Meter::default(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    /// Same timing, different block length
    pub fn with_block_size(&self, block_size: usize) -> Self {
        Self { block_size, ..*self }
    }
}
