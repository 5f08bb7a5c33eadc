// Block plan - splits one device block into loop-aware sub-blocks
//
// A block that reaches the loop end is cut at the seam: the first
// sub-block covers [start, loop_end), the next one restarts at loop_start
// with the remaining frames. Each sub-block is then scheduled and
// processed on its own, so events on both sides of the seam fire exactly
// once and in order.
//
// A plan never runs past the loop end. When a short loop would need more
// than `MAX_SEGMENTS` sub-blocks, the plan stops at the last seam it can
// hold and covers only part of the device block; the caller plans the
// remaining frames from the loop start.

use crate::sequencer::time_service::MusicalTimeService;
use crate::sequencer::transport::LoopRegion;

/// Upper bound on sub-blocks per device block (a very short loop can be
/// crossed several times within one block)
pub const MAX_SEGMENTS: usize = 8;

/// Tolerance when mapping fractional sample positions to frames, so that
/// tick/sample round trips landing a hair off a frame boundary still hit it
pub const FRAME_EPSILON: f64 = 1e-6;

/// Largest frame at or before `sample`
pub fn frame_floor(sample: f64) -> i64 {
    (sample + FRAME_EPSILON).floor() as i64
}

/// Smallest frame at or after `sample`
pub fn frame_ceil(sample: f64) -> i64 {
    (sample - FRAME_EPSILON).ceil() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Segment {
    /// First frame of the sub-block within the device block
    pub offset: usize,
    /// Frames in the sub-block (may be 0 at an exact seam)
    pub len: usize,
    /// `[start_tick, end_tick)` covered, in fractional ticks
    pub start_tick: f64,
    pub end_tick: f64,
    /// Ends at the loop end; playback continues at the loop start
    pub at_seam: bool,
}

impl Segment {
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Last frame of the sub-block, relative to the device block
    pub fn last_frame(&self) -> usize {
        self.offset + self.len.saturating_sub(1)
    }
}

/// Fixed-size plan, built on the audio thread without allocating
#[derive(Debug, Clone, Copy)]
pub struct BlockPlan {
    segments: [Segment; MAX_SEGMENTS],
    count: usize,
    /// Frames covered, at most the requested block
    frames: usize,
    final_tick: f64,
}

impl BlockPlan {
    /// Plan `frames` samples of playback starting at tick `start`
    pub fn build(
        time: &impl MusicalTimeService,
        start: f64,
        frames: usize,
        loop_region: LoopRegion,
    ) -> Self {
        let mut plan = Self {
            segments: [Segment::default(); MAX_SEGMENTS],
            count: 0,
            frames,
            final_tick: start,
        };

        let mut start = start;
        let mut remaining = frames as f64;
        let mut exact_offset = 0.0f64;
        let mut offset = 0usize;

        loop {
            let start_sample = time.tick_to_sample(start);
            let loop_end = loop_region.end as f64;
            let seam_sample = time.tick_to_sample(loop_end);
            let reaches_seam = loop_region.is_active()
                && start <= loop_end
                && remaining > 0.0
                && start_sample + remaining >= seam_sample - FRAME_EPSILON;

            if reaches_seam {
                let to_seam = (seam_sample - start_sample).clamp(0.0, remaining);
                exact_offset += to_seam;
                let mut seam_frame =
                    (frame_ceil(exact_offset).max(0) as usize).clamp(offset, frames);
                let last_slot = plan.count + 1 == MAX_SEGMENTS;
                if last_slot && seam_frame == 0 {
                    // Loop shorter than a frame: hold at the seam
                    seam_frame = frames;
                }

                plan.push(Segment {
                    offset,
                    len: seam_frame - offset,
                    start_tick: start,
                    end_tick: loop_end,
                    at_seam: true,
                });

                offset = seam_frame;
                remaining -= to_seam;
                if remaining < FRAME_EPSILON {
                    remaining = 0.0;
                }
                start = loop_region.start as f64;

                if last_slot {
                    plan.frames = seam_frame;
                    plan.final_tick = start;
                    break;
                }
                continue;
            }

            let end = time.sample_to_tick_exact(start_sample + remaining);
            plan.push(Segment {
                offset,
                len: frames - offset,
                start_tick: start,
                end_tick: end,
                at_seam: false,
            });
            plan.final_tick = end;
            break;
        }

        plan
    }

    /// Transport stopped: one segment, no musical time elapses
    pub fn stopped(tick: f64, frames: usize) -> Self {
        let mut plan = Self {
            segments: [Segment::default(); MAX_SEGMENTS],
            count: 0,
            frames,
            final_tick: tick,
        };
        plan.push(Segment {
            offset: 0,
            len: frames,
            start_tick: tick,
            end_tick: tick,
            at_seam: false,
        });
        plan
    }

    fn push(&mut self, segment: Segment) {
        self.segments[self.count] = segment;
        self.count += 1;
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments[..self.count]
    }

    /// Frames covered by the plan, starting at frame 0 of the block
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Transport position after the block
    pub fn final_tick(&self) -> f64 {
        self.final_tick
    }

    /// Whether the block wraps around the loop at least once
    pub fn wraps(&self) -> bool {
        self.count > 1
    }
}
