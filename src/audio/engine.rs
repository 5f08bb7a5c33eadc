// Audio engine - real-time half of a project
//
// Driven by the audio device through `AudioDeviceCallback`:
// `start_processing` pre-allocates, `process` runs once per hardware block,
// `stop_processing` is the only cancellation point.
//
// Per block:
// 1. drain live "sample notes" (always, regardless of transport)
// 2. react to transport stop / playhead jumps
// 3. split the block at loop seams (`BlockPlan`)
// 4. schedule sequence notes per sub-block (`SequencePlayer`)
// 5. run the published graph once per sub-block
// 6. update the playing-note registries, advance the transport
//
// Nothing here allocates, blocks or logs once `start_processing` returned.
// The engine owns an `Arc` to each snapshot it plays; a replaced snapshot
// is pushed to the retired queue and freed by the project, never here.

use crate::audio::block_plan::{BlockPlan, Segment};
use crate::audio::compiled::CompiledGraph;
use crate::audio::endpoint::{AudioEndpoint, EndpointIo, MidiSink, MidiSource};
use crate::audio::graph::GraphNode;
use crate::audio::process_info::ProcessInfo;
use crate::config::EngineConfig;
use crate::messaging::{RetiredProducer, RetiredSnapshot, SampleNoteConsumer};
use crate::midi::buffer::MidiEventBuffer;
use crate::midi::event::{MidiEvent, MidiEventTimed};
use crate::project::ProjectShared;
use crate::sequencer::player::SequencePlayer;
use crate::sequencer::sequence::Sequence;
use crate::sequencer::time_service::{
    DEFAULT_SAMPLE_RATE, MusicalTimeService, TimeContext, TimeMap,
};
use crate::sequencer::transport::TransportState;
use arc_swap::Guard;
use ringbuf::traits::{Consumer, Observer, Producer};
use std::sync::Arc;

/// Snapshot kinds the engine holds: time map, sequences, graph
const SNAPSHOT_KINDS: usize = 3;

/// Device callback boundary
pub trait AudioDeviceCallback: Send {
    /// Called before the first `process`; may allocate
    fn start_processing(
        &mut self,
        sample_rate: f64,
        max_block_size: usize,
        num_input_channels: usize,
        num_output_channels: usize,
    );

    /// Planar device buffers, `block_size` frames each
    fn process(&mut self, block_size: usize, input: &[&[f32]], output: &mut [&mut [f32]]);

    /// No `process` call follows until the next `start_processing`
    fn stop_processing(&mut self);
}

pub struct Engine {
    shared: Arc<ProjectShared>,
    config: EngineConfig,
    sample_note_rx: SampleNoteConsumer,
    retired: RetiredProducer,
    /// Snapshots in use; swapped for newer ones at block start
    time_map: Arc<TimeMap>,
    sequences: Arc<Vec<Arc<Sequence>>>,
    graph: Arc<CompiledGraph>,
    player: SequencePlayer,
    /// Scheduled sequence events for the current device block
    sequence_events: MidiEventBuffer,
    /// Live note events for the current device block
    sample_events: MidiEventBuffer,
    /// Per sub-block windows of the two buffers above
    segment_sequence_events: MidiEventBuffer,
    segment_sample_events: MidiEventBuffer,
    sample_rate: f64,
    max_block_size: usize,
    num_input_channels: usize,
    num_output_channels: usize,
    running: bool,
    was_playing: bool,
    position_epoch: u64,
}

impl Engine {
    pub(crate) fn new(
        shared: Arc<ProjectShared>,
        sample_note_rx: SampleNoteConsumer,
        retired: RetiredProducer,
        config: EngineConfig,
    ) -> Self {
        Self {
            time_map: shared.time_map.load_full(),
            sequences: shared.sequences.load_full(),
            graph: shared.graph.load_full(),
            shared,
            sample_note_rx,
            retired,
            player: SequencePlayer::new(0),
            sequence_events: MidiEventBuffer::new(0),
            sample_events: MidiEventBuffer::new(0),
            segment_sequence_events: MidiEventBuffer::new(0),
            segment_sample_events: MidiEventBuffer::new(0),
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: config.default_max_block_size,
            num_input_channels: 0,
            num_output_channels: 0,
            running: false,
            was_playing: false,
            position_epoch: 0,
            config,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn num_input_channels(&self) -> usize {
        self.num_input_channels
    }

    pub fn num_output_channels(&self) -> usize {
        self.num_output_channels
    }

    /// Pick up newly published snapshots. The replaced ones go to the
    /// retired queue; if it is short on room, keep the current ones.
    fn refresh_snapshots(&mut self) {
        if self.retired.vacant_len() < SNAPSHOT_KINDS {
            return;
        }

        let time_map = self.shared.time_map.load();
        if !Arc::ptr_eq(&*time_map, &self.time_map) {
            let previous = std::mem::replace(&mut self.time_map, Guard::into_inner(time_map));
            self.retire(RetiredSnapshot::TimeMap(previous));
        }

        let sequences = self.shared.sequences.load();
        if !Arc::ptr_eq(&*sequences, &self.sequences) {
            let previous = std::mem::replace(&mut self.sequences, Guard::into_inner(sequences));
            self.retire(RetiredSnapshot::Sequences(previous));
        }

        let graph = self.shared.graph.load();
        if !Arc::ptr_eq(&*graph, &self.graph) {
            let previous = std::mem::replace(&mut self.graph, Guard::into_inner(graph));
            self.retire(RetiredSnapshot::Graph(previous));
        }
    }

    fn retire(&mut self, snapshot: RetiredSnapshot) {
        if let Err(snapshot) = self.retired.try_push(snapshot) {
            // Room was checked in `refresh_snapshots`; leak rather than free
            std::mem::forget(snapshot);
        }
    }

    /// Process at most `max_block_size` frames starting at `frame_offset`
    /// of the device buffers. Returns the frames actually processed, which
    /// is less than `frames` when a short loop ends the plan early.
    fn process_block(
        &mut self,
        frame_offset: usize,
        frames: usize,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
    ) -> usize {
        self.refresh_snapshots();
        self.sequence_events.clear();
        self.sample_events.clear();

        // 1. Live notes, independent of the transport
        while !self.sample_events.is_full() {
            let Some(command) = self.sample_note_rx.try_pop() else {
                break;
            };
            self.sample_events
                .push_sorted(MidiEventTimed::new(command.to_midi(), 0));
        }

        let transporter = Arc::clone(&self.shared.transporter);
        let playing = transporter.is_playing();

        // 2. Transport stopped while notes were sounding: one all-notes-off
        if self.was_playing && !playing {
            if self.shared.sequence_notes.any() || self.player.has_pending() {
                self.sequence_events
                    .push_sorted(MidiEventTimed::new(MidiEvent::AllNotesOff, 0));
            }
            self.player.discard_pending();
        }

        // Playhead relocated: end what was sounding at the old position.
        // Position and epoch are read as one pair; while a relocation is
        // being written the playhead holds for this block.
        let located = transporter.position_with_epoch();
        if let Some((_, epoch)) = located {
            if epoch != self.position_epoch {
                self.position_epoch = epoch;
                self.player.flush_pending(&mut self.sequence_events, 0);
            }
        }
        let advancing = playing && located.is_some();

        // 3. + 4. Plan and schedule
        let time = TimeContext::new(Arc::clone(&self.time_map), self.sample_rate);
        let position = match located {
            Some((position, _)) => position,
            None => transporter.position(),
        };
        let plan = if advancing {
            BlockPlan::build(&time, position, frames, transporter.loop_region())
        } else {
            BlockPlan::stopped(position, frames)
        };
        let planned = plan.frames();

        if advancing {
            for segment in plan.segments() {
                self.player.schedule(
                    &time,
                    segment,
                    planned,
                    self.sequences.as_slice(),
                    &mut self.sequence_events,
                );
            }
        }

        // 5. + 6. Run the graph per sub-block
        let transport = if playing {
            TransportState::Playing
        } else {
            TransportState::Stopped
        };
        let graph = Arc::clone(&self.graph);

        for segment in plan.segments().iter().filter(|s| !s.is_empty()) {
            self.window_events(segment);

            let info = self.process_info(&time, segment, transport);
            let mut bridge = DeviceBridge {
                input,
                output: &mut *output,
                frame_offset: frame_offset + segment.offset,
                sequence_events: &self.segment_sequence_events,
                sample_events: &self.segment_sample_events,
            };
            graph.process(segment.len, &mut bridge, &info);

            for event in self.segment_sequence_events.iter() {
                self.shared.sequence_notes.apply(&event.event);
            }
            for event in self.segment_sample_events.iter() {
                self.shared.sample_notes.apply(&event.event);
            }
        }

        if advancing {
            // A concurrent relocation wins over this advance
            transporter.commit_advance(position, plan.final_tick());
        }
        self.was_playing = playing;
        planned
    }

    fn window_events(&mut self, segment: &Segment) {
        let start = segment.offset as u32;
        let len = segment.len as u32;
        self.segment_sequence_events.clear();
        self.segment_sequence_events
            .copy_window(&self.sequence_events, start, len);
        self.segment_sample_events.clear();
        self.segment_sample_events
            .copy_window(&self.sample_events, start, len);
    }

    fn process_info(
        &self,
        time: &TimeContext,
        segment: &Segment,
        transport: TransportState,
    ) -> ProcessInfo {
        ProcessInfo {
            sample_rate: self.sample_rate,
            block_size: segment.len,
            sample_position: time.tick_to_sample(segment.start_tick),
            start_tick: segment.start_tick,
            end_tick: segment.end_tick,
            transport,
            tpqn: time.tpqn(),
            tempo: time.tempo_at(segment.start_tick),
            meter: time.meter_at(segment.start_tick),
        }
    }
}

impl AudioDeviceCallback for Engine {
    fn start_processing(
        &mut self,
        sample_rate: f64,
        max_block_size: usize,
        num_input_channels: usize,
        num_output_channels: usize,
    ) {
        let sample_rate = if sample_rate.is_finite() && sample_rate > 0.0 {
            sample_rate
        } else {
            tracing::warn!(sample_rate, "invalid sample rate, using default");
            DEFAULT_SAMPLE_RATE
        };
        let max_block_size = max_block_size.max(1);

        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.num_input_channels = num_input_channels;
        self.num_output_channels = num_output_channels;

        // Everything `process` touches is sized here
        let capacity = self.config.event_capacity;
        self.player = SequencePlayer::new(self.config.pending_note_off_capacity);
        self.sequence_events = MidiEventBuffer::new(capacity);
        self.sample_events = MidiEventBuffer::new(capacity);
        self.segment_sequence_events = MidiEventBuffer::new(capacity);
        self.segment_sample_events = MidiEventBuffer::new(capacity);

        self.shared.set_sample_rate(sample_rate);
        self.shared.graph.prepare(sample_rate, max_block_size);
        self.refresh_snapshots();

        self.was_playing = false;
        self.position_epoch = self.shared.transporter.position_epoch();
        self.running = true;

        tracing::info!(
            sample_rate,
            max_block_size,
            num_input_channels,
            num_output_channels,
            "engine started"
        );
    }

    fn process(&mut self, block_size: usize, input: &[&[f32]], output: &mut [&mut [f32]]) {
        for channel in output.iter_mut() {
            let frames = block_size.min(channel.len());
            channel[..frames].fill(0.0);
        }
        if !self.running {
            return;
        }

        let mut done = 0;
        while done < block_size {
            let frames = (block_size - done).min(self.max_block_size);
            done += self.process_block(done, frames, input, output);
        }
    }

    fn stop_processing(&mut self) {
        if !self.running {
            return;
        }

        let sounding = self.shared.sequence_notes.any()
            || self.shared.sample_notes.any()
            || self.player.has_pending();
        if sounding {
            let info = ProcessInfo::idle(self.sample_rate, 0, self.config.tpqn);
            let all_notes_off = [MidiEventTimed::new(MidiEvent::AllNotesOff, 0)];
            self.refresh_snapshots();
            for (_, node) in self.graph.nodes() {
                if let GraphNode::MidiOutput(sink) = node {
                    sink.device().write_events(&info, &all_notes_off);
                }
            }
        }

        self.player.discard_pending();
        self.shared.sequence_notes.clear();
        self.shared.sample_notes.clear();
        self.shared.graph.release();
        self.running = false;
        self.was_playing = false;

        tracing::info!(notes_silenced = sounding, "engine stopped");
    }
}

/// Connects graph endpoints to the device buffers of one sub-block
struct DeviceBridge<'a, 'b, 'c> {
    input: &'a [&'b [f32]],
    output: &'a mut [&'c mut [f32]],
    /// Device frame of the sub-block's first frame
    frame_offset: usize,
    sequence_events: &'a MidiEventBuffer,
    sample_events: &'a MidiEventBuffer,
}

impl EndpointIo for DeviceBridge<'_, '_, '_> {
    fn on_set_audio(
        &mut self,
        endpoint: &AudioEndpoint,
        _info: &ProcessInfo,
        channel: usize,
        dest: &mut [f32],
    ) {
        let available = match self.input.get(endpoint.device_channel(channel)) {
            Some(source) => {
                let source = source.get(self.frame_offset..).unwrap_or(&[]);
                let available = source.len().min(dest.len());
                dest[..available].copy_from_slice(&source[..available]);
                available
            }
            None => 0,
        };
        dest[available..].fill(0.0);
    }

    fn on_get_audio(
        &mut self,
        endpoint: &AudioEndpoint,
        _info: &ProcessInfo,
        channel: usize,
        src: &[f32],
    ) {
        let Some(device) = self.output.get_mut(endpoint.device_channel(channel)) else {
            return;
        };
        let Some(device) = device.get_mut(self.frame_offset..) else {
            return;
        };
        for (out, sample) in device.iter_mut().zip(src) {
            *out += *sample;
        }
    }

    fn on_set_midi(&mut self, source: &MidiSource, info: &ProcessInfo, dest: &mut MidiEventBuffer) {
        match source {
            MidiSource::Sequencer => {
                dest.merge(self.sequence_events.as_slice());
                dest.merge(self.sample_events.as_slice());
            }
            MidiSource::Device(device) => device.read_events(info, dest),
        }
    }

    fn on_get_midi(&mut self, sink: &MidiSink, info: &ProcessInfo, events: &[MidiEventTimed]) {
        if !events.is_empty() {
            sink.device().write_events(info, events);
        }
    }
}
