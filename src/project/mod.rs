// Project - control-side owner of everything the engine plays
//
// A `Project` is created explicitly and handed to whoever needs it; the
// real-time half (`Engine`) is created alongside it and only sees the
// published snapshots in `ProjectShared`.
//
// Publication rules:
// - tempo/meter maps: whole `TimeMap` swapped on every change
// - sequences: edited here, copied into an immutable snapshot on publish
// - graph: compiled and swapped by `ProcessingGraph` on every mutation
// - transport, playing notes: atomics
//
// Snapshots the engine stops playing come back through the retired queue
// and are freed here, on the next edit or `collect_retired` call.

use crate::audio::compiled::SharedGraph;
use crate::audio::endpoint::{AudioEndpoint, MidiSink, MidiSource};
use crate::audio::engine::Engine;
use crate::audio::graph::{GraphError, GraphNode, NodeId, ProcessingGraph};
use crate::config::{ConfigError, EngineConfig};
use crate::messaging::{
    DEFAULT_SAMPLE_NOTE_VELOCITY, RETIRED_QUEUE_CAPACITY, SampleNoteCommand, SampleNoteSender,
    SnapshotCollector, create_retired_queue, create_sample_note_channel,
};
use crate::midi::device::MidiDevice;
use crate::plugin::Plugin;
use crate::sequencer::playing_notes::{PlayingNoteInfo, PlayingNoteRegistry};
use crate::sequencer::sequence::Sequence;
use crate::sequencer::tempo_map::{MeterMap, TempoMap};
use crate::sequencer::time_service::{DEFAULT_SAMPLE_RATE, MusicalTimeService, TimeContext, TimeMap};
use crate::sequencer::timeline::{Mbt, Meter, Tempo, Tick};
use crate::sequencer::transport::{SharedTransporter, Transporter};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Sequence index {index} out of range ({len} sequences)")]
    SequenceIndexOutOfRange { index: usize, len: usize },

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

pub type ProjectResult<T> = Result<T, ProjectError>;

/// State read by the audio thread, written by the control side
#[derive(Debug)]
pub struct ProjectShared {
    pub(crate) time_map: ArcSwap<TimeMap>,
    /// f64 bits
    pub(crate) sample_rate: AtomicU64,
    pub(crate) sequences: ArcSwap<Vec<Arc<Sequence>>>,
    pub(crate) graph: Arc<SharedGraph>,
    pub(crate) transporter: SharedTransporter,
    pub(crate) sequence_notes: PlayingNoteRegistry,
    pub(crate) sample_notes: PlayingNoteRegistry,
}

impl ProjectShared {
    fn new(config: &EngineConfig) -> Self {
        Self {
            time_map: ArcSwap::from_pointee(TimeMap::new(
                config.tpqn,
                TempoMap::new(),
                MeterMap::new(),
            )),
            sample_rate: AtomicU64::new(DEFAULT_SAMPLE_RATE.to_bits()),
            sequences: ArcSwap::from_pointee(Vec::new()),
            graph: Arc::new(SharedGraph::new(
                config.default_max_block_size,
                config.event_capacity,
            )),
            transporter: Arc::new(Transporter::new()),
            sequence_notes: PlayingNoteRegistry::new(),
            sample_notes: PlayingNoteRegistry::new(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Acquire))
    }

    pub(crate) fn set_sample_rate(&self, sample_rate: f64) {
        self.sample_rate.store(sample_rate.to_bits(), Ordering::Release);
    }

    /// Time map bound to the current sample rate
    pub fn time_context(&self) -> TimeContext {
        TimeContext::new(self.time_map.load_full(), self.sample_rate())
    }

    /// Published sequence snapshot
    pub fn sequences(&self) -> Arc<Vec<Arc<Sequence>>> {
        self.sequences.load_full()
    }

    pub fn graph(&self) -> &Arc<SharedGraph> {
        &self.graph
    }

    pub fn transporter(&self) -> &SharedTransporter {
        &self.transporter
    }
}

pub struct Project {
    config: EngineConfig,
    shared: Arc<ProjectShared>,
    sequences: Vec<Sequence>,
    graph: ProcessingGraph,
    sample_notes: SampleNoteSender,
    retired: SnapshotCollector,
}

impl Project {
    /// Create a project and the engine that plays it
    pub fn new(config: EngineConfig) -> Result<(Self, Engine), ConfigError> {
        config.validate()?;

        let shared = Arc::new(ProjectShared::new(&config));
        let (sample_notes, sample_note_rx) =
            create_sample_note_channel(config.sample_note_queue_capacity);
        let (retired_tx, retired) = create_retired_queue(RETIRED_QUEUE_CAPACITY);
        let graph = ProcessingGraph::new(Arc::clone(&shared.graph));
        let engine = Engine::new(
            Arc::clone(&shared),
            sample_note_rx,
            retired_tx,
            config.clone(),
        );

        tracing::info!(tpqn = config.tpqn, "project created");

        let project = Self {
            config,
            shared,
            sequences: Vec::new(),
            graph,
            sample_notes,
            retired,
        };
        Ok((project, engine))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn shared(&self) -> &Arc<ProjectShared> {
        &self.shared
    }

    /// Free the snapshots the engine has stopped playing. Edits do this on
    /// their own; call it periodically when the project sits idle.
    pub fn collect_retired(&self) -> usize {
        self.retired.collect()
    }

    // --- Endpoints and graph ---

    pub fn graph(&self) -> &ProcessingGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ProcessingGraph {
        self.retired.collect();
        &mut self.graph
    }

    /// Expose device input channels `[channel_index, channel_index + num_channels)`
    pub fn add_audio_input(
        &mut self,
        name: impl Into<String>,
        channel_index: usize,
        num_channels: usize,
    ) -> NodeId {
        self.graph_mut().add_node(GraphNode::AudioInput(AudioEndpoint::new(
            name,
            channel_index,
            num_channels,
        )))
    }

    /// Expose device output channels `[channel_index, channel_index + num_channels)`
    pub fn add_audio_output(
        &mut self,
        name: impl Into<String>,
        channel_index: usize,
        num_channels: usize,
    ) -> NodeId {
        self.graph_mut().add_node(GraphNode::AudioOutput(AudioEndpoint::new(
            name,
            channel_index,
            num_channels,
        )))
    }

    pub fn add_midi_input(&mut self, source: MidiSource) -> NodeId {
        self.graph_mut().add_node(GraphNode::MidiInput(source))
    }

    pub fn add_midi_output(&mut self, device: Arc<dyn MidiDevice>) -> NodeId {
        self.graph_mut().add_node(GraphNode::MidiOutput(MidiSink(device)))
    }

    /// Remove every MIDI input node reading from `device_name`
    pub fn remove_midi_input(&mut self, device_name: &str) -> usize {
        self.remove_nodes_where(|node| {
            matches!(node, GraphNode::MidiInput(source) if source.name() == device_name)
        })
    }

    /// Remove every MIDI output node writing to `device_name`
    pub fn remove_midi_output(&mut self, device_name: &str) -> usize {
        self.remove_nodes_where(|node| {
            matches!(node, GraphNode::MidiOutput(sink) if sink.name() == device_name)
        })
    }

    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) -> NodeId {
        self.graph_mut().add_node(GraphNode::plugin(plugin))
    }

    fn remove_nodes_where(&mut self, predicate: impl Fn(&GraphNode) -> bool) -> usize {
        let ids: Vec<NodeId> = self
            .graph
            .nodes()
            .filter(|(_, node)| predicate(node))
            .map(|(id, _)| id)
            .collect();
        for id in &ids {
            // Ids come from the graph itself
            let _ = self.graph_mut().remove_node(*id);
        }
        ids.len()
    }

    // --- Sequences ---

    pub fn num_sequences(&self) -> usize {
        self.sequences.len()
    }

    pub fn sequence(&self, index: usize) -> Option<&Sequence> {
        self.sequences.get(index)
    }

    /// Create an empty sequence at `insert_at` (end if `None`); returns its index
    pub fn add_sequence(
        &mut self,
        name: impl Into<String>,
        insert_at: Option<usize>,
    ) -> ProjectResult<usize> {
        self.insert_sequence(Sequence::new(name), insert_at)
    }

    pub fn insert_sequence(
        &mut self,
        sequence: Sequence,
        insert_at: Option<usize>,
    ) -> ProjectResult<usize> {
        let index = insert_at.unwrap_or(self.sequences.len());
        if index > self.sequences.len() {
            return Err(ProjectError::SequenceIndexOutOfRange {
                index,
                len: self.sequences.len(),
            });
        }
        self.sequences.insert(index, sequence);
        self.publish_sequences();
        Ok(index)
    }

    pub fn remove_sequence(&mut self, index: usize) -> ProjectResult<Sequence> {
        self.check_index(index)?;
        let sequence = self.sequences.remove(index);
        self.publish_sequences();
        Ok(sequence)
    }

    /// Edit a sequence and publish the result to the audio thread
    pub fn edit_sequence<R>(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut Sequence) -> R,
    ) -> ProjectResult<R> {
        self.check_index(index)?;
        let result = edit(&mut self.sequences[index]);
        self.cache_sequence(index)?;
        Ok(result)
    }

    /// Republish one sequence's current content
    pub fn cache_sequence(&mut self, index: usize) -> ProjectResult<()> {
        self.check_index(index)?;
        let current = self.shared.sequences.load_full();
        if current.len() != self.sequences.len() {
            self.publish_sequences();
            return Ok(());
        }
        let mut next: Vec<Arc<Sequence>> = current.as_ref().clone();
        next[index] = Arc::new(self.sequences[index].clone());
        self.shared.sequences.store(Arc::new(next));
        self.retired.collect();
        Ok(())
    }

    fn publish_sequences(&self) {
        let snapshot: Vec<Arc<Sequence>> =
            self.sequences.iter().cloned().map(Arc::new).collect();
        self.shared.sequences.store(Arc::new(snapshot));
        self.retired.collect();
        tracing::debug!(count = self.sequences.len(), "sequences published");
    }

    fn check_index(&self, index: usize) -> ProjectResult<()> {
        if index < self.sequences.len() {
            Ok(())
        } else {
            Err(ProjectError::SequenceIndexOutOfRange {
                index,
                len: self.sequences.len(),
            })
        }
    }

    // --- Transport and time ---

    pub fn transporter(&self) -> &SharedTransporter {
        &self.shared.transporter
    }

    pub fn time_map(&self) -> Arc<TimeMap> {
        self.shared.time_map.load_full()
    }

    pub fn time_context(&self) -> TimeContext {
        self.shared.time_context()
    }

    pub fn set_tempo_map(&self, tempo: TempoMap) {
        let next = self.time_map().with_tempo_map(tempo);
        self.shared.time_map.store(Arc::new(next));
        self.retired.collect();
    }

    pub fn set_meter_map(&self, meter: MeterMap) {
        let next = self.time_map().with_meter_map(meter);
        self.shared.time_map.store(Arc::new(next));
        self.retired.collect();
    }

    /// Insert (or replace) a tempo break point
    pub fn add_tempo(&self, tick: Tick, bpm: f64) {
        let mut tempo = self.time_map().tempo_map().clone();
        tempo.insert(tick, bpm);
        self.set_tempo_map(tempo);
    }

    /// Insert (or replace) a meter break point
    pub fn add_meter(&self, tick: Tick, meter: Meter) {
        let mut meters = self.time_map().meter_map().clone();
        meters.insert(tick, meter);
        self.set_meter_map(meters);
    }

    // --- UI polling surface ---

    pub fn get_playing_sequence_notes(&self) -> Vec<PlayingNoteInfo> {
        self.shared.sequence_notes.snapshot()
    }

    pub fn get_playing_sample_notes(&self) -> Vec<PlayingNoteInfo> {
        self.shared.sample_notes.snapshot()
    }

    /// Start auditioning a note; returns false if the queue is full
    pub fn send_sample_note_on(&self, channel: u8, pitch: u8, velocity: u8) -> bool {
        self.sample_notes.send(SampleNoteCommand::On {
            channel,
            pitch,
            velocity,
        })
    }

    pub fn send_sample_note_on_default(&self, channel: u8, pitch: u8) -> bool {
        self.send_sample_note_on(channel, pitch, DEFAULT_SAMPLE_NOTE_VELOCITY)
    }

    pub fn send_sample_note_off(&self, channel: u8, pitch: u8, off_velocity: u8) -> bool {
        self.sample_notes.send(SampleNoteCommand::Off {
            channel,
            pitch,
            velocity: off_velocity,
        })
    }

    /// Sender usable from other control threads
    pub fn sample_note_sender(&self) -> SampleNoteSender {
        self.sample_notes.clone()
    }
}

impl MusicalTimeService for Project {
    fn sample_rate(&self) -> f64 {
        self.shared.sample_rate()
    }

    fn tpqn(&self) -> Tick {
        self.time_map().tpqn()
    }

    fn tick_to_sec(&self, tick: f64) -> f64 {
        self.time_map().tick_to_sec(tick)
    }

    fn sec_to_tick(&self, sec: f64) -> f64 {
        self.time_map().sec_to_tick(sec)
    }

    fn tick_to_mbt(&self, tick: Tick) -> Mbt {
        self.time_map().tick_to_mbt(tick)
    }

    fn mbt_to_tick(&self, mbt: Mbt) -> Tick {
        self.time_map().mbt_to_tick(mbt)
    }

    fn tempo_at(&self, tick: f64) -> Tempo {
        self.time_map().tempo_at(tick)
    }

    fn meter_at(&self, tick: f64) -> Meter {
        self.time_map().meter_at(tick)
    }
}
