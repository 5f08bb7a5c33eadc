// Compiled graph - immutable snapshot executed by the audio thread
//
// Compilation (control thread) resolves everything `process` needs:
// - topological order (Kahn)
// - per-node input routes, as indices into the order
// - latency compensation delays for audio routes
// - scratch buffers sized for the maximum block size
//
// The snapshot is swapped in atomically through `SharedGraph`; the audio
// thread always runs a complete, self-consistent topology.

use super::buffer::AudioBuffer;
use super::endpoint::EndpointIo;
use super::graph::{Edge, EdgeKind, GraphNode, NodeId, PluginNode};
use super::latency::DelayLine;
use super::process_info::ProcessInfo;
use crate::midi::buffer::MidiEventBuffer;
use crate::plugin::ProcessBuffers;
use arc_swap::{ArcSwap, Guard};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
struct AudioRoute {
    /// Position of the source node in the processing order
    source: usize,
    source_channel: usize,
    target_channel: usize,
    /// Index into `GraphScratch::delays` when the route needs compensation
    delay: Option<usize>,
}

#[derive(Debug)]
struct CompiledNode {
    id: NodeId,
    node: GraphNode,
    audio_routes: Vec<AudioRoute>,
    /// Positions of the MIDI sources feeding this node
    midi_sources: Vec<usize>,
    /// Accumulated latency at the node's output, in samples
    output_latency: u32,
}

/// Pre-allocated working memory for one snapshot
#[derive(Debug)]
struct GraphScratch {
    audio_in: Vec<AudioBuffer>,
    audio_out: Vec<AudioBuffer>,
    midi_in: Vec<MidiEventBuffer>,
    midi_out: Vec<MidiEventBuffer>,
    delays: Vec<DelayLine>,
    route_buffer: Vec<f32>,
}

#[derive(Debug)]
pub struct CompiledGraph {
    version: u64,
    nodes: Vec<CompiledNode>,
    edges: Vec<Edge>,
    max_block_size: usize,
    event_capacity: usize,
    scratch: Mutex<GraphScratch>,
}

impl CompiledGraph {
    /// Compile a topology. `edges` must form a DAG over `nodes`; nodes left
    /// over by an (impossible) cycle are appended in id order.
    pub fn compile(
        version: u64,
        nodes: &BTreeMap<NodeId, GraphNode>,
        edges: &[Edge],
        max_block_size: usize,
        event_capacity: usize,
    ) -> Self {
        let order = topological_order(nodes, edges);
        let position: HashMap<NodeId, usize> = order
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect();

        let mut compiled: Vec<CompiledNode> = Vec::with_capacity(order.len());
        let mut delay_lengths = Vec::new();

        for id in &order {
            let Some(node) = nodes.get(id) else { continue };

            let incoming: Vec<&Edge> = edges.iter().filter(|edge| edge.target == *id).collect();
            let audio_sources: Vec<(usize, &Edge)> = incoming
                .iter()
                .filter(|edge| edge.kind == EdgeKind::Audio)
                .filter_map(|edge| position.get(&edge.source).map(|p| (*p, *edge)))
                .filter(|(source, _)| *source < compiled.len())
                .collect();

            // Latest arrival among audio inputs; earlier ones get delayed
            let input_latency = audio_sources
                .iter()
                .map(|(source, _)| compiled[*source].output_latency)
                .max()
                .unwrap_or(0);

            let audio_routes = audio_sources
                .iter()
                .map(|(source, edge)| {
                    let compensation = input_latency - compiled[*source].output_latency;
                    let delay = (compensation > 0).then(|| {
                        delay_lengths.push(compensation as usize);
                        delay_lengths.len() - 1
                    });
                    AudioRoute {
                        source: *source,
                        source_channel: edge.source_channel,
                        target_channel: edge.target_channel,
                        delay,
                    }
                })
                .collect();

            let midi_sources = incoming
                .iter()
                .filter(|edge| edge.kind == EdgeKind::Midi)
                .filter_map(|edge| position.get(&edge.source).copied())
                .filter(|source| *source < compiled.len())
                .collect();

            compiled.push(CompiledNode {
                id: *id,
                node: node.clone(),
                audio_routes,
                midi_sources,
                output_latency: input_latency + node.latency(),
            });
        }

        let scratch = GraphScratch {
            audio_in: compiled
                .iter()
                .map(|n| AudioBuffer::new(n.node.audio_inputs(), max_block_size))
                .collect(),
            audio_out: compiled
                .iter()
                .map(|n| AudioBuffer::new(n.node.audio_outputs(), max_block_size))
                .collect(),
            midi_in: compiled
                .iter()
                .map(|_| MidiEventBuffer::new(event_capacity))
                .collect(),
            midi_out: compiled
                .iter()
                .map(|_| MidiEventBuffer::new(event_capacity))
                .collect(),
            delays: delay_lengths.into_iter().map(DelayLine::new).collect(),
            route_buffer: vec![0.0; max_block_size],
        };

        Self {
            version,
            nodes: compiled,
            edges: edges.to_vec(),
            max_block_size,
            event_capacity,
            scratch: Mutex::new(scratch),
        }
    }

    /// Empty graph
    pub fn empty(max_block_size: usize, event_capacity: usize) -> Self {
        Self::compile(0, &BTreeMap::new(), &[], max_block_size, event_capacity)
    }

    /// Publication counter, increases with every compile
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in processing order
    pub fn order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id).map(|n| &n.node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &GraphNode)> + '_ {
        self.nodes.iter().map(|n| (n.id, &n.node))
    }

    pub fn plugins(&self) -> impl Iterator<Item = &PluginNode> + '_ {
        self.nodes.iter().filter_map(|n| n.node.as_plugin())
    }

    /// Accumulated plugin latency at `id`'s output
    pub fn output_latency(&self, id: NodeId) -> Option<u32> {
        self.nodes.iter().find(|n| n.id == id).map(|n| n.output_latency)
    }

    /// Largest latency reaching any audio output node
    pub fn total_latency(&self) -> u32 {
        self.nodes
            .iter()
            .filter(|n| matches!(n.node, GraphNode::AudioOutput(_)))
            .map(|n| n.output_latency)
            .max()
            .unwrap_or(0)
    }

    /// Check the snapshot's internal invariants: every edge is routed, every
    /// route points upstream, scratch matches the node set.
    pub fn is_consistent(&self) -> bool {
        let position: HashMap<NodeId, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, n)| (n.id, index))
            .collect();
        if position.len() != self.nodes.len() {
            return false;
        }

        let edges_ok = self.edges.iter().all(|edge| {
            match (position.get(&edge.source), position.get(&edge.target)) {
                (Some(source), Some(target)) => source < target,
                _ => false,
            }
        });

        let routes: usize = self
            .nodes
            .iter()
            .map(|n| n.audio_routes.len() + n.midi_sources.len())
            .sum();

        let routes_ok = self.nodes.iter().enumerate().all(|(index, n)| {
            n.audio_routes.iter().all(|r| {
                r.source < index
                    && r.source_channel < self.nodes[r.source].node.audio_outputs()
                    && r.target_channel < n.node.audio_inputs()
            }) && n.midi_sources.iter().all(|s| *s < index)
        });

        let scratch_ok = match self.scratch.try_lock() {
            Ok(scratch) => {
                scratch.audio_in.len() == self.nodes.len()
                    && scratch.audio_out.len() == self.nodes.len()
                    && scratch.midi_in.len() == self.nodes.len()
                    && scratch.midi_out.len() == self.nodes.len()
            }
            // Busy in `process`: sizes were fixed at compile time
            Err(_) => true,
        };

        edges_ok && routes == self.edges.len() && routes_ok && scratch_ok
    }

    /// Run every node once, in topological order, for `block_size` frames.
    ///
    /// Real-time safe: no allocation, no blocking. Returns false (nothing
    /// processed) if the block exceeds the compiled capacity or the scratch
    /// space is busy.
    pub fn process(&self, block_size: usize, io: &mut impl EndpointIo, info: &ProcessInfo) -> bool {
        if block_size > self.max_block_size {
            return false;
        }
        let Ok(mut guard) = self.scratch.try_lock() else {
            return false;
        };
        let scratch = &mut *guard;
        let info = info.with_block_size(block_size);
        let n = block_size;

        for (index, compiled) in self.nodes.iter().enumerate() {
            // Gather inputs from upstream outputs
            let audio_in = &mut scratch.audio_in[index];
            audio_in.clear_frames(n);
            for route in &compiled.audio_routes {
                let source = scratch.audio_out[route.source].channel(route.source_channel);
                let Some(source) = source else {
                    continue;
                };
                match route.delay {
                    Some(delay) => {
                        let temp = &mut scratch.route_buffer[..n];
                        temp.copy_from_slice(&source[..n]);
                        scratch.delays[delay].process(temp);
                        audio_in.add_to_channel(route.target_channel, temp);
                    }
                    None => audio_in.add_to_channel(route.target_channel, &source[..n]),
                }
            }

            scratch.midi_in[index].clear();
            for source in &compiled.midi_sources {
                scratch.midi_in[index].merge(scratch.midi_out[*source].as_slice());
            }

            scratch.audio_out[index].clear_frames(n);
            scratch.midi_out[index].clear();

            let audio_in = &scratch.audio_in[index];
            let audio_out = &mut scratch.audio_out[index];
            let midi_in = &scratch.midi_in[index];
            let midi_out = &mut scratch.midi_out[index];

            match &compiled.node {
                GraphNode::AudioInput(endpoint) => {
                    for channel in 0..endpoint.num_channels {
                        if let Some(dest) = audio_out.channel_mut(channel) {
                            io.on_set_audio(endpoint, &info, channel, &mut dest[..n]);
                        }
                    }
                }
                GraphNode::AudioOutput(endpoint) => {
                    for channel in 0..endpoint.num_channels {
                        if let Some(src) = audio_in.channel(channel) {
                            io.on_get_audio(endpoint, &info, channel, &src[..n]);
                        }
                    }
                }
                GraphNode::MidiInput(source) => io.on_set_midi(source, &info, midi_out),
                GraphNode::MidiOutput(sink) => io.on_get_midi(sink, &info, midi_in.as_slice()),
                GraphNode::Plugin(plugin) => {
                    if plugin.is_bypassed() {
                        audio_out.copy_from(audio_in, n);
                        midi_out.merge(midi_in.as_slice());
                        continue;
                    }

                    let ok = match plugin.plugin().try_lock() {
                        Ok(mut instance) => {
                            let mut buffers = ProcessBuffers {
                                audio_in,
                                audio_out: &mut *audio_out,
                                midi_in: midi_in.as_slice(),
                                midi_out: &mut *midi_out,
                            };
                            // A panic counts as a processing failure
                            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                                instance.process(&mut buffers, &info)
                            }));
                            matches!(result, Ok(Ok(())))
                        }
                        // Busy, or poisoned before this snapshot
                        Err(_) => false,
                    };

                    // Faulted or busy node: silence for this block
                    if !ok {
                        audio_out.clear_frames(n);
                        midi_out.clear();
                    }
                }
            }
        }

        true
    }
}

/// Kahn's algorithm, seeded in id order so the result is deterministic
fn topological_order(nodes: &BTreeMap<NodeId, GraphNode>, edges: &[Edge]) -> Vec<NodeId> {
    let mut in_degree: BTreeMap<NodeId, usize> = nodes.keys().map(|id| (*id, 0)).collect();
    for edge in edges {
        if let Some(degree) = in_degree.get_mut(&edge.target) {
            *degree += 1;
        }
    }

    let mut queue: VecDeque<NodeId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(id) = queue.pop_front() {
        order.push(id);
        for edge in edges.iter().filter(|edge| edge.source == id) {
            if let Some(degree) = in_degree.get_mut(&edge.target) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(edge.target);
                }
            }
        }
    }

    if order.len() != nodes.len() {
        tracing::error!("graph contains a cycle; processing remaining nodes in id order");
        for id in nodes.keys() {
            if !order.contains(id) {
                order.push(*id);
            }
        }
    }

    order
}

/// Publication point shared by the control side and the audio thread
#[derive(Debug)]
pub struct SharedGraph {
    snapshot: ArcSwap<CompiledGraph>,
    version: AtomicU64,
    max_block_size: AtomicUsize,
    event_capacity: usize,
    /// Sample rate bits once the engine is running, 0 before
    sample_rate: AtomicU64,
}

impl SharedGraph {
    pub fn new(max_block_size: usize, event_capacity: usize) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(CompiledGraph::empty(max_block_size, event_capacity)),
            version: AtomicU64::new(0),
            max_block_size: AtomicUsize::new(max_block_size),
            event_capacity,
            sample_rate: AtomicU64::new(0),
        }
    }

    /// Current snapshot (lock-free)
    pub fn load(&self) -> Guard<Arc<CompiledGraph>> {
        self.snapshot.load()
    }

    pub fn load_full(&self) -> Arc<CompiledGraph> {
        self.snapshot.load_full()
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size.load(Ordering::Acquire)
    }

    /// Compile `nodes`/`edges` and swap the result in
    pub fn publish(&self, nodes: &BTreeMap<NodeId, GraphNode>, edges: &[Edge]) {
        self.snapshot.rcu(|_| {
            let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
            CompiledGraph::compile(
                version,
                nodes,
                edges,
                self.max_block_size(),
                self.event_capacity,
            )
        });
    }

    /// Resize for a device and initialize every plugin. Called from
    /// `start_processing`, before the first `process`.
    pub fn prepare(&self, sample_rate: f64, max_block_size: usize) {
        self.sample_rate.store(sample_rate.to_bits(), Ordering::Release);
        self.max_block_size.store(max_block_size, Ordering::Release);

        let current = self.load_full();
        for plugin in current.plugins() {
            self.prepare_plugin(plugin);
        }

        // Recompile the current topology: scratch size and (possibly
        // updated) plugin latencies
        self.snapshot.rcu(|current| {
            let nodes: BTreeMap<NodeId, GraphNode> = current
                .nodes()
                .map(|(id, node)| (id, node.clone()))
                .collect();
            let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
            CompiledGraph::compile(
                version,
                &nodes,
                current.edges(),
                max_block_size,
                self.event_capacity,
            )
        });
    }

    /// Forget the device; plugins added afterwards are not initialized
    /// until the next `prepare`
    pub fn release(&self) {
        self.sample_rate.store(0, Ordering::Release);
    }

    /// Initialize `plugin` if a device is running
    pub(crate) fn prepare_plugin(&self, plugin: &PluginNode) {
        let sample_rate = f64::from_bits(self.sample_rate.load(Ordering::Acquire));
        if sample_rate <= 0.0 {
            return;
        }
        let max_block_size = self.max_block_size();
        let name = &plugin.descriptor().name;
        match plugin.plugin().lock() {
            Ok(mut instance) => {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    instance.initialize(sample_rate, max_block_size)
                }));
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(plugin = %name, error = %e, "plugin initialization failed");
                    }
                    Err(_) => tracing::warn!(plugin = %name, "plugin panicked in initialize"),
                }
            }
            Err(_) => {
                tracing::warn!(plugin = %name, "plugin mutex poisoned");
            }
        }
    }
}
