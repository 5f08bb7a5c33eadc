// Processing graph - control-side topology
//
// Nodes and edges are edited here, on a non-real-time thread. Every
// mutation is validated first; on success the topology is compiled into an
// immutable `CompiledGraph` and published for the audio thread. A rejected
// mutation leaves both this graph and the published snapshot untouched.
//
// Node kinds are a closed set of variants, each declaring which of the
// capabilities {audio in, audio out, MIDI in, MIDI out} it has.

use super::compiled::SharedGraph;
use super::endpoint::{AudioEndpoint, MidiSink, MidiSource};
use crate::plugin::{Plugin, PluginDescriptor};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Topology errors, reported to the mutating caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Invalid channel {channel} on node {node}")]
    InvalidChannel { node: NodeId, channel: usize },

    #[error("Incompatible edge: {0}")]
    IncompatibleEdge(String),

    #[error("Edge already exists")]
    DuplicateEdge,

    #[error("Connection would create a cycle")]
    CycleDetected,
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Unique node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Audio,
    Midi,
}

/// Directed connection from one node's output channel to another node's
/// input channel. MIDI nodes have a single port, channel 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub kind: EdgeKind,
    pub source: NodeId,
    pub source_channel: usize,
    pub target: NodeId,
    pub target_channel: usize,
}

impl Edge {
    pub fn audio(
        source: NodeId,
        source_channel: usize,
        target: NodeId,
        target_channel: usize,
    ) -> Self {
        Self {
            kind: EdgeKind::Audio,
            source,
            source_channel,
            target,
            target_channel,
        }
    }

    pub fn midi(source: NodeId, target: NodeId) -> Self {
        Self {
            kind: EdgeKind::Midi,
            source,
            source_channel: 0,
            target,
            target_channel: 0,
        }
    }
}

/// A hosted plugin instance plus its host-side state
///
/// The instance sits behind a mutex shared with every published snapshot;
/// the audio thread only ever `try_lock`s it.
#[derive(Clone)]
pub struct PluginNode {
    plugin: Arc<Mutex<Box<dyn Plugin>>>,
    descriptor: PluginDescriptor,
    latency: u32,
    bypass: Arc<AtomicBool>,
}

impl PluginNode {
    pub fn new(plugin: Box<dyn Plugin>) -> Self {
        let descriptor = plugin.descriptor().clone();
        let latency = plugin.get_latency();
        Self {
            plugin: Arc::new(Mutex::new(plugin)),
            descriptor,
            latency,
            bypass: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn plugin(&self) -> &Arc<Mutex<Box<dyn Plugin>>> {
        &self.plugin
    }

    /// Reported latency in samples. Blocks until the instance is free, so
    /// only call this from the control side.
    pub fn latency(&self) -> u32 {
        self.plugin
            .lock()
            .map(|plugin| plugin.get_latency())
            .unwrap_or(self.latency)
    }

    pub fn set_bypass(&self, bypass: bool) {
        self.bypass.store(bypass, Ordering::Release);
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass.load(Ordering::Acquire)
    }
}

impl fmt::Debug for PluginNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginNode")
            .field("descriptor", &self.descriptor)
            .field("bypass", &self.is_bypassed())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum GraphNode {
    AudioInput(AudioEndpoint),
    AudioOutput(AudioEndpoint),
    MidiInput(MidiSource),
    MidiOutput(MidiSink),
    Plugin(PluginNode),
}

impl GraphNode {
    pub fn plugin(plugin: Box<dyn Plugin>) -> Self {
        GraphNode::Plugin(PluginNode::new(plugin))
    }

    pub fn name(&self) -> &str {
        match self {
            GraphNode::AudioInput(endpoint) | GraphNode::AudioOutput(endpoint) => &endpoint.name,
            GraphNode::MidiInput(source) => source.name(),
            GraphNode::MidiOutput(sink) => sink.name(),
            GraphNode::Plugin(node) => &node.descriptor.name,
        }
    }

    /// Audio channels the node consumes
    pub fn audio_inputs(&self) -> usize {
        match self {
            GraphNode::AudioOutput(endpoint) => endpoint.num_channels,
            GraphNode::Plugin(node) => node.descriptor.audio_inputs,
            _ => 0,
        }
    }

    /// Audio channels the node produces
    pub fn audio_outputs(&self) -> usize {
        match self {
            GraphNode::AudioInput(endpoint) => endpoint.num_channels,
            GraphNode::Plugin(node) => node.descriptor.audio_outputs,
            _ => 0,
        }
    }

    pub fn consumes_midi(&self) -> bool {
        match self {
            GraphNode::MidiOutput(_) => true,
            GraphNode::Plugin(node) => node.descriptor.midi_input,
            _ => false,
        }
    }

    pub fn produces_midi(&self) -> bool {
        match self {
            GraphNode::MidiInput(_) => true,
            GraphNode::Plugin(node) => node.descriptor.midi_output,
            _ => false,
        }
    }

    /// Processing latency in samples (plugins only)
    pub fn latency(&self) -> u32 {
        match self {
            GraphNode::Plugin(node) => node.latency(),
            _ => 0,
        }
    }

    pub fn as_plugin(&self) -> Option<&PluginNode> {
        match self {
            GraphNode::Plugin(node) => Some(node),
            _ => None,
        }
    }
}

/// Control-side processing graph
pub struct ProcessingGraph {
    nodes: BTreeMap<NodeId, GraphNode>,
    edges: Vec<Edge>,
    next_node_id: usize,
    shared: Arc<SharedGraph>,
}

impl ProcessingGraph {
    /// Create an empty graph publishing into `shared`
    pub fn new(shared: Arc<SharedGraph>) -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            next_node_id: 0,
            shared,
        }
    }

    /// Snapshot publication point read by the audio thread
    pub fn shared(&self) -> &Arc<SharedGraph> {
        &self.shared
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &GraphNode)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// First node with the given display name
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name() == name)
            .map(|(id, _)| *id)
    }

    /// Node order of the currently published snapshot
    pub fn processing_order(&self) -> Vec<NodeId> {
        self.shared.load().order().collect()
    }

    /// Add a node to the graph
    pub fn add_node(&mut self, node: GraphNode) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        if let GraphNode::Plugin(plugin) = &node {
            self.shared.prepare_plugin(plugin);
        }

        tracing::debug!(node = %id, name = node.name(), "graph: add node");
        self.nodes.insert(id, node);
        self.publish();
        id
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<GraphNode> {
        let node = self.nodes.remove(&id).ok_or(GraphError::NodeNotFound(id))?;
        self.edges.retain(|edge| edge.source != id && edge.target != id);

        tracing::debug!(node = %id, name = node.name(), "graph: remove node");
        self.publish();
        Ok(node)
    }

    /// Add an edge. Fails without touching the graph if the edge is
    /// invalid or would close a cycle.
    pub fn connect(&mut self, edge: Edge) -> GraphResult<()> {
        if let Err(e) = self.validate(&edge) {
            tracing::warn!(?edge, error = %e, "graph: connection rejected");
            return Err(e);
        }

        self.edges.push(edge);
        tracing::debug!(?edge, "graph: connect");
        self.publish();
        Ok(())
    }

    pub fn connect_audio(
        &mut self,
        source: NodeId,
        source_channel: usize,
        target: NodeId,
        target_channel: usize,
    ) -> GraphResult<()> {
        self.connect(Edge::audio(source, source_channel, target, target_channel))
    }

    pub fn connect_midi(&mut self, source: NodeId, target: NodeId) -> GraphResult<()> {
        self.connect(Edge::midi(source, target))
    }

    /// Remove an edge (exact match)
    pub fn disconnect(&mut self, edge: &Edge) -> GraphResult<()> {
        let index = self
            .edges
            .iter()
            .position(|e| e == edge)
            .ok_or_else(|| GraphError::IncompatibleEdge("no such edge".to_string()))?;
        self.edges.remove(index);

        tracing::debug!(?edge, "graph: disconnect");
        self.publish();
        Ok(())
    }

    /// Remove every edge between `source` and `target`
    pub fn disconnect_all(&mut self, source: NodeId, target: NodeId) -> usize {
        let before = self.edges.len();
        self.edges
            .retain(|edge| !(edge.source == source && edge.target == target));
        let removed = before - self.edges.len();
        if removed > 0 {
            self.publish();
        }
        removed
    }

    /// Recompile and republish (after a plugin changed its latency, for
    /// instance)
    pub fn republish(&self) {
        self.publish();
    }

    fn publish(&self) {
        self.shared.publish(&self.nodes, &self.edges);
    }

    fn validate(&self, edge: &Edge) -> GraphResult<()> {
        let source = self
            .nodes
            .get(&edge.source)
            .ok_or(GraphError::NodeNotFound(edge.source))?;
        let target = self
            .nodes
            .get(&edge.target)
            .ok_or(GraphError::NodeNotFound(edge.target))?;

        match edge.kind {
            EdgeKind::Audio => {
                if source.audio_outputs() == 0 {
                    return Err(GraphError::IncompatibleEdge(format!(
                        "{} has no audio output",
                        source.name()
                    )));
                }
                if target.audio_inputs() == 0 {
                    return Err(GraphError::IncompatibleEdge(format!(
                        "{} has no audio input",
                        target.name()
                    )));
                }
                if edge.source_channel >= source.audio_outputs() {
                    return Err(GraphError::InvalidChannel {
                        node: edge.source,
                        channel: edge.source_channel,
                    });
                }
                if edge.target_channel >= target.audio_inputs() {
                    return Err(GraphError::InvalidChannel {
                        node: edge.target,
                        channel: edge.target_channel,
                    });
                }
            }
            EdgeKind::Midi => {
                if !source.produces_midi() {
                    return Err(GraphError::IncompatibleEdge(format!(
                        "{} has no MIDI output",
                        source.name()
                    )));
                }
                if !target.consumes_midi() {
                    return Err(GraphError::IncompatibleEdge(format!(
                        "{} has no MIDI input",
                        target.name()
                    )));
                }
                if edge.source_channel != 0 {
                    return Err(GraphError::InvalidChannel {
                        node: edge.source,
                        channel: edge.source_channel,
                    });
                }
                if edge.target_channel != 0 {
                    return Err(GraphError::InvalidChannel {
                        node: edge.target,
                        channel: edge.target_channel,
                    });
                }
            }
        }

        if self.edges.contains(edge) {
            return Err(GraphError::DuplicateEdge);
        }

        if self.would_create_cycle(edge) {
            return Err(GraphError::CycleDetected);
        }

        Ok(())
    }

    /// The new edge closes a cycle iff its target already reaches its source
    fn would_create_cycle(&self, edge: &Edge) -> bool {
        let mut visited = HashSet::new();
        self.has_path_dfs(edge.target, edge.source, &mut visited)
    }

    fn has_path_dfs(&self, current: NodeId, target: NodeId, visited: &mut HashSet<NodeId>) -> bool {
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            return false;
        }

        self.edges
            .iter()
            .filter(|edge| edge.source == current)
            .any(|edge| self.has_path_dfs(edge.target, target, visited))
    }
}
