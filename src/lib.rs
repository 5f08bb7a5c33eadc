// MyMusic Core - real-time audio/MIDI processing core

pub mod audio;
pub mod config;
pub mod messaging;
pub mod midi;
pub mod plugin;
pub mod project;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use audio::buffer::AudioBuffer;
pub use audio::compiled::{CompiledGraph, SharedGraph};
pub use audio::endpoint::{AudioEndpoint, EndpointIo, MidiSink, MidiSource};
pub use audio::engine::{AudioDeviceCallback, Engine};
pub use audio::graph::{
    Edge, EdgeKind, GraphError, GraphNode, GraphResult, NodeId, PluginNode, ProcessingGraph,
};
pub use audio::process_info::ProcessInfo;
pub use config::{ConfigError, EngineConfig};
pub use midi::{MidiDevice, MidiEvent, MidiEventBuffer, MidiEventTimed};
pub use plugin::{Plugin, PluginDescriptor, PluginError, PluginResult, ProcessBuffers};
pub use project::{Project, ProjectError, ProjectResult};
pub use sequencer::{
    LoopRegion, Mbt, Meter, MeterMap, MusicalTimeService, Note, PlayingNoteInfo, Sequence, Tempo,
    TempoMap, Tick, TimeContext, TimeMap, TransportState, Transporter,
};
