// Integration test: processing graph topology
//
// Order, cycle rejection and edge validation through the project API, and
// the order the engine actually runs plugins in.

mod common;

use common::{MidiThru, OrderRecorder, RecordingMidiDevice, run_block, started_project};
use mymusic_core::{
    Edge, EngineConfig, GraphError, MidiEvent, MidiSource, Plugin, PluginDescriptor,
    PluginResult, ProcessBuffers, ProcessInfo, Project,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// Stereo instrument that writes a block and then panics
struct Crashing {
    descriptor: PluginDescriptor,
}

impl Crashing {
    fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new("test.crashing", "Crashing").with_audio(0, 2),
        }
    }
}

impl Plugin for Crashing {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn initialize(&mut self, _sample_rate: f64, _max_block_size: usize) -> PluginResult<()> {
        Ok(())
    }

    fn process(
        &mut self,
        buffers: &mut ProcessBuffers<'_>,
        info: &ProcessInfo,
    ) -> PluginResult<()> {
        if let Some(out) = buffers.audio_out.channel_mut(0) {
            out[..info.block_size].fill(1.0);
        }
        panic!("instrument crashed");
    }
}

#[test]
fn test_chain_runs_in_dependency_order() {
    let (mut project, mut engine) = started_project();
    let log = Arc::new(Mutex::new(Vec::new()));

    // Added in reverse so id order differs from dependency order
    let c = project.add_plugin(Box::new(OrderRecorder::new("C", &log)));
    let b = project.add_plugin(Box::new(OrderRecorder::new("B", &log)));
    let a = project.add_plugin(Box::new(OrderRecorder::new("A", &log)));
    project.graph_mut().connect_audio(a, 0, b, 0).unwrap();
    project.graph_mut().connect_audio(b, 0, c, 0).unwrap();

    assert_eq!(project.graph().processing_order(), vec![a, b, c]);

    run_block(&mut engine);
    assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
}

#[test]
fn test_cycle_rejected_and_topology_unchanged() {
    let (mut project, _engine) = Project::new(EngineConfig::default()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let a = project.add_plugin(Box::new(OrderRecorder::new("A", &log)));
    let b = project.add_plugin(Box::new(OrderRecorder::new("B", &log)));
    let c = project.add_plugin(Box::new(OrderRecorder::new("C", &log)));
    project.graph_mut().connect_audio(a, 0, b, 0).unwrap();
    project.graph_mut().connect_audio(b, 0, c, 0).unwrap();

    let edges_before = project.graph().edges().to_vec();
    let version_before = project.shared().graph().load().version();

    assert_eq!(
        project.graph_mut().connect_audio(c, 0, a, 0),
        Err(GraphError::CycleDetected)
    );
    assert_eq!(project.graph_mut().connect_audio(a, 0, a, 0), Err(GraphError::CycleDetected));

    assert_eq!(project.graph().edges(), edges_before.as_slice());
    assert_eq!(project.graph().processing_order(), vec![a, b, c]);
    assert_eq!(project.shared().graph().load().version(), version_before);
}

#[test]
fn test_invalid_edges_rejected() {
    let (mut project, _engine) = Project::new(EngineConfig::default()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let plugin = project.add_plugin(Box::new(OrderRecorder::new("P", &log)));
    let output = project.add_audio_output("Main", 0, 2);
    let sequencer = project.add_midi_input(MidiSource::Sequencer);

    assert!(matches!(
        project.graph_mut().connect_audio(plugin, 3, output, 0),
        Err(GraphError::InvalidChannel { .. })
    ));
    assert!(matches!(
        project.graph_mut().connect_midi(sequencer, output),
        Err(GraphError::IncompatibleEdge(_))
    ));
    assert!(matches!(
        project.graph_mut().connect(Edge::audio(plugin, 0, mymusic_core::NodeId(99), 0)),
        Err(GraphError::NodeNotFound(_))
    ));

    project.graph_mut().connect_audio(plugin, 0, output, 0).unwrap();
    assert_eq!(
        project.graph_mut().connect_audio(plugin, 0, output, 0),
        Err(GraphError::DuplicateEdge)
    );
    assert_eq!(project.graph().edges().len(), 1);
}

#[test]
fn test_remove_node_drops_its_edges() {
    let (mut project, _engine) = Project::new(EngineConfig::default()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let a = project.add_plugin(Box::new(OrderRecorder::new("A", &log)));
    let b = project.add_plugin(Box::new(OrderRecorder::new("B", &log)));
    let output = project.add_audio_output("Main", 0, 1);
    project.graph_mut().connect_audio(a, 0, b, 0).unwrap();
    project.graph_mut().connect_audio(b, 0, output, 0).unwrap();

    project.graph_mut().remove_node(b).unwrap();
    assert!(project.graph().edges().is_empty());
    assert_eq!(project.graph().processing_order(), vec![a, output]);
    assert_eq!(
        project.graph_mut().remove_node(b).err(),
        Some(GraphError::NodeNotFound(b))
    );
}

#[test]
fn test_midi_flows_through_plugin_to_device() {
    let (mut project, mut engine) = started_project();
    let device = RecordingMidiDevice::new("Synth");

    let sequencer = project.add_midi_input(MidiSource::Sequencer);
    let thru = project.add_plugin(Box::new(MidiThru::new()));
    let sink = project.add_midi_output(device.clone());
    project.graph_mut().connect_midi(sequencer, thru).unwrap();
    project.graph_mut().connect_midi(thru, sink).unwrap();

    assert!(project.send_sample_note_on(2, 64, 90));
    run_block(&mut engine);

    let received = device.take();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].event, MidiEvent::note_on(2, 64, 90));
    assert_eq!(received[0].sample_offset, 0);

    // Bypassed plugin still forwards MIDI
    let graph = project.shared().graph().load();
    graph.node(thru).and_then(|node| node.as_plugin()).unwrap().set_bypass(true);
    assert!(project.send_sample_note_off(2, 64, 0));
    run_block(&mut engine);
    assert_eq!(device.take()[0].event, MidiEvent::note_off(2, 64, 0));
}

#[test]
fn test_panicking_plugin_is_silenced_and_graph_keeps_running() {
    let (mut project, mut engine) = started_project();
    let device = RecordingMidiDevice::new("Synth");

    let crashing = project.add_plugin(Box::new(Crashing::new()));
    let output = project.add_audio_output("Main", 0, 2);
    project.graph_mut().connect_audio(crashing, 0, output, 0).unwrap();
    project.graph_mut().connect_audio(crashing, 1, output, 1).unwrap();

    let sequencer = project.add_midi_input(MidiSource::Sequencer);
    let thru = project.add_plugin(Box::new(MidiThru::new()));
    let sink = project.add_midi_output(device.clone());
    project.graph_mut().connect_midi(sequencer, thru).unwrap();
    project.graph_mut().connect_midi(thru, sink).unwrap();

    for pitch in [60, 62] {
        assert!(project.send_sample_note_on(0, pitch, 100));
        let block = panic::catch_unwind(AssertUnwindSafe(|| run_block(&mut engine)));
        let [left, right] = block.expect("plugin panic escaped the engine");

        assert!(left.iter().chain(&right).all(|s| *s == 0.0));
        let received = device.take();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].event, MidiEvent::note_on(0, pitch, 100));
    }
}
