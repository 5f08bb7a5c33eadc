// Graph endpoints - where audio and MIDI enter and leave the graph
//
// The graph never talks to devices directly. During `process` it asks an
// `EndpointIo` implementation to fill input endpoints and to take the
// content of output endpoints, one block at a time.

use crate::audio::process_info::ProcessInfo;
use crate::midi::buffer::MidiEventBuffer;
use crate::midi::device::MidiDevice;
use crate::midi::event::MidiEventTimed;
use std::fmt;
use std::sync::Arc;

/// A range of device channels exposed as one graph node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEndpoint {
    pub name: String,
    /// First device channel
    pub channel_index: usize,
    pub num_channels: usize,
}

impl AudioEndpoint {
    pub fn new(name: impl Into<String>, channel_index: usize, num_channels: usize) -> Self {
        Self {
            name: name.into(),
            channel_index,
            num_channels,
        }
    }

    /// Device channel backing the node's channel `channel`
    pub fn device_channel(&self, channel: usize) -> usize {
        self.channel_index + channel
    }
}

/// Where a MIDI input node gets its events
#[derive(Clone)]
pub enum MidiSource {
    /// Events scheduled from the project's sequences plus live sample notes
    Sequencer,
    Device(Arc<dyn MidiDevice>),
}

impl MidiSource {
    pub fn name(&self) -> &str {
        match self {
            MidiSource::Sequencer => "Sequencer",
            MidiSource::Device(device) => device.name(),
        }
    }
}

impl fmt::Debug for MidiSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiSource::Sequencer => write!(f, "Sequencer"),
            MidiSource::Device(device) => f.debug_tuple("Device").field(&device.name()).finish(),
        }
    }
}

/// MIDI output device fed by a MIDI output node
#[derive(Clone)]
pub struct MidiSink(pub Arc<dyn MidiDevice>);

impl MidiSink {
    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn device(&self) -> &Arc<dyn MidiDevice> {
        &self.0
    }
}

impl fmt::Debug for MidiSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MidiSink").field(&self.name()).finish()
    }
}

/// Device-side collaborator of [`CompiledGraph::process`](super::compiled::CompiledGraph::process).
///
/// All methods run on the audio thread.
pub trait EndpointIo {
    /// Fill `dest` with one block of the node's channel `channel`
    fn on_set_audio(
        &mut self,
        endpoint: &AudioEndpoint,
        info: &ProcessInfo,
        channel: usize,
        dest: &mut [f32],
    );

    /// Take one block of the node's channel `channel`
    fn on_get_audio(
        &mut self,
        endpoint: &AudioEndpoint,
        info: &ProcessInfo,
        channel: usize,
        src: &[f32],
    );

    /// Fill `dest` with the events of one block
    fn on_set_midi(&mut self, source: &MidiSource, info: &ProcessInfo, dest: &mut MidiEventBuffer);

    /// Take the events of one block
    fn on_get_midi(&mut self, sink: &MidiSink, info: &ProcessInfo, events: &[MidiEventTimed]);
}

/// Endpoint I/O that reads silence and discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEndpointIo;

impl EndpointIo for NullEndpointIo {
    fn on_set_audio(&mut self, _: &AudioEndpoint, _: &ProcessInfo, _: usize, dest: &mut [f32]) {
        dest.fill(0.0);
    }

    fn on_get_audio(&mut self, _: &AudioEndpoint, _: &ProcessInfo, _: usize, _: &[f32]) {}

    fn on_set_midi(&mut self, _: &MidiSource, _: &ProcessInfo, _: &mut MidiEventBuffer) {}

    fn on_get_midi(&mut self, _: &MidiSink, _: &ProcessInfo, _: &[MidiEventTimed]) {}
}
