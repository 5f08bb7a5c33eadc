// Shared fixtures for the integration tests
#![allow(dead_code)]

use mymusic_core::{
    AudioDeviceCallback, Engine, EngineConfig, MidiDevice, MidiEvent, MidiEventTimed, Plugin,
    PluginDescriptor, PluginResult, ProcessBuffers, ProcessInfo, Project,
};
use std::sync::{Arc, Mutex};

pub const SAMPLE_RATE: f64 = 48_000.0;
pub const BLOCK_SIZE: usize = 512;

/// A MIDI event as delivered to a device, with the tick its sub-block
/// started at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Received {
    pub event: MidiEvent,
    pub sample_offset: u32,
    pub start_tick: f64,
}

/// MIDI output that remembers everything written to it
#[derive(Default)]
pub struct RecordingMidiDevice {
    name: String,
    received: Mutex<Vec<Received>>,
}

impl RecordingMidiDevice {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn take(&self) -> Vec<Received> {
        std::mem::take(&mut *self.received.lock().unwrap())
    }

    pub fn note_ons(&self) -> Vec<Received> {
        self.take()
            .into_iter()
            .filter(|r| matches!(r.event, MidiEvent::NoteOn { velocity, .. } if velocity > 0))
            .collect()
    }
}

impl MidiDevice for RecordingMidiDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_events(&self, info: &ProcessInfo, events: &[MidiEventTimed]) {
        let mut received = self.received.lock().unwrap();
        received.extend(events.iter().map(|e| Received {
            event: e.event,
            sample_offset: e.sample_offset,
            start_tick: info.start_tick,
        }));
    }
}

/// Mono pass-through that logs its name every time it runs
pub struct OrderRecorder {
    descriptor: PluginDescriptor,
    log: Arc<Mutex<Vec<String>>>,
}

impl OrderRecorder {
    pub fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            descriptor: PluginDescriptor::new(format!("test.{name}"), name).with_audio(1, 1),
            log: Arc::clone(log),
        }
    }
}

impl Plugin for OrderRecorder {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn initialize(&mut self, _sample_rate: f64, _max_block_size: usize) -> PluginResult<()> {
        Ok(())
    }

    fn process(
        &mut self,
        buffers: &mut ProcessBuffers<'_>,
        _info: &ProcessInfo,
    ) -> PluginResult<()> {
        self.log.lock().unwrap().push(self.descriptor.name.clone());
        buffers.audio_out.copy_from(buffers.audio_in, buffers.audio_in.capacity());
        Ok(())
    }
}

/// Forwards its MIDI input unchanged
pub struct MidiThru {
    descriptor: PluginDescriptor,
}

impl MidiThru {
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new("test.thru", "Thru").with_midi(true, true),
        }
    }
}

impl Plugin for MidiThru {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn initialize(&mut self, _sample_rate: f64, _max_block_size: usize) -> PluginResult<()> {
        Ok(())
    }

    fn process(
        &mut self,
        buffers: &mut ProcessBuffers<'_>,
        _info: &ProcessInfo,
    ) -> PluginResult<()> {
        buffers.midi_out.merge(buffers.midi_in);
        Ok(())
    }
}

/// Project plus a started engine: 480 TPQN, 120 BPM, 48 kHz (one tick = 50 samples)
pub fn started_project() -> (Project, Engine) {
    let (project, mut engine) = Project::new(EngineConfig::default()).unwrap();
    engine.start_processing(SAMPLE_RATE, BLOCK_SIZE, 0, 2);
    (project, engine)
}

/// Run one device block into a throwaway stereo output
pub fn run_block(engine: &mut Engine) -> [Vec<f32>; 2] {
    let mut left = vec![0.0f32; BLOCK_SIZE];
    let mut right = vec![0.0f32; BLOCK_SIZE];
    engine.process(BLOCK_SIZE, &[], &mut [&mut left[..], &mut right[..]]);
    [left, right]
}
