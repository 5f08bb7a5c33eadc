use crate::audio::buffer::AudioBuffer;
use crate::audio::process_info::ProcessInfo;
use crate::midi::buffer::MidiEventBuffer;
use crate::midi::event::MidiEventTimed;
use crate::plugin::PluginResult;

/// Static description of a hosted plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    pub vendor: String,
    /// Number of audio input channels
    pub audio_inputs: usize,
    /// Number of audio output channels
    pub audio_outputs: usize,
    pub midi_input: bool,
    pub midi_output: bool,
}

impl PluginDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            vendor: String::new(),
            audio_inputs: 0,
            audio_outputs: 0,
            midi_input: false,
            midi_output: false,
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn with_audio(mut self, inputs: usize, outputs: usize) -> Self {
        self.audio_inputs = inputs;
        self.audio_outputs = outputs;
        self
    }

    pub fn with_midi(mut self, input: bool, output: bool) -> Self {
        self.midi_input = input;
        self.midi_output = output;
        self
    }

    /// Instrument: MIDI in, audio out
    pub fn is_instrument(&self) -> bool {
        self.midi_input && self.audio_inputs == 0 && self.audio_outputs > 0
    }
}

/// Buffers handed to [`Plugin::process`] for one block.
///
/// `audio_out` arrives zeroed and `midi_out` empty; only the first
/// `info.block_size` frames of each channel are meaningful.
pub struct ProcessBuffers<'a> {
    pub audio_in: &'a AudioBuffer,
    pub audio_out: &'a mut AudioBuffer,
    /// Input events ordered by sample offset
    pub midi_in: &'a [MidiEventTimed],
    pub midi_out: &'a mut MidiEventBuffer,
}

/// Core plugin trait that all hosted plugins implement
pub trait Plugin: Send {
    /// Get plugin descriptor
    fn descriptor(&self) -> &PluginDescriptor;

    /// Prepare for processing. Called from the control side before the
    /// first `process`, and again whenever the device configuration changes.
    fn initialize(&mut self, sample_rate: f64, max_block_size: usize) -> PluginResult<()>;

    /// Process one block.
    ///
    /// Runs on the audio thread: no allocation, no blocking, no I/O. An
    /// `Err` silences this plugin's outputs for the block.
    fn process(&mut self, buffers: &mut ProcessBuffers<'_>, info: &ProcessInfo)
    -> PluginResult<()>;

    /// Reset plugin to default state (clear voices, tails...)
    fn reset(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// Get plugin latency in samples
    fn get_latency(&self) -> u32 {
        0
    }

    /// Get tail length in samples (for reverb, delay, etc.)
    fn get_tail(&self) -> u32 {
        0
    }
}
