//! Offline render
//!
//! Drives the engine without an audio device: a looped arpeggio played by a
//! small sine instrument, rendered block by block into memory.
//!
//! Usage: `offline_render [config.ron] [seconds]`
//! Log level via `RUST_LOG` (e.g. `RUST_LOG=mymusic_core=debug`).

use mymusic_core::audio::endpoint::MidiSource;
use mymusic_core::{
    AudioDeviceCallback, EngineConfig, MidiEvent, MusicalTimeService, Note, Plugin,
    PluginDescriptor, PluginResult, ProcessBuffers, ProcessInfo, Project,
};
use tracing_subscriber::EnvFilter;

const SAMPLE_RATE: f64 = 48_000.0;
const BLOCK_SIZE: usize = 512;
const VOICES: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
struct Voice {
    pitch: u8,
    amplitude: f32,
    phase: f32,
    active: bool,
}

/// Minimal polyphonic sine instrument
struct SineInstrument {
    descriptor: PluginDescriptor,
    voices: [Voice; VOICES],
    sample_rate: f32,
    mono: Vec<f32>,
}

impl SineInstrument {
    fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new("mymusic.sine", "Sine")
                .with_vendor("MyMusic")
                .with_audio(0, 2)
                .with_midi(true, false),
            voices: [Voice::default(); VOICES],
            sample_rate: SAMPLE_RATE as f32,
            mono: Vec::new(),
        }
    }

    fn handle(&mut self, event: &MidiEvent) {
        match *event {
            MidiEvent::NoteOn { note, velocity, .. } if velocity > 0 => {
                let slot = self
                    .voices
                    .iter()
                    .position(|v| !v.active)
                    .unwrap_or(0);
                self.voices[slot] = Voice {
                    pitch: note,
                    amplitude: velocity as f32 / 127.0 * 0.2,
                    phase: 0.0,
                    active: true,
                };
            }
            MidiEvent::NoteOn { note, .. } | MidiEvent::NoteOff { note, .. } => {
                for voice in self.voices.iter_mut().filter(|v| v.pitch == note) {
                    voice.active = false;
                }
            }
            MidiEvent::AllNotesOff => {
                for voice in &mut self.voices {
                    voice.active = false;
                }
            }
            _ => {}
        }
    }

    fn render(&mut self, out: &mut [f32]) {
        for voice in self.voices.iter_mut().filter(|v| v.active) {
            let frequency = 440.0 * 2f32.powf((voice.pitch as f32 - 69.0) / 12.0);
            let step = frequency / self.sample_rate;
            for sample in out.iter_mut() {
                *sample += (voice.phase * std::f32::consts::TAU).sin() * voice.amplitude;
                voice.phase = (voice.phase + step).fract();
            }
        }
    }
}

impl Plugin for SineInstrument {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn initialize(&mut self, sample_rate: f64, max_block_size: usize) -> PluginResult<()> {
        self.sample_rate = sample_rate as f32;
        self.mono = vec![0.0; max_block_size];
        self.voices = [Voice::default(); VOICES];
        Ok(())
    }

    fn process(
        &mut self,
        buffers: &mut ProcessBuffers<'_>,
        info: &ProcessInfo,
    ) -> PluginResult<()> {
        let frames = info.block_size.min(self.mono.len());
        let mut mono = std::mem::take(&mut self.mono);
        mono[..frames].fill(0.0);

        // Render up to each event, then apply it
        let mut rendered = 0;
        for event in buffers.midi_in {
            let at = (event.sample_offset as usize).clamp(rendered, frames);
            self.render(&mut mono[rendered..at]);
            rendered = at;
            self.handle(&event.event);
        }
        self.render(&mut mono[rendered..frames]);

        for channel in 0..buffers.audio_out.num_channels() {
            buffers.audio_out.add_to_channel(channel, &mono[..frames]);
        }
        self.mono = mono;
        Ok(())
    }

    fn reset(&mut self) -> PluginResult<()> {
        self.voices = [Voice::default(); VOICES];
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let seconds: f64 = match args.next() {
        Some(value) => value.parse()?,
        None => 4.0,
    };

    println!("🎵 MyMusic Core - Offline Render");

    let (mut project, mut engine) = Project::new(config)?;
    let tpqn = project.config().tpqn;

    // Sequencer -> sine -> stereo out
    let sequencer = project.add_midi_input(MidiSource::Sequencer);
    let sine = project.add_plugin(Box::new(SineInstrument::new()));
    let output = project.add_audio_output("Main", 0, 2);
    project.graph_mut().connect_midi(sequencer, sine)?;
    project.graph_mut().connect_audio(sine, 0, output, 0)?;
    project.graph_mut().connect_audio(sine, 1, output, 1)?;

    // One bar of eighth-note arpeggio, looped
    let index = project.add_sequence("Arpeggio", None)?;
    project.edit_sequence(index, |sequence| {
        for (step, pitch) in [60u8, 64, 67, 72, 67, 64, 60, 55].iter().enumerate() {
            let position = step as i64 * tpqn / 2;
            sequence.add_note(Note::new(position, tpqn / 2 - 10, *pitch, 100));
        }
    })?;

    let transporter = project.transporter();
    transporter.set_loop_region(0, tpqn * 4);
    transporter.set_loop_enabled(true);

    engine.start_processing(SAMPLE_RATE, BLOCK_SIZE, 0, 2);
    transporter.play();

    let total_frames = (seconds * SAMPLE_RATE) as usize;
    let mut left = vec![0.0f32; BLOCK_SIZE];
    let mut right = vec![0.0f32; BLOCK_SIZE];
    let mut peak = 0.0f32;
    let mut rendered = 0;

    while rendered < total_frames {
        let frames = BLOCK_SIZE.min(total_frames - rendered);
        let mut outputs = [&mut left[..], &mut right[..]];
        engine.process(frames, &[], &mut outputs);
        peak = left[..frames]
            .iter()
            .chain(&right[..frames])
            .fold(peak, |p, s| p.max(s.abs()));
        rendered += frames;
    }

    transporter.stop();
    engine.process(BLOCK_SIZE, &[], &mut [&mut left[..], &mut right[..]]);
    engine.stop_processing();

    let position = transporter.position();
    println!("✅ Rendered {:.2}s ({} frames)", seconds, rendered);
    println!("   peak level: {:.3}", peak);
    println!(
        "   playhead: tick {:.1} ({})",
        position,
        project.tick_to_mbt(position as i64)
    );
    println!(
        "   sounding after stop: {}",
        project.get_playing_sequence_notes().len()
    );

    Ok(())
}
