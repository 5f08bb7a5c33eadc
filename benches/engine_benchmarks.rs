use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use mymusic_core::{
    AudioDeviceCallback, EngineConfig, MeterMap, MidiSource, MusicalTimeService, Note, Plugin,
    PluginDescriptor, PluginResult, ProcessBuffers, ProcessInfo, Project, TempoMap, TimeContext,
    TimeMap,
};
use std::sync::Arc;

/// Copies input to output; enough work to exercise routing
struct PassThrough {
    descriptor: PluginDescriptor,
}

impl PassThrough {
    fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new("bench.thru", "Thru")
                .with_audio(2, 2)
                .with_midi(true, true),
        }
    }
}

impl Plugin for PassThrough {
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
        buffers.audio_out.copy_from(buffers.audio_in, info.block_size);
        buffers.midi_out.merge(buffers.midi_in);
        Ok(())
    }
}

/// Tick <-> sample conversion with many tempo changes (called per note)
fn bench_time_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("time_conversion");

    for points in [1, 16, 256] {
        let mut tempo = TempoMap::new();
        for i in 0..points {
            tempo.insert(i * 480, 60.0 + (i % 120) as f64);
        }
        let time = TimeContext::new(
            Arc::new(TimeMap::new(480, tempo, MeterMap::new())),
            48_000.0,
        );

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_tempo_points", points)),
            &time,
            |b, time| {
                b.iter(|| {
                    for tick in (0..1000).map(|t| t as f64 * 97.0) {
                        let sample = time.tick_to_sample(black_box(tick));
                        black_box(time.sample_to_tick_exact(sample));
                    }
                });
            },
        );
    }
    group.finish();
}

/// Full engine block: sequencer -> chain of plugins -> stereo out
fn bench_engine_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_block");
    let buffer_size = 512;

    for chain_length in [1, 8, 32] {
        let (mut project, mut engine) = Project::new(EngineConfig::default()).unwrap();
        let sequencer = project.add_midi_input(MidiSource::Sequencer);
        let input = project.add_audio_input("In", 0, 2);
        let output = project.add_audio_output("Main", 0, 2);

        let mut previous = input;
        for _ in 0..chain_length {
            let plugin = project.add_plugin(Box::new(PassThrough::new()));
            project.graph_mut().connect_audio(previous, 0, plugin, 0).unwrap();
            project.graph_mut().connect_audio(previous, 1, plugin, 1).unwrap();
            project.graph_mut().connect_midi(sequencer, plugin).unwrap();
            previous = plugin;
        }
        project.graph_mut().connect_audio(previous, 0, output, 0).unwrap();
        project.graph_mut().connect_audio(previous, 1, output, 1).unwrap();

        // Dense sequence: a sixteenth note every 120 ticks over 16 bars
        let index = project.add_sequence("dense", None).unwrap();
        project
            .edit_sequence(index, |sequence| {
                for i in 0..256 {
                    sequence.add_note(Note::new(i * 120, 100, 36 + (i % 48) as u8, 100));
                }
            })
            .unwrap();
        project.transporter().set_loop_region(0, 1920 * 16);
        project.transporter().set_loop_enabled(true);

        engine.start_processing(48_000.0, buffer_size, 2, 2);
        project.transporter().play();

        let source = vec![0.1f32; buffer_size];
        let mut left = vec![0.0f32; buffer_size];
        let mut right = vec![0.0f32; buffer_size];

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_plugins", chain_length)),
            &buffer_size,
            |b, &size| {
                b.iter(|| {
                    engine.process(
                        size,
                        &[&source[..], &source[..]],
                        &mut [&mut left[..], &mut right[..]],
                    );
                    black_box(left[0]);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_time_conversion, bench_engine_block);
criterion_main!(benches);
