//! Header parsing and packet iteration benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use movdemux_media::fixture::{FixtureTrack, MovieBuilder};
use movdemux_media::Demuxer;
use std::io::Cursor;

/// A/V movie with `frames` video samples and matching AAC audio.
fn av_movie(frames: u32) -> Vec<u8> {
    let audio_frames = frames * 48_000 / 1024 / 25;
    let sync: Vec<u32> = (1..=frames).step_by(25).collect();
    MovieBuilder::new()
        .track(
            FixtureTrack::video(b"avc1", 90_000)
                .uniform(frames, 64, 3600, 0)
                .sync_samples(sync)
                .codec_config(b"avcC", vec![1, 0x64, 0, 0x1F]),
        )
        .track(
            FixtureTrack::audio(b"mp4a", 48_000)
                .uniform(audio_frames, 16, 1024, 0)
                .esds(0x40, vec![0x11, 0x90]),
        )
        .build()
}

fn bench_init(c: &mut Criterion) {
    let mut group = c.benchmark_group("init");

    for frames in [250u32, 2500, 25_000] {
        let data = av_movie(frames);
        group.throughput(Throughput::Elements(frames as u64));
        group.bench_with_input(BenchmarkId::from_parameter(frames), &data, |b, data| {
            b.iter(|| {
                let mut demuxer = Demuxer::from_stream(Cursor::new(black_box(data.as_slice())));
                demuxer.init().unwrap();
                demuxer.tracks().len()
            })
        });
    }

    group.finish();
}

fn bench_packets(c: &mut Criterion) {
    let data = av_movie(2500);
    let mut group = c.benchmark_group("packets");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("peek_read_all", |b| {
        b.iter(|| {
            let mut demuxer = Demuxer::from_stream(Cursor::new(data.as_slice()));
            demuxer.init().unwrap();
            let mut bytes = 0usize;
            while demuxer.peek().unwrap().is_some() {
                bytes += demuxer.read().unwrap().data.len();
            }
            black_box(bytes)
        })
    });

    group.bench_function("peek_only", |b| {
        b.iter(|| {
            let mut demuxer = Demuxer::from_stream(Cursor::new(data.as_slice()));
            demuxer.init().unwrap();
            let mut count = 0usize;
            while demuxer.peek().unwrap().is_some() {
                count += 1;
            }
            black_box(count)
        })
    });

    group.finish();
}

fn bench_seek(c: &mut Criterion) {
    let data = av_movie(25_000);
    let mut demuxer = Demuxer::from_stream(Cursor::new(data.as_slice()));
    demuxer.init().unwrap();

    c.bench_function("seek_middle", |b| {
        b.iter(|| demuxer.seek(black_box(500_000_000)).unwrap())
    });
}

criterion_group!(benches, bench_init, bench_packets, bench_seek);
criterion_main!(benches);
