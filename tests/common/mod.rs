//! Shared helpers for CLI tests.
//!
//! Writes synthetic movies built with the `movdemux-media` fixture builder
//! into a temporary directory.

use movdemux_media::fixture::{FixtureTrack, MovieBuilder};
use std::path::{Path, PathBuf};

/// Two-second A/V movie: 50 video frames at 25 fps (keyframe every
/// 25 frames) and matching 48 kHz AAC.
pub fn av_movie() -> MovieBuilder {
    MovieBuilder::new()
        .track(
            FixtureTrack::video(b"avc1", 90_000)
                .dimensions(640, 360)
                .uniform(50, 100, 3600, 0x11)
                .sync_samples(vec![1, 26])
                .codec_config(b"avcC", vec![1, 0x64, 0, 0x1F]),
        )
        .track(
            FixtureTrack::audio(b"mp4a", 48_000)
                .uniform(94, 20, 1024, 0x22)
                .esds(0x40, vec![0x11, 0x90]),
        )
}

/// Write `movie` to `dir/name` and return the path.
pub fn write_movie(dir: &Path, name: &str, movie: &MovieBuilder) -> PathBuf {
    let path = dir.join(name);
    movie.write_to(&path).expect("failed to write fixture movie");
    path
}
