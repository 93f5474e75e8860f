//! Cross-track sample ordering and time-based repositioning.

use crate::mp4::{MediaType, Track};
use tracing::debug;

/// Pick the track whose next sample has the smallest decode time in
/// microseconds and advance its cursor. Ties go to the lowest track index.
///
/// Returns `(track, sample)` positions, or `None` once every track is
/// exhausted.
pub fn find_next_sample(tracks: &mut [Track]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, i64)> = None;
    for (i, track) in tracks.iter().enumerate() {
        let Some(dts) = track.dts_us(track.cursor) else {
            continue;
        };
        if best.map_or(true, |(_, best_dts)| dts < best_dts) {
            best = Some((i, dts));
        }
    }

    let (track_index, _) = best?;
    let track = &mut tracks[track_index];
    let sample = track.cursor;
    track.cursor += 1;
    Some((track_index, sample))
}

/// Index of the entry whose decode time is closest to `target_us`.
/// With `sync_only`, only sync samples are candidates. The first of several
/// equally close entries wins.
pub fn closest_sample(track: &Track, target_us: i64, sync_only: bool) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (i, entry) in track.samples().iter().enumerate() {
        if sync_only && !entry.is_sync() {
            continue;
        }
        let diff = track.to_micros(entry.timestamp).abs_diff(target_us);
        if best.map_or(true, |(_, best_diff)| diff < best_diff) {
            best = Some((i, diff));
        }
    }
    best.map(|(i, _)| i)
}

/// Where a seek left the first video and first audio tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeekOutcome {
    /// `(track, sample)` for the video track, if one was repositioned.
    pub video: Option<(usize, usize)>,
    /// `(track, sample)` for the audio track, if one was repositioned.
    pub audio: Option<(usize, usize)>,
    /// Decode time the audio search aimed at.
    pub audio_target_us: i64,
}

/// Move the cursors of the first video and first audio track to the
/// samples closest to `target_us`. Video lands on a sync sample unless
/// every sample is one; audio follows the time video actually landed on.
/// Other tracks keep their cursors.
pub fn seek_tracks(tracks: &mut [Track], target_us: i64) -> SeekOutcome {
    let video = tracks.iter().position(|t| t.media_type == MediaType::Video);
    let audio = tracks.iter().position(|t| t.media_type == MediaType::Audio);
    let mut outcome = SeekOutcome {
        audio_target_us: target_us,
        ..Default::default()
    };

    if let Some(v) = video {
        let track = &mut tracks[v];
        let sync_only = !track.is_intra_only();
        if let Some(sample) = closest_sample(track, target_us, sync_only) {
            track.cursor = sample;
            outcome.video = Some((v, sample));
            if let Some(landed) = track.dts_us(sample) {
                outcome.audio_target_us = landed;
            }
            debug!(track = v, sample, sync_only, "video seek");
        }
    }

    if let Some(a) = audio {
        let track = &mut tracks[a];
        if let Some(sample) = closest_sample(track, outcome.audio_target_us, false) {
            track.cursor = sample;
            outcome.audio = Some((a, sample));
            debug!(track = a, sample, target = outcome.audio_target_us, "audio seek");
        }
    }

    outcome
}
