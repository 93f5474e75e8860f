//! Stream summaries handed to decoder setup code.

use crate::mp4::{CodecId, MediaType, Track};
use bytes::Bytes;

/// Whole-file summary returned by [`Demuxer::media_info`](super::Demuxer::media_info).
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct MediaInfo {
    /// Stream size in bytes.
    pub file_size: u64,
    /// Longest track duration in microseconds.
    pub duration_us: i64,
    pub has_video: bool,
    pub has_audio: bool,
    pub seekable: bool,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
}

/// First video track.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct VideoStreamInfo {
    pub track: usize,
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    #[cfg_attr(feature = "serialize", serde(skip))]
    pub extra_data: Option<Bytes>,
}

/// First audio track.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct AudioStreamInfo {
    pub track: usize,
    pub codec: CodecId,
    pub channels: u32,
    pub bits_per_sample: u32,
    pub sample_rate: u32,
    #[cfg_attr(feature = "serialize", serde(skip))]
    pub extra_data: Option<Bytes>,
}

/// Per-track summary for inspection tools.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct TrackSummary {
    pub index: usize,
    pub id: u32,
    pub media_type: MediaType,
    pub codec: CodecId,
    pub codec_tag: String,
    pub time_scale: u32,
    pub samples: u32,
    pub duration_us: i64,
    pub extra_data_len: usize,
}

impl MediaInfo {
    /// Summarize parsed tracks. Only the first video and first audio track
    /// are described; duration covers every track.
    pub fn from_tracks(tracks: &[Track], file_size: u64) -> Self {
        let mut info = MediaInfo {
            file_size,
            seekable: true,
            ..Default::default()
        };

        for track in tracks {
            match track.media_type {
                MediaType::Video => {
                    info.has_video = true;
                    if info.video.is_none() {
                        info.video = Some(VideoStreamInfo {
                            track: track.index,
                            codec: track.codec,
                            width: track.width,
                            height: track.height,
                            extra_data: track.extra_data.clone(),
                        });
                    }
                }
                MediaType::Audio => {
                    info.has_audio = true;
                    if info.audio.is_none() {
                        info.audio = Some(AudioStreamInfo {
                            track: track.index,
                            codec: track.codec,
                            channels: track.audio.channels,
                            bits_per_sample: track.audio.bits_per_sample,
                            sample_rate: track.audio.sample_rate,
                            extra_data: track.extra_data.clone(),
                        });
                    }
                }
                MediaType::Other => {}
            }
            info.duration_us = info.duration_us.max(track.duration_us());
        }

        info
    }
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        Self {
            index: track.index,
            id: track.id,
            media_type: track.media_type,
            codec: track.codec,
            codec_tag: track
                .codec_tag
                .map(|tag| String::from_utf8_lossy(&tag).into_owned())
                .unwrap_or_default(),
            time_scale: track.time_scale,
            samples: track.sample_count,
            duration_us: track.duration_us(),
            extra_data_len: track.extra_data.as_ref().map_or(0, |d| d.len()),
        }
    }
}
