//! Per-track state: sample description, raw tables and the built index.

use super::sample_table::{IndexParams, SampleTable, SampleTableBuilder};
use super::{CodecId, MediaType};
use bytes::Bytes;
use tracing::{debug, info};

/// Raw audio layout from an audio sample description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u32,
    pub bits_per_sample: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per compressed frame (QuickTime v1/v2 descriptions).
    pub samples_per_frame: u32,
    /// Bytes per compressed frame (QuickTime v1/v2 descriptions).
    pub bytes_per_frame: u32,
}

/// One `trak` of the movie.
#[derive(Debug, Clone, Default)]
pub struct Track {
    /// Position in the demuxer's track list.
    pub index: usize,
    /// Track id from `tkhd`.
    pub id: u32,
    pub media_type: MediaType,
    pub codec: CodecId,
    /// Format tag of the sample description.
    pub codec_tag: Option<[u8; 4]>,
    /// Media timescale from `mdhd`.
    pub time_scale: u32,
    /// Media duration from `mdhd`, in timescale units.
    pub media_duration: u64,
    pub width: u32,
    pub height: u32,
    /// Video bit depth from the sample description.
    pub depth: u16,
    pub audio: AudioFormat,
    /// Bytes per raw audio sample across all channels; 0 when unknown.
    pub sample_size: u32,
    /// Decoder configuration (avcC, hvcC, glbl or esds payload).
    pub extra_data: Option<Bytes>,
    /// Number of samples in the index.
    pub sample_count: u32,
    /// Raw tables, consumed by [`Track::build_index`].
    pub(crate) tables: SampleTableBuilder,
    pub(crate) media_header_seen: bool,
    pub(crate) samples: SampleTable,
    /// Next sample to hand out.
    pub(crate) cursor: usize,
}

impl Track {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// Resolve the raw tables into the dense index. The raw tables are
    /// released afterwards.
    pub fn build_index(&mut self) {
        let params = IndexParams {
            media_type: self.media_type,
            sample_size: self.sample_size,
            samples_per_frame: self.audio.samples_per_frame,
            bytes_per_frame: self.audio.bytes_per_frame,
        };
        let tables = std::mem::take(&mut self.tables);
        let declared = tables.sample_count();
        let stts_duration = tables.total_duration();
        let uncompressed = tables.is_uncompressed_audio(self.media_type);

        self.samples = tables.build(&params);
        self.sample_count = self.samples.len() as u32;
        self.cursor = 0;

        if stts_duration > 0 {
            self.media_duration = stts_duration as u64;
        }

        debug!(
            track = self.index,
            declared,
            uncompressed,
            "sample index built"
        );
        info!(
            track = self.index,
            media = ?self.media_type,
            codec = %self.codec,
            samples = self.sample_count,
            "track ready"
        );
    }

    /// The built sample index.
    pub fn samples(&self) -> &SampleTable {
        &self.samples
    }

    /// Index of the next sample to be read.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether every sample has been handed out.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.samples.len()
    }

    /// Whether seeking may land on any sample, not only sync samples.
    pub fn is_intra_only(&self) -> bool {
        self.codec.is_intra_only() || self.samples.entries.iter().all(|e| e.is_sync())
    }

    /// Convert a timestamp in this track's timescale to microseconds.
    pub fn to_micros(&self, ts: i64) -> i64 {
        rescale_to_micros(ts, self.time_scale)
    }

    /// Track duration in microseconds.
    pub fn duration_us(&self) -> i64 {
        self.to_micros(self.media_duration.min(i64::MAX as u64) as i64)
    }

    /// Decode timestamp of a sample in microseconds.
    pub fn dts_us(&self, index: usize) -> Option<i64> {
        self.samples
            .get(index)
            .map(|entry| self.to_micros(entry.timestamp))
    }

    /// Presentation timestamp of a sample in microseconds.
    pub fn pts_us(&self, index: usize) -> Option<i64> {
        self.samples
            .presentation_timestamp(index)
            .map(|ts| self.to_micros(ts))
    }
}

/// `ts * 1_000_000 / time_scale`, treating a zero timescale as 1.
pub fn rescale_to_micros(ts: i64, time_scale: u32) -> i64 {
    let scaled = ts as i128 * 1_000_000 / time_scale.max(1) as i128;
    scaled.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::sample_table::{ChunkRun, DurationRun};

    fn video_track() -> Track {
        let mut track = Track::new(0);
        track.media_type = MediaType::Video;
        track.codec = CodecId::H264;
        track.time_scale = 1000;
        track.tables.set_durations(vec![DurationRun {
            count: 4,
            duration: 40,
        }]);
        track.tables.set_chunk_runs(vec![ChunkRun {
            first_chunk: 1,
            samples_per_chunk: 4,
            description_id: 1,
        }]);
        track.tables.set_fixed_sample_size(10, 4);
        track.tables.set_chunk_offsets(vec![64]);
        track
    }

    #[test]
    fn test_rescale() {
        assert_eq!(rescale_to_micros(90_000, 90_000), 1_000_000);
        assert_eq!(rescale_to_micros(1024, 44_100), 23_219);
        assert_eq!(rescale_to_micros(5, 0), 5_000_000);
        assert_eq!(rescale_to_micros(i64::MAX, 1), i64::MAX);
    }

    #[test]
    fn test_build_index() {
        let mut track = video_track();
        track.build_index();

        assert_eq!(track.sample_count, 4);
        assert_eq!(track.media_duration, 160);
        assert_eq!(track.duration_us(), 160_000);
        assert_eq!(track.dts_us(2), Some(80_000));
        assert_eq!(track.pts_us(2), Some(80_000));
        assert!(!track.is_exhausted());
        // no stss: every sample is sync
        assert!(track.is_intra_only());
    }

    #[test]
    fn test_sync_table_disables_intra_only() {
        let mut track = video_track();
        track.tables.set_sync_samples(vec![1, 3]);
        track.build_index();
        assert!(!track.is_intra_only());
    }
}
