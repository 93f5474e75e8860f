//! MP4 sample tables and the dense sample index built from them.
//!
//! Raw tables, one per atom:
//! - stts: sample duration runs (decoding time)
//! - stss: sync sample list (keyframes)
//! - stsc: chunk-to-sample runs
//! - stsz/stz2: sample sizes
//! - stco/co64: chunk offsets
//! - ctts: composition time offset runs (for B-frames)
//!
//! [`SampleTableBuilder`] owns them until [`SampleTableBuilder::build`]
//! resolves every sample into an [`IndexEntry`].

use super::MediaType;
use tracing::{debug, error, warn};

/// Largest byte size accepted for one uncompressed-audio index entry.
const MAX_AUDIO_ENTRY_SIZE: u64 = 0x3FFF_FFFF;

/// Raw samples batched per index entry for uncompressed audio.
const AUDIO_BATCH_SAMPLES: u32 = 1024;

/// One resolved sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// File offset where sample data starts.
    pub file_offset: u64,
    /// Decode timestamp in media timescale.
    pub timestamp: i64,
    /// Sample size in bytes.
    pub size: u32,
    /// Samples since the last sync sample; 0 on a sync sample.
    pub min_distance: u32,
}

impl IndexEntry {
    pub fn is_sync(&self) -> bool {
        self.min_distance == 0
    }
}

/// One `stts` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationRun {
    pub count: u32,
    pub duration: i32,
}

/// One `stsc` row. Chunk numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRun {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub description_id: u32,
}

/// One `ctts` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositionRun {
    pub count: u32,
    pub offset: i32,
}

/// Track properties the index build depends on, taken from the sample
/// description.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexParams {
    pub media_type: MediaType,
    /// Bytes per raw audio sample across all channels; 0 when unknown.
    pub sample_size: u32,
    pub samples_per_frame: u32,
    pub bytes_per_frame: u32,
}

/// Dense per-track sample index.
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    /// All resolved samples in decode order.
    pub entries: Vec<IndexEntry>,
    /// Per-sample composition offsets; empty when the track has no `ctts`.
    pub composition_offsets: Vec<i32>,
    /// Bias added to every presentation timestamp.
    pub dts_shift: i64,
}

impl SampleTable {
    /// Create a new sample table builder.
    pub fn builder() -> SampleTableBuilder {
        SampleTableBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get sample by index.
    pub fn get(&self, index: usize) -> Option<&IndexEntry> {
        self.entries.get(index)
    }

    /// Iterate over all samples.
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    /// Positions of all sync samples.
    pub fn sync_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_sync())
            .map(|(i, _)| i)
    }

    pub fn has_composition_offsets(&self) -> bool {
        !self.composition_offsets.is_empty()
    }

    /// Presentation timestamp of a sample in media timescale.
    pub fn presentation_timestamp(&self, index: usize) -> Option<i64> {
        let entry = self.entries.get(index)?;
        if !self.has_composition_offsets() {
            return Some(entry.timestamp);
        }
        let offset = self.composition_offsets.get(index).copied().unwrap_or(0);
        Some(entry.timestamp + self.dts_shift + offset as i64)
    }
}

/// Raw tables of one track, collected while walking its `stbl`.
///
/// Each setter replaces the previous table and reports whether one was
/// already present, so the caller can warn about duplicate atoms.
#[derive(Debug, Clone, Default)]
pub struct SampleTableBuilder {
    durations: Vec<DurationRun>,
    chunk_runs: Vec<ChunkRun>,
    // stsz: when non-zero every sample has this size and `sample_sizes` is empty
    fixed_sample_size: u32,
    sample_sizes: Vec<u32>,
    sample_count: u32,
    chunk_offsets: Vec<u64>,
    composition: Vec<CompositionRun>,
    dts_shift: i64,
    sync_samples: Vec<u32>,
}

impl SampleTableBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set stts (decoding time to sample) entries.
    pub fn set_durations(&mut self, runs: Vec<DurationRun>) -> bool {
        let replaced = !self.durations.is_empty();
        self.durations = runs;
        replaced
    }

    /// Set stsc (sample to chunk) entries, repairing invalid rows.
    pub fn set_chunk_runs(&mut self, mut runs: Vec<ChunkRun>) -> bool {
        let replaced = !self.chunk_runs.is_empty();
        repair_chunk_runs(&mut runs);
        self.chunk_runs = runs;
        replaced
    }

    /// Set a uniform sample size shared by `count` samples.
    pub fn set_fixed_sample_size(&mut self, size: u32, count: u32) -> bool {
        let replaced = self.sample_count != 0;
        self.fixed_sample_size = size;
        self.sample_sizes = Vec::new();
        self.sample_count = count;
        replaced
    }

    /// Set per-sample sizes.
    pub fn set_sample_sizes(&mut self, sizes: Vec<u32>) -> bool {
        let replaced = self.sample_count != 0;
        self.fixed_sample_size = 0;
        self.sample_count = sizes.len() as u32;
        self.sample_sizes = sizes;
        replaced
    }

    /// Set chunk offsets (from stco or co64).
    pub fn set_chunk_offsets(&mut self, offsets: Vec<u64>) -> bool {
        let replaced = !self.chunk_offsets.is_empty();
        self.chunk_offsets = offsets;
        replaced
    }

    /// Set ctts (composition time to sample) entries and the dts shift
    /// derived from them.
    pub fn set_composition(&mut self, runs: Vec<CompositionRun>, dts_shift: i64) -> bool {
        let replaced = !self.composition.is_empty();
        self.composition = runs;
        self.dts_shift = dts_shift;
        replaced
    }

    /// Set stss (sync sample) entries.
    pub fn set_sync_samples(&mut self, samples: Vec<u32>) -> bool {
        let replaced = !self.sync_samples.is_empty();
        self.sync_samples = samples;
        replaced
    }

    pub fn durations(&self) -> &[DurationRun] {
        &self.durations
    }

    pub fn chunk_runs(&self) -> &[ChunkRun] {
        &self.chunk_runs
    }

    /// Sample count declared by the size table.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn fixed_sample_size(&self) -> u32 {
        self.fixed_sample_size
    }

    pub fn dts_shift(&self) -> i64 {
        self.dts_shift
    }

    /// Sum of all declared sample durations.
    pub fn total_duration(&self) -> i64 {
        self.durations
            .iter()
            .map(|run| run.count as i64 * run.duration as i64)
            .sum()
    }

    /// Whether the track takes the uncompressed-audio path: one duration run
    /// whose unit is a single raw audio sample.
    pub fn is_uncompressed_audio(&self, media_type: MediaType) -> bool {
        media_type.is_audio() && self.durations.len() == 1 && self.durations[0].duration == 1
    }

    /// Build the dense index. Missing or inconsistent tables produce an
    /// empty table rather than an error.
    pub fn build(self, params: &IndexParams) -> SampleTable {
        let table = if self.is_uncompressed_audio(params.media_type) {
            self.build_uncompressed_audio(params)
        } else {
            self.build_general(params)
        };
        table.unwrap_or_default()
    }

    fn build_general(&self, params: &IndexParams) -> Option<SampleTable> {
        let sample_count = self.sample_count as usize;
        if sample_count == 0
            || self.chunk_offsets.is_empty()
            || self.chunk_runs.is_empty()
            || self.durations.is_empty()
        {
            debug!(
                samples = sample_count,
                chunks = self.chunk_offsets.len(),
                "not enough sample table data to build an index"
            );
            return None;
        }

        let mut entries = Vec::new();
        if entries.try_reserve_exact(sample_count).is_err() {
            error!(samples = sample_count, "cannot allocate sample index");
            return None;
        }
        let composition_offsets = self.expand_composition(sample_count)?;

        // stss is 1-based; tolerate writers that number from zero
        let key_off = u64::from(self.sync_samples.first().is_some_and(|&k| k > 0));
        let mut fixed_size = self.fixed_sample_size;
        let mut stsc_index = 0usize;
        let mut stts_index = 0usize;
        let mut stts_sample = 0u32;
        let mut stss_index = 0usize;
        let mut distance = 0u32;
        let mut current_dts = 0i64;
        let mut last_dts = 0i64;
        let mut dts_correction = 0i64;
        let mut warned_run = None;

        'chunks: for (chunk_idx, &chunk_offset) in self.chunk_offsets.iter().enumerate() {
            let chunk_number = chunk_idx as u64 + 1;
            while stsc_index + 1 < self.chunk_runs.len()
                && chunk_number == self.chunk_runs[stsc_index + 1].first_chunk as u64
            {
                stsc_index += 1;
            }
            let per_chunk = self.chunk_runs[stsc_index].samples_per_chunk;

            if let Some(&next_offset) = self.chunk_offsets.get(chunk_idx + 1) {
                if next_offset > chunk_offset
                    && params.sample_size > 0
                    && params.sample_size < fixed_size
                    && per_chunk as u64 * fixed_size as u64 > next_offset - chunk_offset
                {
                    warn!(
                        declared = fixed_size,
                        computed = params.sample_size,
                        "fixed sample size overflows its chunk, using computed size"
                    );
                    fixed_size = params.sample_size;
                }
            }
            if fixed_size > 0 && fixed_size < params.sample_size {
                warn!(
                    declared = fixed_size,
                    computed = params.sample_size,
                    "fixed sample size too small, using computed size"
                );
                fixed_size = params.sample_size;
            }

            let mut offset = chunk_offset;
            for j in 0..per_chunk {
                let current_sample = entries.len();
                if current_sample >= sample_count {
                    warn!(
                        samples = sample_count,
                        chunk = chunk_number,
                        "chunk table describes more samples than the size table"
                    );
                    break 'chunks;
                }

                let mut keyframe = false;
                if self.sync_samples.is_empty()
                    || current_sample as u64 + key_off
                        == self.sync_samples[stss_index] as u64
                {
                    keyframe = true;
                    if stss_index + 1 < self.sync_samples.len() {
                        stss_index += 1;
                    }
                }
                if params.media_type.is_audio() || (chunk_idx == 0 && j == 0) {
                    keyframe = true;
                }
                if keyframe {
                    distance = 0;
                }

                let size = if fixed_size > 0 {
                    fixed_size
                } else {
                    self.sample_sizes.get(current_sample).copied().unwrap_or(0)
                };
                entries.push(IndexEntry {
                    file_offset: offset,
                    timestamp: current_dts,
                    size,
                    min_distance: distance,
                });
                offset = match offset.checked_add(size as u64) {
                    Some(next) => next,
                    None => {
                        error!(chunk = chunk_number, offset, size, "sample offset overflows");
                        return None;
                    }
                };

                let run = self.durations[stts_index];
                let mut delta = run.duration as i64;
                if delta <= 0 {
                    if warned_run != Some(stts_index) {
                        warn!(delta, run = stts_index, "invalid sample delta in stts, clamping to 1");
                        warned_run = Some(stts_index);
                    }
                    dts_correction += delta - 1;
                    delta = 1;
                }

                current_dts += delta;
                if dts_correction == 0 || current_dts + dts_correction > last_dts {
                    current_dts += dts_correction;
                    dts_correction = 0;
                } else {
                    // absorb the correction without going backwards
                    dts_correction += current_dts - last_dts - 1;
                    current_dts = last_dts + 1;
                }
                last_dts = current_dts;

                distance += 1;
                stts_sample += 1;
                if stts_index + 1 < self.durations.len() && stts_sample == run.count {
                    stts_sample = 0;
                    stts_index += 1;
                }
            }
        }

        if entries.len() < sample_count {
            warn!(
                declared = sample_count,
                indexed = entries.len(),
                "chunk table describes fewer samples than the size table"
            );
        }

        let mut composition_offsets = composition_offsets;
        composition_offsets.truncate(entries.len());

        Some(SampleTable {
            entries,
            composition_offsets,
            dts_shift: self.dts_shift,
        })
    }

    /// One composition offset per sample, padded with zero.
    fn expand_composition(&self, sample_count: usize) -> Option<Vec<i32>> {
        if self.composition.is_empty() {
            return Some(Vec::new());
        }

        let mut offsets = Vec::new();
        if offsets.try_reserve_exact(sample_count).is_err() {
            error!(samples = sample_count, "cannot allocate composition offsets");
            return None;
        }
        'runs: for run in &self.composition {
            for _ in 0..run.count {
                if offsets.len() >= sample_count {
                    break 'runs;
                }
                offsets.push(run.offset);
            }
        }
        offsets.resize(sample_count, 0);
        Some(offsets)
    }

    fn build_uncompressed_audio(&self, params: &IndexParams) -> Option<SampleTable> {
        if self.chunk_offsets.is_empty() || self.chunk_runs.is_empty() {
            return None;
        }

        let spf = params.samples_per_frame;
        if spf > 1 && params.bytes_per_frame == 0 {
            error!(samples_per_frame = spf, "audio frame size missing");
            return None;
        }
        let batch = audio_batch_samples(spf);

        let mut total = 0u64;
        for (i, run) in self.chunk_runs.iter().enumerate() {
            let chunk_samples = run.samples_per_chunk;
            let is_last = i + 1 == self.chunk_runs.len();
            if !is_last && spf > 0 && chunk_samples % spf != 0 {
                error!(
                    samples = chunk_samples,
                    samples_per_frame = spf,
                    "unaligned audio chunk"
                );
                return None;
            }

            let per_chunk = (chunk_samples as u64).div_ceil(batch as u64);
            let chunk_count = if is_last {
                (self.chunk_offsets.len() as u64).saturating_sub(run.first_chunk as u64 - 1)
            } else {
                (self.chunk_runs[i + 1].first_chunk - run.first_chunk) as u64
            };
            total += chunk_count * per_chunk;
        }
        debug!(entries = total, "uncompressed audio index size");

        let mut entries = Vec::new();
        if entries.try_reserve_exact(total as usize).is_err() {
            error!(entries = total, "cannot allocate sample index");
            return None;
        }

        let mut stsc_index = 0usize;
        let mut current_dts = 0i64;
        for (chunk_idx, &chunk_offset) in self.chunk_offsets.iter().enumerate() {
            let chunk_number = chunk_idx as u64 + 1;
            while stsc_index + 1 < self.chunk_runs.len()
                && chunk_number == self.chunk_runs[stsc_index + 1].first_chunk as u64
            {
                stsc_index += 1;
            }

            let mut remaining = self.chunk_runs[stsc_index].samples_per_chunk as u64;
            let mut offset = chunk_offset;
            while remaining > 0 {
                let samples = (batch as u64).min(remaining);
                let size = if spf > 1 {
                    samples.div_ceil(spf as u64) * params.bytes_per_frame as u64
                } else {
                    samples * params.sample_size as u64
                };

                if entries.len() as u64 >= total {
                    error!(entries = total, "audio chunk layout exceeds computed entry count");
                    return None;
                }
                if size > MAX_AUDIO_ENTRY_SIZE {
                    error!(size, "audio sample batch too large");
                    return None;
                }

                entries.push(IndexEntry {
                    file_offset: offset,
                    timestamp: current_dts,
                    size: size as u32,
                    min_distance: 0,
                });
                offset = match offset.checked_add(size) {
                    Some(next) => next,
                    None => {
                        error!(chunk = chunk_number, offset, size, "audio batch offset overflows");
                        return None;
                    }
                };
                current_dts += samples as i64;
                remaining -= samples;
            }
        }

        Some(SampleTable {
            entries,
            composition_offsets: Vec::new(),
            dts_shift: 0,
        })
    }
}

/// Raw audio samples grouped into one index entry.
fn audio_batch_samples(samples_per_frame: u32) -> u32 {
    if samples_per_frame >= 160 {
        samples_per_frame
    } else if samples_per_frame > 1 {
        (AUDIO_BATCH_SAMPLES / samples_per_frame) * samples_per_frame
    } else {
        AUDIO_BATCH_SAMPLES
    }
}

/// Make `first_chunk` strictly increasing and every count and description
/// id at least 1. Rows are checked from last to first; an invalid row takes
/// over its successor's values, an invalid last row is clamped, and an empty
/// trailing row is dropped.
fn repair_chunk_runs(runs: &mut Vec<ChunkRun>) {
    let mut i = runs.len();
    while i > 0 {
        i -= 1;
        let len = runs.len();
        let first_min = i as u32 + 1;
        let run = runs[i];
        let invalid = (i + 1 < len && run.first_chunk >= runs[i + 1].first_chunk)
            || (i > 0 && run.first_chunk <= runs[i - 1].first_chunk)
            || run.first_chunk < first_min
            || run.samples_per_chunk < 1
            || run.description_id < 1;
        if !invalid {
            continue;
        }

        warn!(
            entry = i,
            first = run.first_chunk,
            count = run.samples_per_chunk,
            id = run.description_id,
            "stsc entry is invalid"
        );

        if i + 1 >= len {
            if run.samples_per_chunk == 0 && i > 0 {
                runs.pop();
                continue;
            }
            let mut first = run.first_chunk.max(first_min);
            if i > 0 && first <= runs[i - 1].first_chunk {
                first = runs[i - 1].first_chunk.saturating_add(1).min(i32::MAX as u32);
            }
            runs[i] = ChunkRun {
                first_chunk: first,
                samples_per_chunk: run.samples_per_chunk.max(1),
                description_id: run.description_id.max(1),
            };
            continue;
        }

        let next = runs[i + 1];
        runs[i] = ChunkRun {
            first_chunk: next.first_chunk.saturating_sub(1),
            samples_per_chunk: next.samples_per_chunk,
            description_id: next.description_id,
        };
    }
}
