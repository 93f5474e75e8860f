//! Synthetic MOV/MP4 files for tests and benchmarks.
//!
//! [`MovieBuilder`] lays out `ftyp`, `moov` and `mdat` and patches the chunk
//! offset tables so they point at the chunk data written into `mdat`.

use crate::mp4::MediaType;
use bytes::{BufMut, BytesMut};
use std::io;
use std::path::Path;

/// Write an atom, back-patching its size once `body` has run.
pub fn write_atom(buf: &mut BytesMut, tag: &[u8; 4], body: impl FnOnce(&mut BytesMut)) {
    let start = buf.len();
    buf.put_u32(0); // placeholder size
    buf.put_slice(tag);
    body(buf);
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

/// Write a full atom (version + flags header).
pub fn write_full_atom(
    buf: &mut BytesMut,
    tag: &[u8; 4],
    version: u8,
    flags: u32,
    body: impl FnOnce(&mut BytesMut),
) {
    write_atom(buf, tag, |b| {
        b.put_u8(version);
        b.put_uint(flags as u64, 3);
        body(b);
    });
}

/// `levels` nested atoms of type `tag` around a small zeroed payload.
pub fn nested_atoms(tag: &[u8; 4], levels: usize) -> Vec<u8> {
    fn nest(buf: &mut BytesMut, tag: &[u8; 4], levels: usize) {
        if levels == 0 {
            buf.put_bytes(0, 4);
            return;
        }
        write_atom(buf, tag, |b| nest(b, tag, levels - 1));
    }

    let mut buf = BytesMut::new();
    nest(&mut buf, tag, levels);
    buf.to_vec()
}

#[derive(Debug, Clone)]
enum SampleSizes {
    Fixed { size: u32, count: u32 },
    Each(Vec<u32>),
    Compact { field_size: u8, sizes: Vec<u32> },
}

/// One track of a synthetic movie.
#[derive(Debug, Clone)]
pub struct FixtureTrack {
    media_type: MediaType,
    handler: [u8; 4],
    format: [u8; 4],
    time_scale: u32,
    width: u16,
    height: u16,
    channels: u16,
    bits_per_sample: u16,
    sample_rate: u32,
    durations: Vec<(u32, i32)>,
    chunk_runs: Vec<(u32, u32, u32)>,
    sizes: SampleSizes,
    sync_samples: Option<Vec<u32>>,
    composition: Option<Vec<(u32, i32)>>,
    codec_config: Option<([u8; 4], Vec<u8>)>,
    esds: Option<(u8, Vec<u8>)>,
    wide_offsets: bool,
    chunks: Vec<Vec<u8>>,
    extra_stbl: Vec<u8>,
    extra_mdia: Vec<u8>,
}

impl FixtureTrack {
    fn new(media_type: MediaType, handler: [u8; 4], format: [u8; 4], time_scale: u32) -> Self {
        Self {
            media_type,
            handler,
            format,
            time_scale,
            width: 0,
            height: 0,
            channels: 0,
            bits_per_sample: 0,
            sample_rate: 0,
            durations: Vec::new(),
            chunk_runs: Vec::new(),
            sizes: SampleSizes::Each(Vec::new()),
            sync_samples: None,
            composition: None,
            codec_config: None,
            esds: None,
            wide_offsets: false,
            chunks: Vec::new(),
            extra_stbl: Vec::new(),
            extra_mdia: Vec::new(),
        }
    }

    /// Video track with the given sample-description format.
    pub fn video(format: &[u8; 4], time_scale: u32) -> Self {
        let mut track = Self::new(MediaType::Video, *b"vide", *format, time_scale);
        track.width = 320;
        track.height = 240;
        track
    }

    /// Audio track with the given sample-description format.
    pub fn audio(format: &[u8; 4], time_scale: u32) -> Self {
        let mut track = Self::new(MediaType::Audio, *b"soun", *format, time_scale);
        track.channels = 2;
        track.bits_per_sample = 16;
        track.sample_rate = time_scale;
        track
    }

    /// Track with a handler the demuxer does not map (e.g. `hint`, `text`).
    pub fn other(handler: &[u8; 4], format: &[u8; 4], time_scale: u32) -> Self {
        Self::new(MediaType::Other, *handler, *format, time_scale)
    }

    /// `count` samples of `size` bytes in a single chunk, each lasting
    /// `delta`, filled with `fill`.
    pub fn uniform(mut self, count: u32, size: u32, delta: i32, fill: u8) -> Self {
        self.durations = vec![(count, delta)];
        self.chunk_runs = vec![(1, count, 1)];
        self.sizes = SampleSizes::Fixed { size, count };
        self.chunks = vec![vec![fill; (count * size) as usize]];
        self
    }

    pub fn dimensions(mut self, width: u16, height: u16) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn audio_format(mut self, channels: u16, bits_per_sample: u16, sample_rate: u32) -> Self {
        self.channels = channels;
        self.bits_per_sample = bits_per_sample;
        self.sample_rate = sample_rate;
        self
    }

    /// `stts` rows as `(count, delta)`.
    pub fn durations(mut self, runs: Vec<(u32, i32)>) -> Self {
        self.durations = runs;
        self
    }

    /// `stsc` rows as `(first_chunk, samples_per_chunk, description_id)`.
    pub fn chunk_runs(mut self, runs: Vec<(u32, u32, u32)>) -> Self {
        self.chunk_runs = runs;
        self
    }

    /// `stsz` with one shared size.
    pub fn fixed_size(mut self, size: u32, count: u32) -> Self {
        self.sizes = SampleSizes::Fixed { size, count };
        self
    }

    /// `stsz` with per-sample sizes.
    pub fn sizes(mut self, sizes: Vec<u32>) -> Self {
        self.sizes = SampleSizes::Each(sizes);
        self
    }

    /// `stz2` with the given field width in bits.
    pub fn compact_sizes(mut self, field_size: u8, sizes: Vec<u32>) -> Self {
        self.sizes = SampleSizes::Compact { field_size, sizes };
        self
    }

    /// `stss` entries (1-based sample numbers).
    pub fn sync_samples(mut self, samples: Vec<u32>) -> Self {
        self.sync_samples = Some(samples);
        self
    }

    /// `ctts` rows as `(count, offset)`.
    pub fn composition(mut self, runs: Vec<(u32, i32)>) -> Self {
        self.composition = Some(runs);
        self
    }

    /// Decoder config atom (`avcC`, `hvcC`, `glbl`) inside the sample entry.
    pub fn codec_config(mut self, tag: &[u8; 4], data: Vec<u8>) -> Self {
        self.codec_config = Some((*tag, data));
        self
    }

    /// `esds` inside the sample entry.
    pub fn esds(mut self, object_type: u8, decoder_specific: Vec<u8>) -> Self {
        self.esds = Some((object_type, decoder_specific));
        self
    }

    /// Use `co64` instead of `stco`.
    pub fn wide_offsets(mut self) -> Self {
        self.wide_offsets = true;
        self
    }

    /// Append a chunk of raw sample data.
    pub fn chunk(mut self, data: Vec<u8>) -> Self {
        self.chunks.push(data);
        self
    }

    /// Raw atoms appended to `stbl`.
    pub fn stbl_atom(mut self, atom: Vec<u8>) -> Self {
        self.extra_stbl.extend_from_slice(&atom);
        self
    }

    /// Raw atoms appended to `mdia`.
    pub fn mdia_atom(mut self, atom: Vec<u8>) -> Self {
        self.extra_mdia.extend_from_slice(&atom);
        self
    }

    fn write_trak(&self, buf: &mut BytesMut, track_id: u32, offsets: &[u64]) {
        write_atom(buf, b"trak", |b| {
            self.write_tkhd(b, track_id);
            write_atom(b, b"mdia", |b| {
                write_full_atom(b, b"mdhd", 0, 0, |b| {
                    b.put_u32(0); // creation
                    b.put_u32(0); // modification
                    b.put_u32(self.time_scale);
                    b.put_u32(self.total_duration());
                    b.put_u16(0x55C4); // language: und
                    b.put_u16(0);
                });
                write_full_atom(b, b"hdlr", 0, 0, |b| {
                    b.put_u32(0); // pre-defined
                    b.put_slice(&self.handler);
                    b.put_bytes(0, 12);
                    b.put_u8(0); // empty name
                });
                b.put_slice(&self.extra_mdia);
                write_atom(b, b"minf", |b| {
                    write_atom(b, b"stbl", |b| self.write_stbl(b, offsets));
                });
            });
        });
    }

    fn write_tkhd(&self, buf: &mut BytesMut, track_id: u32) {
        write_full_atom(buf, b"tkhd", 0, 7, |b| {
            b.put_u32(0); // creation
            b.put_u32(0); // modification
            b.put_u32(track_id);
            b.put_u32(0); // reserved
            b.put_u32(0); // duration
            b.put_u64(0); // reserved
            b.put_u16(0); // layer
            b.put_u16(0); // alternate group
            b.put_u16(0); // volume
            b.put_u16(0); // reserved
            for value in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
                b.put_u32(value);
            }
            b.put_u32((self.width as u32) << 16);
            b.put_u32((self.height as u32) << 16);
        });
    }

    fn write_stbl(&self, buf: &mut BytesMut, offsets: &[u64]) {
        write_full_atom(buf, b"stsd", 0, 0, |b| {
            b.put_u32(1);
            self.write_sample_entry(b);
        });

        write_full_atom(buf, b"stts", 0, 0, |b| {
            b.put_u32(self.durations.len() as u32);
            for &(count, delta) in &self.durations {
                b.put_u32(count);
                b.put_i32(delta);
            }
        });

        if let Some(sync) = &self.sync_samples {
            write_full_atom(buf, b"stss", 0, 0, |b| {
                b.put_u32(sync.len() as u32);
                for &sample in sync {
                    b.put_u32(sample);
                }
            });
        }

        if let Some(runs) = &self.composition {
            write_full_atom(buf, b"ctts", 0, 0, |b| {
                b.put_u32(runs.len() as u32);
                for &(count, offset) in runs {
                    b.put_u32(count);
                    b.put_i32(offset);
                }
            });
        }

        write_full_atom(buf, b"stsc", 0, 0, |b| {
            b.put_u32(self.chunk_runs.len() as u32);
            for &(first, count, id) in &self.chunk_runs {
                b.put_u32(first);
                b.put_u32(count);
                b.put_u32(id);
            }
        });

        match &self.sizes {
            SampleSizes::Fixed { size, count } => {
                write_full_atom(buf, b"stsz", 0, 0, |b| {
                    b.put_u32(*size);
                    b.put_u32(*count);
                });
            }
            SampleSizes::Each(sizes) => {
                write_full_atom(buf, b"stsz", 0, 0, |b| {
                    b.put_u32(0);
                    b.put_u32(sizes.len() as u32);
                    for &size in sizes {
                        b.put_u32(size);
                    }
                });
            }
            SampleSizes::Compact { field_size, sizes } => {
                write_full_atom(buf, b"stz2", 0, 0, |b| {
                    b.put_uint(0, 3); // reserved
                    b.put_u8(*field_size);
                    b.put_u32(sizes.len() as u32);
                    match field_size {
                        4 => {
                            for pair in sizes.chunks(2) {
                                let low = pair.get(1).copied().unwrap_or(0);
                                b.put_u8(((pair[0] as u8) << 4) | (low as u8 & 0x0F));
                            }
                        }
                        8 => sizes.iter().for_each(|&s| b.put_u8(s as u8)),
                        16 => sizes.iter().for_each(|&s| b.put_u16(s as u16)),
                        _ => sizes.iter().for_each(|&s| b.put_u32(s)),
                    }
                });
            }
        }

        let tag = if self.wide_offsets { b"co64" } else { b"stco" };
        write_full_atom(buf, tag, 0, 0, |b| {
            b.put_u32(offsets.len() as u32);
            for &offset in offsets {
                if self.wide_offsets {
                    b.put_u64(offset);
                } else {
                    b.put_u32(offset as u32);
                }
            }
        });

        buf.put_slice(&self.extra_stbl);
    }

    fn write_sample_entry(&self, buf: &mut BytesMut) {
        write_atom(buf, &self.format, |b| {
            b.put_bytes(0, 6); // reserved
            b.put_u16(1); // data reference index
            match self.media_type {
                MediaType::Video => {
                    b.put_u16(0); // version
                    b.put_u16(0); // revision
                    b.put_u32(0); // vendor
                    b.put_u32(0); // temporal quality
                    b.put_u32(0); // spatial quality
                    b.put_u16(self.width);
                    b.put_u16(self.height);
                    b.put_u32(0x0048_0000); // 72 dpi
                    b.put_u32(0x0048_0000);
                    b.put_u32(0); // data size
                    b.put_u16(1); // frames per sample
                    b.put_bytes(0, 32); // compressor name
                    b.put_u16(0x18); // depth
                    b.put_i16(-1); // color table id
                }
                MediaType::Audio => {
                    b.put_u16(0); // version
                    b.put_u16(0); // revision
                    b.put_u32(0); // vendor
                    b.put_u16(self.channels);
                    b.put_u16(self.bits_per_sample);
                    b.put_u16(0); // compression id
                    b.put_u16(0); // packet size
                    b.put_u32(self.sample_rate << 16);
                }
                MediaType::Other => {}
            }
            if let Some((tag, data)) = &self.codec_config {
                write_atom(b, tag, |b| b.put_slice(data));
            }
            if let Some((object_type, config)) = &self.esds {
                write_esds(b, *object_type, config);
            }
        });
    }

    fn total_duration(&self) -> u32 {
        self.durations
            .iter()
            .map(|&(count, delta)| count as i64 * delta as i64)
            .sum::<i64>()
            .clamp(0, u32::MAX as i64) as u32
    }
}

fn write_esds(buf: &mut BytesMut, object_type: u8, config: &[u8]) {
    write_full_atom(buf, b"esds", 0, 0, |b| {
        let specific_len = 2 + config.len();
        let decoder_len = 13 + specific_len;
        b.put_u8(0x03);
        b.put_u8((3 + 2 + decoder_len) as u8);
        b.put_u16(1); // ES_ID
        b.put_u8(0); // flags
        b.put_u8(0x04);
        b.put_u8(decoder_len as u8);
        b.put_u8(object_type);
        b.put_u8(0x15); // audio stream
        b.put_uint(0, 3); // buffer size
        b.put_u32(0); // max bitrate
        b.put_u32(0); // avg bitrate
        b.put_u8(0x05);
        b.put_u8(config.len() as u8);
        b.put_slice(config);
    });
}

/// Builder for a complete synthetic movie.
#[derive(Debug, Clone)]
pub struct MovieBuilder {
    brand: [u8; 4],
    time_scale: u32,
    tracks: Vec<FixtureTrack>,
    moov_atoms: Vec<u8>,
    mdat_first: bool,
}

impl Default for MovieBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MovieBuilder {
    pub fn new() -> Self {
        Self {
            brand: *b"isom",
            time_scale: 1000,
            tracks: Vec::new(),
            moov_atoms: Vec::new(),
            mdat_first: false,
        }
    }

    /// Major brand written to `ftyp`; `qt  ` makes a QuickTime file.
    pub fn brand(mut self, brand: &[u8; 4]) -> Self {
        self.brand = *brand;
        self
    }

    pub fn time_scale(mut self, time_scale: u32) -> Self {
        self.time_scale = time_scale;
        self
    }

    pub fn track(mut self, track: FixtureTrack) -> Self {
        self.tracks.push(track);
        self
    }

    /// Raw atoms appended to `moov` after the tracks.
    pub fn moov_atom(mut self, atom: Vec<u8>) -> Self {
        self.moov_atoms.extend_from_slice(&atom);
        self
    }

    /// Place `mdat` before `moov`.
    pub fn mdat_first(mut self) -> Self {
        self.mdat_first = true;
        self
    }

    /// Serialize the movie.
    pub fn build(&self) -> Vec<u8> {
        let ftyp = self.ftyp();

        // stco sizes do not depend on the offsets, so a first pass gives
        // the final moov length
        let placeholder = self.chunk_offsets(0);
        let moov_len = self.moov(&placeholder).len() as u64;

        let mdat_data_start = if self.mdat_first {
            ftyp.len() as u64 + 8
        } else {
            ftyp.len() as u64 + moov_len + 8
        };
        let offsets = self.chunk_offsets(mdat_data_start);
        let moov = self.moov(&offsets);
        let mdat = self.mdat();

        let mut out = BytesMut::with_capacity(ftyp.len() + moov.len() + mdat.len());
        out.put_slice(&ftyp);
        if self.mdat_first {
            out.put_slice(&mdat);
            out.put_slice(&moov);
        } else {
            out.put_slice(&moov);
            out.put_slice(&mdat);
        }
        out.to_vec()
    }

    /// Serialize the movie to a file.
    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        std::fs::write(path, self.build())
    }

    fn ftyp(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        write_atom(&mut buf, b"ftyp", |b| {
            b.put_slice(&self.brand);
            b.put_u32(0x200); // minor version
            b.put_slice(&self.brand);
            b.put_slice(b"mp41");
        });
        buf
    }

    fn moov(&self, offsets: &[Vec<u64>]) -> BytesMut {
        let mut buf = BytesMut::with_capacity(1024);
        write_atom(&mut buf, b"moov", |b| {
            write_full_atom(b, b"mvhd", 0, 0, |b| {
                b.put_u32(0); // creation
                b.put_u32(0); // modification
                b.put_u32(self.time_scale);
                b.put_u32(0); // duration
                b.put_u32(0x0001_0000); // rate
                b.put_u16(0x0100); // volume
                b.put_bytes(0, 10);
                for value in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
                    b.put_u32(value);
                }
                b.put_bytes(0, 24); // pre-defined
                b.put_u32(self.tracks.len() as u32 + 1); // next track id
            });
            for (i, track) in self.tracks.iter().enumerate() {
                track.write_trak(b, i as u32 + 1, &offsets[i]);
            }
            b.put_slice(&self.moov_atoms);
        });
        buf
    }

    /// Chunks are interleaved: chunk 0 of every track, then chunk 1, ...
    fn chunk_layout(&self) -> Vec<(usize, usize)> {
        let max_chunks = self.tracks.iter().map(|t| t.chunks.len()).max().unwrap_or(0);
        let mut layout = Vec::new();
        for chunk in 0..max_chunks {
            for (track, t) in self.tracks.iter().enumerate() {
                if chunk < t.chunks.len() {
                    layout.push((track, chunk));
                }
            }
        }
        layout
    }

    fn chunk_offsets(&self, data_start: u64) -> Vec<Vec<u64>> {
        let mut offsets: Vec<Vec<u64>> = self
            .tracks
            .iter()
            .map(|t| vec![0; t.chunks.len()])
            .collect();
        let mut pos = data_start;
        for (track, chunk) in self.chunk_layout() {
            offsets[track][chunk] = pos;
            pos += self.tracks[track].chunks[chunk].len() as u64;
        }
        offsets
    }

    fn mdat(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        write_atom(&mut buf, b"mdat", |b| {
            for (track, chunk) in self.chunk_layout() {
                b.put_slice(&self.tracks[track].chunks[chunk]);
            }
        });
        buf
    }
}
