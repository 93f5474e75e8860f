//! Handlers for individual atoms.
//!
//! Each handler starts with the reader at the first payload byte. The walker
//! skips whatever a handler leaves unread.

use super::atoms::{Atom, AtomType};
use super::esds::parse_esds;
use super::sample_table::{ChunkRun, CompositionRun, DurationRun};
use super::track::Track;
use super::walker::HeaderParser;
use super::{CodecId, MediaType};
use crate::stream::MediaStream;
use crate::{Error, Result};
use bytes::Bytes;
use tracing::{debug, info, warn};

/// Upper bound on sample descriptions per `stsd`.
const MAX_STSD_ENTRIES: u32 = 1024;

/// Fail when `entries` rows of `row_size` bytes plus `header` bytes cannot
/// fit in the atom.
fn check_table_size(atom: Atom, entries: u32, row_size: u64, header: u64) -> Result<()> {
    let needed = entries as u64 * row_size + header;
    if needed > atom.size.max(0) as u64 {
        return Err(Error::invalid_mp4(format!(
            "{} declares {} entries, needs {} bytes but atom has {}",
            atom.atom_type, entries, needed, atom.size
        )));
    }
    Ok(())
}

/// Fail when the atom is smaller than the fixed header its handler reads.
fn check_header_size(atom: Atom, needed: u64) -> Result<()> {
    if needed > atom.size.max(0) as u64 {
        return Err(Error::invalid_mp4(format!(
            "{} needs {} bytes but atom has {}",
            atom.atom_type, needed, atom.size
        )));
    }
    Ok(())
}

/// Fixed header length of a full atom, by version.
fn versioned_size(version: u8, v0: u64, v1: u64) -> u64 {
    if version == 1 {
        v1
    } else {
        v0
    }
}

impl<R: MediaStream> HeaderParser<'_, R> {
    pub(crate) fn read_ftyp(&mut self, atom: Atom) -> Result<()> {
        if atom.size < 4 {
            return Ok(());
        }
        let brand = self.reader.read_tag()?;
        self.movie.isom = &brand != b"qt  ";
        debug!(brand = %AtomType(brand), isom = self.movie.isom, "file type");
        Ok(())
    }

    pub(crate) fn read_moov(&mut self, atom: Atom, depth: usize) -> Result<()> {
        if self.movie.found_moov {
            warn!("duplicate moov atom, skipping");
            return Ok(());
        }
        self.walk(atom, None, depth + 1)?;
        self.movie.found_moov = true;
        Ok(())
    }

    pub(crate) fn read_mdat(&mut self, atom: Atom) -> Result<()> {
        if atom.size == 0 {
            return Ok(());
        }
        self.movie.found_mdat = true;
        Ok(())
    }

    pub(crate) fn read_mvhd(&mut self, atom: Atom) -> Result<()> {
        check_header_size(atom, 4)?;
        let version = self.reader.read_u8()?;
        self.reader.read_u24_be()?; // flags
        check_header_size(atom, versioned_size(version, 100, 112))?;

        if version == 1 {
            self.movie.creation_time = self.reader.read_u64_be()?;
            self.movie.modification_time = self.reader.read_u64_be()?;
        } else {
            self.movie.creation_time = self.reader.read_u32_be()? as u64;
            self.movie.modification_time = self.reader.read_u32_be()? as u64;
        }

        let time_scale = self.reader.read_u32_be()? as i32;
        if time_scale <= 0 {
            warn!(time_scale, "invalid movie time scale, using 1");
            self.movie.time_scale = 1;
        } else {
            self.movie.time_scale = time_scale as u32;
        }

        self.movie.duration = if version == 1 {
            self.reader.read_u64_be()?
        } else {
            self.reader.read_u32_be()? as u64
        };

        self.reader.read_u32_be()?; // preferred rate
        self.reader.read_u16_be()?; // preferred volume
        self.reader.skip(10)?; // reserved

        for value in self.movie.matrix.iter_mut() {
            *value = self.reader.read_u32_be()? as i32;
        }
        Ok(())
    }

    pub(crate) fn read_trak(&mut self, atom: Atom, depth: usize) -> Result<()> {
        let mut track = Track::new(self.movie.tracks.len());
        self.walk(atom, Some(&mut track), depth + 1)?;

        if track.time_scale == 0 {
            track.time_scale = self.movie.time_scale;
        }
        track.build_index();
        self.movie.tracks.push(track);
        Ok(())
    }

    pub(crate) fn read_tkhd(&mut self, atom: Atom, track: &mut Track) -> Result<()> {
        check_header_size(atom, 4)?;
        let version = self.reader.read_u8()?;
        self.reader.read_u24_be()?; // flags
        check_header_size(atom, versioned_size(version, 84, 96))?;

        if version == 1 {
            self.reader.skip(16)?; // creation + modification
            track.id = self.reader.read_u32_be()?;
            self.reader.skip(4 + 8)?; // reserved + duration
        } else {
            self.reader.skip(8)?;
            track.id = self.reader.read_u32_be()?;
            self.reader.skip(4 + 4)?;
        }

        // reserved, layer, alternate group, volume, reserved
        self.reader.skip(8 + 2 + 2 + 2 + 2)?;
        // display matrix
        self.reader.skip(36)?;

        track.width = self.reader.read_u32_be()? >> 16;
        track.height = self.reader.read_u32_be()? >> 16;
        Ok(())
    }

    pub(crate) fn read_hdlr(&mut self, atom: Atom, track: &mut Track) -> Result<()> {
        check_header_size(atom, 12)?;
        self.reader.read_u8()?; // version
        self.reader.read_u24_be()?; // flags
        self.reader.read_tag()?; // component type
        let subtype = self.reader.read_tag()?;
        track.media_type = MediaType::from_handler(subtype);
        debug!(track = track.index, handler = %AtomType(subtype), "handler");
        Ok(())
    }

    pub(crate) fn read_mdhd(&mut self, atom: Atom, track: &mut Track) -> Result<()> {
        if track.media_header_seen {
            return Err(Error::DuplicateAtom("mdhd"));
        }
        track.media_header_seen = true;

        check_header_size(atom, 4)?;
        let version = self.reader.read_u8()?;
        self.reader.read_u24_be()?;
        check_header_size(atom, versioned_size(version, 24, 36))?;

        if version == 1 {
            self.reader.skip(16)?;
        } else {
            self.reader.skip(8)?;
        }

        let time_scale = self.reader.read_u32_be()? as i32;
        if time_scale <= 0 {
            warn!(
                track = track.index,
                time_scale,
                fallback = self.movie.time_scale,
                "invalid media time scale, using movie time scale"
            );
            track.time_scale = self.movie.time_scale;
        } else {
            track.time_scale = time_scale as u32;
        }

        track.media_duration = if version == 1 {
            self.reader.read_u64_be()?
        } else {
            self.reader.read_u32_be()? as u64
        };
        Ok(())
    }

    pub(crate) fn read_stsd(&mut self, atom: Atom, track: &mut Track, depth: usize) -> Result<()> {
        self.reader.read_u8()?;
        self.reader.read_u24_be()?;
        let entries = self.reader.read_u32_be()?;

        // each entry holds at least a size and a format
        if entries == 0 || entries as i64 > atom.size / 8 || entries > MAX_STSD_ENTRIES {
            return Err(Error::invalid_mp4(format!("invalid stsd entry count {}", entries)));
        }
        if track.extra_data.is_some() {
            return Err(Error::DuplicateAtom("stsd"));
        }
        if entries > 1 {
            warn!(track = track.index, entries, "multiple sample descriptions, last one wins");
        }

        for _ in 0..entries {
            let start = self.reader.position()?;
            let size = self.reader.read_u32_be()? as i64;
            let format = self.reader.read_tag()?;

            if size >= 16 {
                self.reader.skip(6)?; // reserved
                self.reader.read_u16_be()?; // data reference index
            } else if size <= 7 {
                return Err(Error::invalid_mp4(format!(
                    "invalid sample description size {}",
                    size
                )));
            }

            track.codec = CodecId::from_tag(track.media_type, format);
            track.codec_tag = Some(format);

            match track.media_type {
                MediaType::Video => self.read_video_description(track)?,
                MediaType::Audio => self.read_audio_description(track, format)?,
                MediaType::Other => {}
            }

            let consumed = (self.reader.position()? - start) as i64;
            let remaining = size - consumed;
            if remaining > 8 {
                self.walk(Atom::new(AtomType::STSD, remaining), Some(track), depth + 1)?;
            } else if remaining > 0 {
                self.reader.skip(remaining)?;
            }
        }

        info!(
            track = track.index,
            codec = %track.codec,
            tag = %AtomType(track.codec_tag.unwrap_or_default()),
            "sample description"
        );
        Ok(())
    }

    fn read_video_description(&mut self, track: &mut Track) -> Result<()> {
        self.reader.read_u16_be()?; // version
        self.reader.read_u16_be()?; // revision
        self.reader.read_u32_le()?; // vendor
        self.reader.read_u32_be()?; // temporal quality
        self.reader.read_u32_be()?; // spatial quality

        track.width = self.reader.read_u16_be()? as u32;
        track.height = self.reader.read_u16_be()? as u32;

        self.reader.read_u32_be()?; // horizontal resolution
        self.reader.read_u32_be()?; // vertical resolution
        self.reader.read_u32_be()?; // data size
        self.reader.read_u16_be()?; // frames per sample
        self.reader.skip(32)?; // compressor name

        track.depth = self.reader.read_u16_be()?;
        self.reader.read_u16_be()?; // color table id

        if matches!(track.depth & 0x1F, 1 | 2 | 4 | 8) {
            warn!(track = track.index, depth = track.depth, "palettized video");
        }
        Ok(())
    }

    fn read_audio_description(&mut self, track: &mut Track, format: [u8; 4]) -> Result<()> {
        let version = self.reader.read_u16_be()?;
        self.reader.read_u16_be()?; // revision
        self.reader.read_u32_le()?; // vendor

        let audio = &mut track.audio;
        audio.channels = self.reader.read_u16_be()? as u32;
        audio.bits_per_sample = self.reader.read_u16_be()? as u32;
        self.reader.read_u16_be()?; // compression id
        self.reader.read_u16_be()?; // packet size
        audio.sample_rate = self.reader.read_u32_be()? >> 16;

        if !self.movie.isom {
            match version {
                1 => {
                    self.reader.read_u32_be()?; // samples per packet
                    audio.samples_per_frame = self.reader.read_u32_be()?;
                    audio.bytes_per_frame = self.reader.read_u32_be()?;
                    self.reader.read_u32_be()?; // bytes per sample
                }
                2 => {
                    self.reader.read_u32_be()?; // struct size
                    audio.sample_rate = f64::from_bits(self.reader.read_u64_be()?) as u32;
                    audio.channels = self.reader.read_u32_be()?;
                    self.reader.read_u32_be()?; // always 0x7F000000
                    audio.bits_per_sample = self.reader.read_u32_be()?;
                    self.reader.read_u32_be()?; // lpcm flags
                    audio.bytes_per_frame = self.reader.read_u32_be()?;
                    audio.samples_per_frame = self.reader.read_u32_be()?;
                }
                _ => {}
            }
        }

        if format == [0; 4] {
            match audio.bits_per_sample {
                8 => track.codec = CodecId::PcmU8,
                16 => track.codec = CodecId::PcmS16Be,
                _ => {}
            }
        }

        track.sample_size = (audio.bits_per_sample / 8) * audio.channels;
        Ok(())
    }

    pub(crate) fn read_stts(&mut self, atom: Atom, track: &mut Track) -> Result<()> {
        self.reader.read_u32_be()?; // version + flags
        let entries = self.reader.read_u32_be()?;
        check_table_size(atom, entries, 8, 8)?;

        let mut runs = Vec::new();
        for _ in 0..entries {
            let count = self.reader.read_u32_be()?;
            let duration = self.reader.read_u32_be()? as i32;
            runs.push(DurationRun { count, duration });
        }

        if track.tables.set_durations(runs) {
            warn!(track = track.index, "duplicate stts atom, replacing");
        }
        debug!(track = track.index, entries, "stts");
        Ok(())
    }

    pub(crate) fn read_stsc(&mut self, atom: Atom, track: &mut Track) -> Result<()> {
        self.reader.read_u32_be()?;
        let entries = self.reader.read_u32_be()?;
        check_table_size(atom, entries, 12, 4)?;
        if entries == 0 {
            return Ok(());
        }

        let mut runs = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            runs.push(ChunkRun {
                first_chunk: self.reader.read_u32_be()?,
                samples_per_chunk: self.reader.read_u32_be()?,
                description_id: self.reader.read_u32_be()?,
            });
        }

        if track.tables.set_chunk_runs(runs) {
            warn!(track = track.index, "duplicate stsc atom, replacing");
        }
        Ok(())
    }

    /// `stsz` and `stz2`.
    pub(crate) fn read_sample_sizes(&mut self, atom: Atom, track: &mut Track) -> Result<()> {
        self.reader.read_u32_be()?;

        let (fixed_size, field_size) = if atom.atom_type == AtomType::STSZ {
            let size = self.reader.read_u32_be()?;
            if track.sample_size == 0 {
                track.sample_size = size;
            }
            (size, 32)
        } else {
            self.reader.read_u24_be()?; // reserved
            (0, self.reader.read_u8()?)
        };

        let entries = self.reader.read_u32_be()?;
        if entries == 0 {
            return Ok(());
        }

        let replaced = if fixed_size != 0 {
            track.tables.set_fixed_sample_size(fixed_size, entries)
        } else {
            let sizes = self.read_packed_sizes(atom, entries, field_size)?;
            track.tables.set_sample_sizes(sizes)
        };
        if replaced {
            warn!(track = track.index, atom = %atom.atom_type, "duplicate sample size atom, replacing");
        }
        debug!(track = track.index, entries, fixed_size, "sample sizes");
        Ok(())
    }

    fn read_packed_sizes(&mut self, atom: Atom, entries: u32, field_size: u8) -> Result<Vec<u32>> {
        if !matches!(field_size, 4 | 8 | 16 | 32) {
            return Err(Error::invalid_mp4(format!(
                "invalid sample size field width {}",
                field_size
            )));
        }
        let bytes = (entries as u64 * field_size as u64).div_ceil(8);
        check_table_size(atom, 1, bytes, 12)?;

        let mut sizes = Vec::with_capacity(entries as usize);
        match field_size {
            4 => {
                for _ in 0..entries.div_ceil(2) {
                    let byte = self.reader.read_u8()?;
                    sizes.push((byte >> 4) as u32);
                    sizes.push((byte & 0x0F) as u32);
                }
                sizes.truncate(entries as usize);
            }
            8 => {
                for _ in 0..entries {
                    sizes.push(self.reader.read_u8()? as u32);
                }
            }
            16 => {
                for _ in 0..entries {
                    sizes.push(self.reader.read_u16_be()? as u32);
                }
            }
            _ => {
                for _ in 0..entries {
                    sizes.push(self.reader.read_u32_be()?);
                }
            }
        }
        Ok(sizes)
    }

    /// `stco` and `co64`.
    pub(crate) fn read_chunk_offsets(&mut self, atom: Atom, track: &mut Track) -> Result<()> {
        self.reader.read_u32_be()?;
        let entries = self.reader.read_u32_be()?;
        if entries == 0 {
            warn!(track = track.index, atom = %atom.atom_type, "empty chunk offset table");
            return Ok(());
        }

        let wide = atom.atom_type == AtomType::CO64;
        check_table_size(atom, entries, if wide { 8 } else { 4 }, 8)?;

        let mut offsets = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            let offset = if wide {
                self.reader.read_u64_be()?
            } else {
                self.reader.read_u32_be()? as u64
            };
            offsets.push(offset);
        }

        if track.tables.set_chunk_offsets(offsets) {
            warn!(track = track.index, atom = %atom.atom_type, "duplicate chunk offset atom, replacing");
        }
        Ok(())
    }

    pub(crate) fn read_ctts(&mut self, atom: Atom, track: &mut Track) -> Result<()> {
        self.reader.read_u32_be()?;
        let entries = self.reader.read_u32_be()?;
        check_table_size(atom, entries, 8, 8)?;
        if entries == 0 {
            warn!(track = track.index, "empty ctts table");
            return Ok(());
        }

        let mut runs = Vec::new();
        let mut dts_shift = 0i64;
        for i in 0..entries {
            let count = self.reader.read_u32_be()? as i32;
            let offset = self.reader.read_u32_be()? as i32;
            if count <= 0 {
                debug!(track = track.index, entry = i, "ignoring empty ctts entry");
                continue;
            }
            runs.push(CompositionRun {
                count: count as u32,
                offset,
            });

            // the final two rows do not contribute to the shift
            if i + 2 < entries && offset < 0 {
                dts_shift = dts_shift.max(-(offset as i64));
            }
        }

        if track.tables.set_composition(runs, dts_shift) {
            warn!(track = track.index, "duplicate ctts atom, replacing");
        }
        debug!(track = track.index, entries, dts_shift, "ctts");
        Ok(())
    }

    pub(crate) fn read_stss(&mut self, atom: Atom, track: &mut Track) -> Result<()> {
        self.reader.read_u32_be()?;
        let entries = self.reader.read_u32_be()?;
        check_table_size(atom, entries, 4, 8)?;
        if entries == 0 {
            warn!(track = track.index, "empty stss table");
            return Ok(());
        }

        let mut samples = Vec::new();
        for _ in 0..entries {
            samples.push(self.reader.read_u32_be()?);
        }

        if track.tables.set_sync_samples(samples) {
            warn!(track = track.index, "duplicate stss atom, replacing");
        }
        debug!(track = track.index, keyframes = entries, "stss");
        Ok(())
    }

    /// `avcC`, `hvcC` and `glbl`: the whole payload is decoder config.
    pub(crate) fn read_codec_config(&mut self, atom: Atom, track: &mut Track) -> Result<()> {
        let data = self.reader.read_vec(atom.size.max(0) as usize)?;
        debug!(track = track.index, atom = %atom.atom_type, len = data.len(), "codec config");
        track.extra_data = Some(Bytes::from(data));
        Ok(())
    }

    pub(crate) fn read_esds(&mut self, track: &mut Track) -> Result<()> {
        let esds = parse_esds(self.reader)?;

        if let Some(object_type) = esds.object_type {
            let codec = CodecId::from_object_type(object_type);
            if codec != CodecId::None {
                track.codec = codec;
            }
            debug!(track = track.index, object_type, codec = %codec, "esds");
        }
        if let Some(config) = esds.decoder_specific {
            track.extra_data = Some(Bytes::from(config));
        }
        Ok(())
    }
}
