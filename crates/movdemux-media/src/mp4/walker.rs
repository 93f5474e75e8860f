//! Recursive atom traversal.
//!
//! [`parse_movie`] walks the stream from the start, dispatching each atom to
//! its handler via [`AtomHandler::lookup`]. Containers recurse with an
//! explicit depth; track-scoped handlers receive the `trak` being built.

use super::atoms::{Atom, AtomHandler, AtomType};
use super::reader::ByteReader;
use super::track::Track;
use crate::stream::MediaStream;
use crate::{Error, Result};
use tracing::{debug, error, trace};

/// Deepest nesting level the walker will enter.
pub const MAX_ATOM_DEPTH: usize = 10;

/// Parents at least this large are not skipped to their end once their
/// children have been walked.
const MAX_TRAILING_SKIP: i64 = 0x7FFFF;

const ATOM_HEADER_SIZE: i64 = 8;

/// Movie-level results of a header walk.
#[derive(Debug, Clone, Default)]
pub struct Movie {
    /// Movie timescale from `mvhd`.
    pub time_scale: u32,
    /// Movie duration in movie timescale units.
    pub duration: u64,
    pub creation_time: u64,
    pub modification_time: u64,
    /// Display matrix from `mvhd`, stored but not applied.
    pub matrix: [i32; 9],
    /// Major brand is something other than QuickTime.
    pub isom: bool,
    pub found_moov: bool,
    pub found_mdat: bool,
    pub tracks: Vec<Track>,
}

/// Walk the whole stream and collect the movie header and tracks.
///
/// Fails when no `moov` atom is found or when the atom tree is malformed.
pub fn parse_movie<R: MediaStream>(reader: &mut ByteReader<R>) -> Result<Movie> {
    let size = reader.size()?;
    reader.seek_to(0)?;

    let mut parser = HeaderParser::new(reader);
    let root = Atom::new(AtomType::ROOT, size.min(i64::MAX as u64) as i64);
    parser.walk(root, None, 0)?;

    let movie = parser.into_movie();
    if !movie.found_moov {
        error!("moov atom not found");
        return Err(Error::MissingAtom("moov"));
    }
    debug!(
        tracks = movie.tracks.len(),
        time_scale = movie.time_scale,
        isom = movie.isom,
        "movie header parsed"
    );
    Ok(movie)
}

/// Parse state threaded through the handlers.
pub(crate) struct HeaderParser<'a, R> {
    pub(crate) reader: &'a mut ByteReader<R>,
    pub(crate) movie: Movie,
}

impl<'a, R: MediaStream> HeaderParser<'a, R> {
    pub(crate) fn new(reader: &'a mut ByteReader<R>) -> Self {
        Self {
            reader,
            movie: Movie {
                time_scale: 1,
                ..Default::default()
            },
        }
    }

    pub(crate) fn into_movie(self) -> Movie {
        self.movie
    }

    fn done(&self) -> bool {
        self.movie.found_moov && self.movie.found_mdat
    }

    /// Walk the children of `parent`, whose payload starts at the current
    /// position.
    pub(crate) fn walk(
        &mut self,
        parent: Atom,
        mut track: Option<&mut Track>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_ATOM_DEPTH {
            error!(atom = %parent.atom_type, depth, "atom nesting too deep");
            return Err(Error::AtomTooDeep {
                atom: parent.atom_type.to_string(),
                depth,
                max: MAX_ATOM_DEPTH,
            });
        }

        let mut total = 0i64;
        while total + ATOM_HEADER_SIZE <= parent.size {
            let mut size = self.reader.read_u32_be()? as i64;
            let atom_type = AtomType(self.reader.read_tag()?);
            total += ATOM_HEADER_SIZE;

            if size == 1 && total + 8 <= parent.size {
                // 64-bit size also covers the extended field itself
                size = self.reader.read_u64_be()?.min(i64::MAX as u64) as i64 - 8;
                total += 8;
            }
            if size == 0 {
                size = parent.size - total + ATOM_HEADER_SIZE;
            }
            size -= ATOM_HEADER_SIZE;
            if size < 0 {
                debug!(atom = %atom_type, size, "atom size below header length, stopping");
                break;
            }
            size = size.min(parent.size - total);

            let atom = Atom::new(atom_type, size);
            trace!(atom = %atom_type, size, depth, "atom");

            match AtomHandler::lookup(atom_type) {
                None => {
                    self.reader.skip(size)?;
                }
                Some(handler) => {
                    let start = self.reader.position()?;
                    self.dispatch(handler, atom, track.as_deref_mut(), depth)?;
                    if self.done() {
                        return Ok(());
                    }

                    let consumed = (self.reader.position()? - start) as i64;
                    let left = size - consumed;
                    if left > 0 {
                        self.reader.skip(left)?;
                    } else if left < 0 {
                        error!(
                            atom = %atom_type,
                            over = -left,
                            "atom handler read past the end of its atom"
                        );
                        self.reader.seek_to(start + size as u64)?;
                    }
                }
            }

            total += size;
        }

        if total < parent.size && parent.size < MAX_TRAILING_SKIP {
            self.reader.skip(parent.size - total)?;
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        handler: AtomHandler,
        atom: Atom,
        track: Option<&mut Track>,
        depth: usize,
    ) -> Result<()> {
        match handler {
            AtomHandler::Container => self.walk(atom, track, depth + 1),
            AtomHandler::Ftyp => self.read_ftyp(atom),
            AtomHandler::Moov => self.read_moov(atom, depth),
            AtomHandler::Mdat => self.read_mdat(atom),
            AtomHandler::Mvhd => self.read_mvhd(atom),
            AtomHandler::Trak => self.read_trak(atom, depth),
            _ => match track {
                Some(track) => self.read_track_atom(handler, atom, track, depth),
                None => {
                    debug!(atom = %atom.atom_type, "track atom outside of a trak, skipping");
                    Ok(())
                }
            },
        }
    }

    fn read_track_atom(
        &mut self,
        handler: AtomHandler,
        atom: Atom,
        track: &mut Track,
        depth: usize,
    ) -> Result<()> {
        match handler {
            AtomHandler::Tkhd => self.read_tkhd(atom, track),
            AtomHandler::Hdlr => self.read_hdlr(atom, track),
            AtomHandler::Mdhd => self.read_mdhd(atom, track),
            AtomHandler::Stsd => self.read_stsd(atom, track, depth),
            AtomHandler::Stts => self.read_stts(atom, track),
            AtomHandler::Stsc => self.read_stsc(atom, track),
            AtomHandler::SampleSizes => self.read_sample_sizes(atom, track),
            AtomHandler::ChunkOffsets => self.read_chunk_offsets(atom, track),
            AtomHandler::Ctts => self.read_ctts(atom, track),
            AtomHandler::Stss => self.read_stss(atom, track),
            AtomHandler::CodecConfig => self.read_codec_config(atom, track),
            AtomHandler::Esds => self.read_esds(track),
            // movie-level handlers are routed by `dispatch`
            AtomHandler::Container
            | AtomHandler::Ftyp
            | AtomHandler::Moov
            | AtomHandler::Mdat
            | AtomHandler::Mvhd
            | AtomHandler::Trak => Ok(()),
        }
    }
}
