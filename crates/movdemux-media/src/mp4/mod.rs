//! MP4/MOV container parsing.
//!
//! This module walks the ISOBMFF box tree, collects per-track sample tables
//! and resolves them into a dense sample index.

mod atoms;
mod boxes;
mod codec;
mod esds;
mod reader;
mod sample_table;
mod track;
mod walker;

pub use atoms::{Atom, AtomHandler, AtomType};
pub use codec::{CodecId, MediaType};
pub use esds::{parse_esds, read_descriptor_header, EsDescriptor};
pub use reader::ByteReader;
pub use sample_table::{
    ChunkRun, CompositionRun, DurationRun, IndexEntry, IndexParams, SampleTable,
    SampleTableBuilder,
};
pub use track::{rescale_to_micros, AudioFormat, Track};
pub use walker::{parse_movie, Movie, MAX_ATOM_DEPTH};
