//! Movdemux-Media: MOV/MP4 demuxing core
//!
//! This crate reads ISO base media files (MP4, MOV) and hands out their
//! samples in decode order, ready for a decoder.
//!
//! # Modules
//!
//! - `stream` - Seekable byte sources and `file://` URI handling
//! - `mp4` - Atom walking, per-atom parsers, sample tables and index building
//! - `demux` - The `Demuxer` lifecycle: init, peek/read, seek, media info
//!
//! # Architecture
//!
//! `Demuxer::init` walks the atom tree once. Every `trak` collects its raw
//! sample tables (stts/stsc/stsz/stco/ctts/stss) and resolves them into a
//! dense index of `(offset, dts, size, distance-to-sync)` entries as soon as
//! the `trak` closes. Streaming then never touches the header again:
//!
//! 1. `peek` picks the track whose next sample has the smallest decode time
//! 2. `read` seeks to that sample's offset and copies its bytes
//! 3. `seek` moves the first video track to a sync sample near the target
//!    and lines the first audio track up with it

pub mod demux;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fixture;
pub mod mp4;
pub mod stream;

pub use demux::{Demuxer, MediaInfo, Packet, PacketInfo};
pub use error::{Error, Result};
pub use mp4::{CodecId, MediaType, Track};
pub use stream::{open_uri, FileStream, MediaStream};
