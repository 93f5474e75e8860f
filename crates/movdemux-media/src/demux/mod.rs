//! Demuxer lifecycle: header read, packet iteration and seeking.
//!
//! ```no_run
//! use movdemux_media::Demuxer;
//!
//! let mut demuxer = Demuxer::create("file:///media/clip.mov")?;
//! demuxer.init()?;
//! while let Some(info) = demuxer.peek()? {
//!     let packet = demuxer.read()?;
//!     println!("track {} pts {} us, {} bytes", info.track, info.pts_us, packet.data.len());
//! }
//! # Ok::<(), movdemux_media::Error>(())
//! ```

mod info;
mod scheduler;

pub use info::{AudioStreamInfo, MediaInfo, TrackSummary, VideoStreamInfo};
pub use scheduler::{closest_sample, find_next_sample, seek_tracks, SeekOutcome};

use crate::mp4::{parse_movie, ByteReader, MediaType, Movie, Track};
use crate::stream::{open_uri, FileStream, MediaStream};
use crate::{Error, Result};
use bytes::Bytes;
use tracing::{debug, error, info};

/// Metadata of the sample selected by [`Demuxer::peek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct PacketInfo {
    /// Track the sample belongs to.
    pub track: usize,
    /// Sample position within its track.
    pub sample: usize,
    pub media_type: MediaType,
    /// Sample size in bytes.
    pub size: u32,
    /// File offset of the sample data.
    pub offset: u64,
    /// Decode timestamp in microseconds.
    pub dts_us: i64,
    /// Presentation timestamp in microseconds.
    pub pts_us: i64,
    /// Sample is a sync point.
    pub sync: bool,
    /// This is the last sample of its track.
    pub end_of_track: bool,
}

/// A sample read from the stream.
#[derive(Debug, Clone)]
pub struct Packet {
    pub info: PacketInfo,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Ready,
    Failed,
}

/// MOV/MP4 demuxer over a seekable stream.
pub struct Demuxer<R = FileStream> {
    reader: ByteReader<R>,
    state: State,
    movie: Movie,
    pending: Option<PacketInfo>,
}

impl Demuxer<FileStream> {
    /// Open a file from a path or `file://` URI. The header is not read
    /// until [`Demuxer::init`].
    pub fn create(uri: &str) -> Result<Self> {
        let stream = open_uri(uri)?;
        debug!(uri, "opened media stream");
        Ok(Self::from_stream(stream))
    }
}

impl<R: MediaStream> Demuxer<R> {
    /// Wrap an already open stream.
    pub fn from_stream(stream: R) -> Self {
        Self {
            reader: ByteReader::new(stream),
            state: State::Created,
            movie: Movie::default(),
            pending: None,
        }
    }

    /// Read the movie header and build every track's sample index.
    ///
    /// On failure nothing from the partial parse is kept and streaming
    /// calls return [`Error::NotInitialized`]. A later call retries from
    /// the start of the stream.
    pub fn init(&mut self) -> Result<()> {
        if self.state == State::Ready {
            return Ok(());
        }

        self.pending = None;
        match parse_movie(&mut self.reader) {
            Ok(movie) => {
                info!(
                    tracks = movie.tracks.len(),
                    time_scale = movie.time_scale,
                    "movie header read"
                );
                self.movie = movie;
                self.state = State::Ready;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to read movie header");
                self.movie = Movie::default();
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state == State::Ready
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state == State::Ready {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    /// Movie-level header fields.
    pub fn movie(&self) -> &Movie {
        &self.movie
    }

    /// All tracks, in file order.
    pub fn tracks(&self) -> &[Track] {
        &self.movie.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.movie.tracks.get(index)
    }

    /// Summarize the streams for decoder setup.
    pub fn media_info(&mut self) -> Result<MediaInfo> {
        self.ensure_ready()?;
        let file_size = self.reader.size()?;
        Ok(MediaInfo::from_tracks(&self.movie.tracks, file_size))
    }

    /// Select the next sample across all tracks by decode time.
    ///
    /// Returns `None` at end of stream, and keeps doing so. Each call
    /// advances past the sample it returns; an unread selection is
    /// replaced by the next one.
    pub fn peek(&mut self) -> Result<Option<PacketInfo>> {
        self.ensure_ready()?;

        let Some((track_index, sample)) = find_next_sample(&mut self.movie.tracks) else {
            self.pending = None;
            return Ok(None);
        };

        let track = &self.movie.tracks[track_index];
        let entry = track.samples().entries[sample];
        let info = PacketInfo {
            track: track_index,
            sample,
            media_type: track.media_type,
            size: entry.size,
            offset: entry.file_offset,
            dts_us: track.to_micros(entry.timestamp),
            pts_us: track.pts_us(sample).unwrap_or_default(),
            sync: entry.is_sync(),
            end_of_track: track.is_exhausted(),
        };
        if info.end_of_track {
            debug!(track = track_index, "last sample of track");
        }

        self.pending = Some(info);
        Ok(Some(info))
    }

    /// Read the bytes of the sample selected by the last [`peek`](Self::peek).
    pub fn read(&mut self) -> Result<Packet> {
        self.ensure_ready()?;
        let info = self.pending.ok_or(Error::NoPendingPacket)?;

        self.reader.seek_to(info.offset)?;
        let data = self.reader.read_vec(info.size as usize)?;
        self.pending = None;
        Ok(Packet {
            info,
            data: Bytes::from(data),
        })
    }

    /// Copy the peeked sample into `buf`, returning its size. A buffer that
    /// is too small leaves the selection pending.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_ready()?;
        let info = self.pending.ok_or(Error::NoPendingPacket)?;

        let size = info.size as usize;
        if buf.len() < size {
            return Err(Error::BufferUnderflow {
                need: size,
                have: buf.len(),
            });
        }

        self.reader.seek_to(info.offset)?;
        self.reader.read_exact(&mut buf[..size])?;
        self.pending = None;
        Ok(size)
    }

    /// Reposition the first video and first audio track near `time_us`.
    pub fn seek(&mut self, time_us: i64) -> Result<SeekOutcome> {
        self.ensure_ready()?;
        self.pending = None;
        let outcome = seek_tracks(&mut self.movie.tracks, time_us);
        info!(
            target_us = time_us,
            video = ?outcome.video,
            audio = ?outcome.audio,
            "seek"
        );
        Ok(outcome)
    }

    /// Release the demuxer and get the stream back.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}
