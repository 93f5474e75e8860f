//! Byte-stream collaborator.
//!
//! The demuxer reads through any `Read + Seek` value. Files are opened from a
//! plain path or a `file://` URI and buffered.

use crate::{Error, Result};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// A seekable byte source with a known total size.
pub trait MediaStream: Read + Seek {
    /// Total size of the stream in bytes. The cursor position is preserved.
    fn size(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        if pos != end {
            self.seek(SeekFrom::Start(pos))?;
        }
        Ok(end)
    }
}

impl<T: Read + Seek + ?Sized> MediaStream for T {}

/// Buffered file stream returned by [`open_uri`].
pub type FileStream = BufReader<File>;

/// Open a media file from a path or `file://` URI.
pub fn open_uri(uri: &str) -> Result<FileStream> {
    let path = match uri.split_once("://") {
        Some(("file", rest)) => rest,
        Some((scheme, _)) => {
            return Err(Error::unsupported(format!("URI scheme '{}'", scheme)));
        }
        None => uri,
    };
    let file = File::open(Path::new(path))?;
    Ok(BufReader::new(file))
}
