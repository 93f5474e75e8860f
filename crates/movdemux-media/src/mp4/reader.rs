//! Scalar reads over a media stream.

use crate::stream::MediaStream;
use crate::Result;
use std::io::SeekFrom;

/// Sequential big/little-endian reader over a [`MediaStream`].
///
/// No buffering beyond what the stream provides. Reads past a box boundary
/// are allowed; callers honor declared box sizes themselves.
pub struct ByteReader<R> {
    inner: R,
}

impl<R: MediaStream> ByteReader<R> {
    /// Wrap a stream.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Get the underlying stream back.
    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.inner.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_u24_be(&mut self) -> Result<u32> {
        let mut buf = [0u8; 3];
        self.inner.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes([0, buf[0], buf[1], buf[2]]))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_u64_be(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.inner.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read a four-character code in stream order.
    pub fn read_tag(&mut self) -> Result<[u8; 4]> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Fill `buf` completely.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        Ok(())
    }

    /// Read `len` bytes into a new buffer.
    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut data = vec![0u8; len];
        self.inner.read_exact(&mut data)?;
        Ok(data)
    }

    /// Move the cursor relative to its current position.
    pub fn skip(&mut self, delta: i64) -> Result<u64> {
        Ok(self.inner.seek(SeekFrom::Current(delta))?)
    }

    /// Move the cursor to an absolute position.
    pub fn seek_to(&mut self, pos: u64) -> Result<u64> {
        Ok(self.inner.seek(SeekFrom::Start(pos))?)
    }

    /// Absolute cursor position.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Total stream size in bytes.
    pub fn size(&mut self) -> Result<u64> {
        Ok(self.inner.size()?)
    }
}
