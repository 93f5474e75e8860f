//! MPEG-4 elementary stream descriptor (`esds`) parsing.

use super::reader::ByteReader;
use crate::stream::MediaStream;
use crate::{Error, Result};

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_TAG: u8 = 0x04;
const DECODER_SPECIFIC_TAG: u8 = 0x05;

/// Largest decoder-specific payload accepted.
const MAX_DECODER_SPECIFIC_LEN: u32 = 1 << 30;

/// Fields of interest from an `esds` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EsDescriptor {
    /// Object type indication from the decoder config descriptor.
    pub object_type: Option<u8>,
    /// Decoder-specific info (AudioSpecificConfig for AAC).
    pub decoder_specific: Option<Vec<u8>>,
}

/// Read a descriptor tag and its variable-length size (up to four 7-bit
/// groups, high bit set on all but the last).
pub fn read_descriptor_header<R: MediaStream>(reader: &mut ByteReader<R>) -> Result<(u8, u32)> {
    let tag = reader.read_u8()?;
    let mut len = 0u32;
    for _ in 0..4 {
        let byte = reader.read_u8()?;
        len = (len << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok((tag, len))
}

/// Parse an `esds` payload positioned just after the atom header.
pub fn parse_esds<R: MediaStream>(reader: &mut ByteReader<R>) -> Result<EsDescriptor> {
    let mut descriptor = EsDescriptor::default();

    // version + flags
    reader.read_u32_be()?;

    let (tag, _) = read_descriptor_header(reader)?;
    if tag == ES_DESCRIPTOR_TAG {
        // ES_ID + stream priority flags
        reader.read_u24_be()?;
    } else {
        reader.read_u16_be()?;
    }

    let (tag, _) = read_descriptor_header(reader)?;
    if tag != DECODER_CONFIG_TAG {
        return Ok(descriptor);
    }

    let object_type = reader.read_u8()?;
    reader.read_u8()?; // stream type
    reader.read_u24_be()?; // buffer size
    reader.read_u32_be()?; // max bitrate
    reader.read_u32_be()?; // avg bitrate
    descriptor.object_type = Some(object_type);

    let (tag, len) = read_descriptor_header(reader)?;
    if tag == DECODER_SPECIFIC_TAG {
        if len > MAX_DECODER_SPECIFIC_LEN {
            return Err(Error::invalid_mp4(format!(
                "decoder specific info too large: {} bytes",
                len
            )));
        }
        descriptor.decoder_specific = Some(reader.read_vec(len as usize)?);
    }

    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn aac_esds() -> Vec<u8> {
        vec![
            0, 0, 0, 0, // version + flags
            0x03, 0x80, 0x80, 0x80, 0x22, // ES descriptor, padded length
            0x00, 0x01, 0x00, // ES_ID, flags
            0x04, 0x14, // decoder config
            0x40, 0x15, 0x00, 0x00, 0x00, // AAC, audio stream, buffer size
            0x00, 0x01, 0xF4, 0x00, // max bitrate
            0x00, 0x01, 0xF4, 0x00, // avg bitrate
            0x05, 0x02, 0x12, 0x10, // AudioSpecificConfig
            0x06, 0x01, 0x02, // SL config
        ]
    }

    #[test]
    fn test_descriptor_length() {
        let mut reader = ByteReader::new(Cursor::new(vec![0x03, 0x81, 0x01]));
        assert_eq!(read_descriptor_header(&mut reader).unwrap(), (0x03, 129));
        assert_eq!(reader.position().unwrap(), 3);
    }

    #[test]
    fn test_descriptor_length_stops_after_four_bytes() {
        let mut reader = ByteReader::new(Cursor::new(vec![0x05, 0x80, 0x80, 0x80, 0x80, 0x7F]));
        let (tag, len) = read_descriptor_header(&mut reader).unwrap();
        assert_eq!((tag, len), (0x05, 0));
        assert_eq!(reader.position().unwrap(), 5);
    }

    #[test]
    fn test_parse_aac_esds() {
        let mut reader = ByteReader::new(Cursor::new(aac_esds()));
        let esds = parse_esds(&mut reader).unwrap();
        assert_eq!(esds.object_type, Some(0x40));
        assert_eq!(esds.decoder_specific, Some(vec![0x12, 0x10]));
    }

    #[test]
    fn test_parse_esds_without_decoder_config() {
        let data = vec![0, 0, 0, 0, 0x03, 0x03, 0x00, 0x01, 0x00, 0x06, 0x01, 0x02];
        let mut reader = ByteReader::new(Cursor::new(data));
        assert_eq!(parse_esds(&mut reader).unwrap(), EsDescriptor::default());
    }

    #[test]
    fn test_truncated_decoder_specific_is_io_error() {
        let mut data = aac_esds();
        data.truncate(27);
        data.extend_from_slice(&[0x05, 0x10, 0x12]);
        let mut reader = ByteReader::new(Cursor::new(data));
        assert!(matches!(parse_esds(&mut reader), Err(Error::Io(_))));
    }
}
