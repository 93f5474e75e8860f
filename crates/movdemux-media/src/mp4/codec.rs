//! Codec identifiers and the tag tables that map sample-description formats
//! and MPEG-4 object types onto them.

use std::fmt;

/// Media type of a track, from its handler reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "lowercase"))]
pub enum MediaType {
    Video,
    Audio,
    #[default]
    Other,
}

impl MediaType {
    /// Map an `hdlr` subtype.
    pub fn from_handler(subtype: [u8; 4]) -> Self {
        match &subtype {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            _ => Self::Other,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }
}

/// Codec carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum CodecId {
    #[default]
    None,
    H264,
    Hevc,
    Mpeg4,
    Mjpeg,
    Aac,
    Mp3,
    PcmU8,
    PcmS16Be,
    PcmS16Le,
}

impl CodecId {
    /// Look up a sample-description format tag for the given media type.
    pub fn from_tag(media_type: MediaType, tag: [u8; 4]) -> Self {
        match media_type {
            MediaType::Video => match &tag {
                b"avc1" | b"avc3" => Self::H264,
                b"hvc1" | b"hev1" => Self::Hevc,
                b"mp4v" => Self::Mpeg4,
                b"jpeg" | b"mjpa" | b"mjpb" | b"AVDJ" => Self::Mjpeg,
                _ => Self::None,
            },
            // Tracks without a handler fall back to the audio table.
            MediaType::Audio | MediaType::Other => match &tag {
                b"mp4a" => Self::Aac,
                b".mp3" | b"mp3 " | b"ms\x00\x55" => Self::Mp3,
                b"raw " => Self::PcmU8,
                b"twos" | b"lpcm" => Self::PcmS16Be,
                b"sowt" => Self::PcmS16Le,
                _ => Self::None,
            },
        }
    }

    /// Look up an MPEG-4 systems object type indication.
    pub fn from_object_type(object_type: u8) -> Self {
        match object_type {
            0x20 => Self::Mpeg4,
            0x21 => Self::H264,
            0x23 => Self::Hevc,
            0x40 | 0x66 | 0x67 | 0x68 => Self::Aac,
            0x69 | 0x6B => Self::Mp3,
            0x6C => Self::Mjpeg,
            _ => Self::None,
        }
    }

    /// Every sample of an intra-only codec is a sync point.
    pub fn is_intra_only(&self) -> bool {
        matches!(
            self,
            Self::Mjpeg | Self::PcmU8 | Self::PcmS16Be | Self::PcmS16Le
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "unknown",
            Self::H264 => "h264",
            Self::Hevc => "hevc",
            Self::Mpeg4 => "mpeg4",
            Self::Mjpeg => "mjpeg",
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
            Self::PcmU8 => "pcm_u8",
            Self::PcmS16Be => "pcm_s16be",
            Self::PcmS16Le => "pcm_s16le",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
