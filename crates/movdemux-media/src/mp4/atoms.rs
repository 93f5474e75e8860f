//! MP4 atom definitions and the tag-to-handler table.

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const ROOT: Self = Self([0; 4]);
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const MVEX: Self = Self(*b"mvex");
    pub const TRAK: Self = Self(*b"trak");
    pub const TRAF: Self = Self(*b"traf");
    pub const TREF: Self = Self(*b"tref");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const EDTS: Self = Self(*b"edts");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const DINF: Self = Self(*b"dinf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STZ2: Self = Self(*b"stz2");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const CTTS: Self = Self(*b"ctts");
    pub const UDTA: Self = Self(*b"udta");
    pub const AVCC: Self = Self(*b"avcC");
    pub const HVCC: Self = Self(*b"hvcC");
    pub const GLBL: Self = Self(*b"glbl");
    pub const ESDS: Self = Self(*b"esds");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An atom on the traversal stack.
#[derive(Debug, Clone, Copy)]
pub struct Atom {
    /// Atom type code.
    pub atom_type: AtomType,
    /// Payload size in bytes, header excluded.
    pub size: i64,
}

impl Atom {
    pub fn new(atom_type: AtomType, size: i64) -> Self {
        Self { atom_type, size }
    }
}

/// What to do with an atom once its header is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomHandler {
    /// Walk the payload as a list of child atoms.
    Container,
    Ftyp,
    Moov,
    Mdat,
    Mvhd,
    Trak,
    Tkhd,
    Hdlr,
    Mdhd,
    Stsd,
    Stts,
    Stsc,
    /// `stsz` and `stz2`.
    SampleSizes,
    /// `stco` and `co64`.
    ChunkOffsets,
    Ctts,
    Stss,
    /// `avcC`, `hvcC` and `glbl` stored verbatim as codec extra data.
    CodecConfig,
    Esds,
}

impl AtomHandler {
    /// Static dispatch table. Atoms without an entry are skipped.
    pub fn lookup(atom_type: AtomType) -> Option<Self> {
        let handler = match atom_type {
            AtomType::DINF
            | AtomType::EDTS
            | AtomType::MDIA
            | AtomType::MINF
            | AtomType::MVEX
            | AtomType::STBL
            | AtomType::TRAF
            | AtomType::TREF
            | AtomType::UDTA => Self::Container,
            AtomType::FTYP => Self::Ftyp,
            AtomType::MOOV => Self::Moov,
            AtomType::MDAT => Self::Mdat,
            AtomType::MVHD => Self::Mvhd,
            AtomType::TRAK => Self::Trak,
            AtomType::TKHD => Self::Tkhd,
            AtomType::HDLR => Self::Hdlr,
            AtomType::MDHD => Self::Mdhd,
            AtomType::STSD => Self::Stsd,
            AtomType::STTS => Self::Stts,
            AtomType::STSC => Self::Stsc,
            AtomType::STSZ | AtomType::STZ2 => Self::SampleSizes,
            AtomType::STCO | AtomType::CO64 => Self::ChunkOffsets,
            AtomType::CTTS => Self::Ctts,
            AtomType::STSS => Self::Stss,
            AtomType::AVCC | AtomType::HVCC | AtomType::GLBL => Self::CodecConfig,
            AtomType::ESDS => Self::Esds,
            _ => return None,
        };
        Some(handler)
    }
}
