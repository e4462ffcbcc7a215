//! Container codecs: pure byte-level serializers/parsers, no I/O.

pub mod cso;
pub mod dax;

pub const SECTOR_SIZE: u32 = 0x800;
pub const SECTOR_MASK: u64 = 0x7FF;
pub const SECTOR_SHIFT: u32 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsoFormat {
    Cso1,
    Cso2,
    Zso,
    Dax,
}

/// Detected input container type, identified from its magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    Iso,
    Cso1,
    Cso2,
    Zso,
    Dax,
}

pub fn detect_fingerprint(first4: &[u8; 4]) -> DetectedFormat {
    match first4 {
        b"CISO" => DetectedFormat::Cso1, // version disambiguated after header parse
        b"ZISO" => DetectedFormat::Zso,
        b"DAX\0" => DetectedFormat::Dax,
        _ => DetectedFormat::Iso,
    }
}
