//! CSO v1 / CSO v2 / ZSO header and index.
//!
//! Fixed 24-byte header followed by `(sectors + 1)` little-endian u32 index
//! entries.

pub const CSO_MAGIC: &[u8; 4] = b"CISO";
pub const ZSO_MAGIC: &[u8; 4] = b"ZISO";
pub const HEADER_SIZE: u32 = 24;

pub const CSO_INDEX_UNCOMPRESSED: u32 = 0x8000_0000;
pub const CSO2_INDEX_LZ4: u32 = 0x8000_0000;
pub const CSO_INDEX_OFFSET_MASK: u32 = 0x7FFF_FFFF;

#[derive(Debug, Clone, Copy)]
pub struct CsoHeader {
    pub magic: [u8; 4],
    pub header_size: u32,
    pub uncompressed_size: u64,
    pub sector_size: u32,
    pub version: u8,
    pub index_shift: u8,
}

impl CsoHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut out = [0u8; HEADER_SIZE as usize];
        out[0..4].copy_from_slice(&self.magic);
        out[4..8].copy_from_slice(&self.header_size.to_le_bytes());
        out[8..16].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        out[16..20].copy_from_slice(&self.sector_size.to_le_bytes());
        out[20] = self.version;
        out[21] = self.index_shift;
        out[22] = 0;
        out[23] = 0;
        out
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE as usize]) -> Self {
        CsoHeader {
            magic: buf[0..4].try_into().unwrap(),
            header_size: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            uncompressed_size: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            sector_size: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            version: buf[20],
            index_shift: buf[21],
        }
    }
}

/// Parses the `(sectors + 1)`-entry index table from its on-disk LE u32 form.
pub fn parse_index(buf: &[u8]) -> Vec<u32> {
    buf.chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

pub fn serialize_index(index: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(index.len() * 4);
    for entry in index {
        out.extend_from_slice(&entry.to_le_bytes());
    }
    out
}

/// v1/ZSO: bit 31 marks "stored uncompressed". v2: bit 31 marks "LZ4" and
/// raw-vs-compressed is inferred from whether `next - this == block_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cso1EntryKind {
    Compressed,
    Uncompressed,
}

pub fn cso1_entry_offset(entry: u32) -> u32 {
    entry & CSO_INDEX_OFFSET_MASK
}

pub fn cso1_entry_kind(entry: u32) -> Cso1EntryKind {
    if entry & CSO_INDEX_UNCOMPRESSED != 0 {
        Cso1EntryKind::Uncompressed
    } else {
        Cso1EntryKind::Compressed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cso2BlockKind {
    Raw,
    Lz4,
    Deflate,
}

/// CSO v2 per-block classification: a block is raw iff its delta equals
/// `block_size`; the LZ4 bit only disambiguates the compressed case.
pub fn cso2_block_kind(entry: u32, next_entry: u32, block_size: u32) -> Cso2BlockKind {
    let this_off = cso1_entry_offset(entry);
    let next_off = cso1_entry_offset(next_entry);
    let delta = next_off.wrapping_sub(this_off);
    if delta == block_size {
        Cso2BlockKind::Raw
    } else if entry & CSO2_INDEX_LZ4 != 0 {
        Cso2BlockKind::Lz4
    } else {
        Cso2BlockKind::Deflate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = CsoHeader {
            magic: *CSO_MAGIC,
            header_size: HEADER_SIZE,
            uncompressed_size: 0x1_2345_6789,
            sector_size: 2048,
            version: 1,
            index_shift: 3,
        };
        let bytes = header.to_bytes();
        let back = CsoHeader::from_bytes(&bytes);
        assert_eq!(back.magic, header.magic);
        assert_eq!(back.uncompressed_size, header.uncompressed_size);
        assert_eq!(back.sector_size, header.sector_size);
        assert_eq!(back.version, header.version);
        assert_eq!(back.index_shift, header.index_shift);
    }

    #[test]
    fn index_round_trips() {
        let index = vec![0u32, 1, 0x8000_0001, u32::MAX];
        let bytes = serialize_index(&index);
        assert_eq!(parse_index(&bytes), index);
    }

    #[test]
    fn cso2_raw_block_detected_by_delta() {
        // entry/next differ by exactly block_size -> raw, regardless of the LZ4 bit.
        assert_eq!(cso2_block_kind(0, 2048 >> 0, 2048), Cso2BlockKind::Raw);
    }

    #[test]
    fn cso2_compressed_block_uses_lz4_bit() {
        assert_eq!(cso2_block_kind(0, 100, 2048), Cso2BlockKind::Deflate);
        assert_eq!(
            cso2_block_kind(CSO2_INDEX_LZ4, CSO2_INDEX_LZ4 + 100, 2048),
            Cso2BlockKind::Lz4
        );
    }
}
