//! `Input` — format detection, index load, and streaming decompression.
//!
//! Exposed as a single blocking pull API (`next_block`) driven by
//! `TaskRunner`'s loop on the calling thread, rather than a callback chain
//! re-entering itself on each async read completion: `TaskRunner` only
//! calling `next_block` when `Output` has room *is* the pause/resume signal,
//! just expressed as ordinary control flow.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::compress::{lz4_frame, lz4_trial, zlib};
use crate::container::{cso, dax, detect_fingerprint, DetectedFormat, SECTOR_SIZE};
use crate::error::{bad_input, invalid_data, TaskResult};

const MIN_READ_AHEAD: usize = 32 * 1024;

/// A single contiguous read-ahead buffer. Any file read goes through it and
/// is reused for subsequent requests whose range lies within it.
struct ReadAheadCache {
    buf: Vec<u8>,
    file_pos: u64,
    valid_len: usize,
}

impl ReadAheadCache {
    fn new(size: usize) -> Self {
        ReadAheadCache { buf: vec![0u8; size], file_pos: u64::MAX, valid_len: 0 }
    }

    /// Serves `len` bytes at `pos` from the cache, refilling from `file` if
    /// the range isn't already resident.
    fn read(&mut self, file: &mut File, pos: u64, len: usize) -> std::io::Result<&[u8]> {
        let resident = self.file_pos != u64::MAX
            && pos >= self.file_pos
            && pos + len as u64 <= self.file_pos + self.valid_len as u64;
        if !resident {
            let read_len = self.buf.len().max(len);
            if self.buf.len() < read_len {
                self.buf.resize(read_len, 0);
            }
            file.seek(SeekFrom::Start(pos))?;
            let mut total = 0;
            while total < read_len {
                let n = file.read(&mut self.buf[total..read_len])?;
                if n == 0 {
                    break;
                }
                total += n;
            }
            self.file_pos = pos;
            self.valid_len = total;
        }
        let start = (pos - self.file_pos) as usize;
        Ok(&self.buf[start..start + len])
    }
}

enum Layout {
    Iso,
    Cso1 { index: Vec<u32>, index_shift: u8 },
    Cso2 { index: Vec<u32>, index_shift: u8 },
    Zso { index: Vec<u32>, index_shift: u8 },
    Dax { positions: Vec<u32>, sizes: Vec<u16>, nc_areas: Vec<dax::NcArea> },
}

pub struct Input {
    file: File,
    layout: Layout,
    total_size: u64,
    block_size: u32,
    cache: ReadAheadCache,
    pos: u64,
    paused: bool,
}

impl Input {
    pub fn open(path: &std::path::Path) -> TaskResult<Self> {
        let mut file = File::open(path).map_err(|e| bad_input(format!("open failed: {e}")))?;
        let mut header = [0u8; 24];
        let n = file
            .read(&mut header)
            .map_err(|e| bad_input(format!("header read failed: {e}")))?;

        let first4: [u8; 4] = header[0..4].try_into().unwrap();
        let kind = if n < 24 {
            DetectedFormat::Iso
        } else {
            detect_fingerprint(&first4)
        };

        match kind {
            DetectedFormat::Iso => Self::open_iso(file),
            DetectedFormat::Zso => Self::open_cso_like(file, &header, true),
            DetectedFormat::Cso1 => Self::open_cso_like(file, &header, false),
            DetectedFormat::Dax => Self::open_dax(file, &header),
            DetectedFormat::Cso2 => unreachable!("disambiguated after header parse"),
        }
    }

    fn open_iso(mut file: File) -> TaskResult<Self> {
        let total_size = file
            .seek(SeekFrom::End(0))
            .map_err(|e| bad_input(format!("fstat failed: {e}")))?;
        if total_size % SECTOR_SIZE as u64 != 0 {
            return Err(bad_input("ISO size is not a multiple of 2048"));
        }
        let block_size = SECTOR_SIZE;
        Ok(Input {
            file,
            layout: Layout::Iso,
            total_size,
            block_size,
            cache: ReadAheadCache::new(read_ahead_size(block_size)),
            pos: 0,
            paused: false,
        })
    }

    fn open_cso_like(mut file: File, header: &[u8; 24], is_zso: bool) -> TaskResult<Self> {
        let h = cso::CsoHeader::from_bytes(header);
        if h.version != 1 && h.version != 2 {
            return Err(bad_input("unsupported CSO version"));
        }
        if h.sector_size < SECTOR_SIZE || !h.sector_size.is_power_of_two() {
            return Err(bad_input("block size out of range"));
        }
        if h.uncompressed_size % SECTOR_SIZE as u64 != 0 {
            return Err(bad_input("uncompressed size is not a multiple of 2048"));
        }
        let sectors = ((h.uncompressed_size + h.sector_size as u64 - 1) / h.sector_size as u64) as usize;
        let index_bytes_len = (sectors + 1) * 4;
        let mut index_bytes = vec![0u8; index_bytes_len];
        file.read_exact(&mut index_bytes)
            .map_err(|e| bad_input(format!("short read of index: {e}")))?;
        let index = cso::parse_index(&index_bytes);

        let layout = if is_zso {
            Layout::Zso { index, index_shift: h.index_shift }
        } else if h.version == 2 {
            Layout::Cso2 { index, index_shift: h.index_shift }
        } else {
            Layout::Cso1 { index, index_shift: h.index_shift }
        };

        Ok(Input {
            file,
            layout,
            total_size: h.uncompressed_size,
            block_size: h.sector_size,
            cache: ReadAheadCache::new(read_ahead_size(h.sector_size)),
            pos: 0,
            paused: false,
        })
    }

    fn open_dax(mut file: File, header: &[u8; 24]) -> TaskResult<Self> {
        let h = dax::DaxHeader::from_bytes(header);
        if h.uncompressed_size as u64 % SECTOR_SIZE as u64 != 0 {
            return Err(bad_input("uncompressed size is not a multiple of 2048"));
        }
        let sectors = (h.uncompressed_size as u64 / dax::FRAME_SIZE as u64) as usize
            + if h.uncompressed_size as u64 % dax::FRAME_SIZE as u64 != 0 { 1 } else { 0 };

        let mut positions_buf = vec![0u8; sectors * 4];
        file.read_exact(&mut positions_buf)
            .map_err(|e| bad_input(format!("short read of DAX positions: {e}")))?;
        let mut sizes_buf = vec![0u8; sectors * 2];
        file.read_exact(&mut sizes_buf)
            .map_err(|e| bad_input(format!("short read of DAX sizes: {e}")))?;
        let mut nc_areas = Vec::new();
        if h.nc_areas > 0 {
            let mut nc_buf = vec![0u8; h.nc_areas as usize * 8];
            file.read_exact(&mut nc_buf)
                .map_err(|e| bad_input(format!("short read of DAX NC areas: {e}")))?;
            nc_areas = dax::parse_nc_areas(&nc_buf);
        }

        Ok(Input {
            file,
            layout: Layout::Dax {
                positions: dax::parse_positions(&positions_buf),
                sizes: dax::parse_sizes(&sizes_buf),
                nc_areas,
            },
            total_size: h.uncompressed_size as u64,
            block_size: dax::FRAME_SIZE,
            cache: ReadAheadCache::new(read_ahead_size(dax::FRAME_SIZE)),
            pos: 0,
            paused: false,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_done(&self) -> bool {
        self.pos >= self.total_size
    }

    /// Reads and decompresses the next logical block, returning its raw
    /// bytes split into 2 KiB sectors tagged with their absolute position.
    /// Returns `Ok(None)` when the stream is exhausted.
    pub fn next_block(&mut self) -> TaskResult<Option<(u64, Vec<u8>)>> {
        if self.is_done() {
            return Ok(None);
        }
        let pos = self.pos;
        let mut block = match &self.layout {
            Layout::Iso => self.read_iso_block(pos)?,
            Layout::Cso1 { .. } => self.read_cso1_block(pos)?,
            Layout::Cso2 { .. } => self.read_cso2_block(pos)?,
            Layout::Zso { .. } => self.read_zso_block(pos)?,
            Layout::Dax { .. } => self.read_dax_block(pos)?,
        };
        self.pos += self.block_size as u64;
        // The compressed formats always decode a full block_size of
        // content (the encoder zero-pads the final block's tail sectors to
        // complete it); truncate that padding here so a caller folding
        // these bytes in sequence (checksum, or re-emitting through another
        // Output) never sees bytes past the source's true length, matching
        // the ISO path's own `remaining_at`-bounded read.
        let true_len = self.remaining_at(pos);
        block.truncate(true_len);
        Ok(Some((pos, block)))
    }

    fn remaining_at(&self, pos: u64) -> usize {
        (self.total_size - pos).min(self.block_size as u64) as usize
    }

    fn read_iso_block(&mut self, pos: u64) -> TaskResult<Vec<u8>> {
        let len = self.remaining_at(pos);
        let data = self
            .cache
            .read(&mut self.file, pos, len)
            .map_err(|e| bad_input(format!("short read: {e}")))?;
        Ok(data.to_vec())
    }

    fn read_cso1_block(&mut self, pos: u64) -> TaskResult<Vec<u8>> {
        let (index, index_shift) = match &self.layout {
            Layout::Cso1 { index, index_shift } => (index, *index_shift),
            _ => unreachable!(),
        };
        let i = (pos / self.block_size as u64) as usize;
        let entry = index[i];
        let next_entry = index[i + 1];
        let off = (cso::cso1_entry_offset(entry) as u64) << index_shift;
        let next_off = (cso::cso1_entry_offset(next_entry) as u64) << index_shift;
        let len = (next_off - off) as usize;
        let kind = cso::cso1_entry_kind(entry);

        let raw = self
            .cache
            .read(&mut self.file, off, len)
            .map_err(|e| bad_input(format!("short read: {e}")))?
            .to_vec();

        match kind {
            cso::Cso1EntryKind::Uncompressed => {
                if raw.len() < self.remaining_at(pos) {
                    return Err(invalid_data("produced fewer than 2048 bytes"));
                }
                Ok(raw)
            }
            cso::Cso1EntryKind::Compressed => {
                let out = zlib::inflate(&raw, false, self.block_size as usize)
                    .map_err(|e| invalid_data(e))?;
                if out.len() < 2048 {
                    return Err(invalid_data("produced fewer than 2048 bytes"));
                }
                Ok(out)
            }
        }
    }

    fn read_cso2_block(&mut self, pos: u64) -> TaskResult<Vec<u8>> {
        let (index, index_shift) = match &self.layout {
            Layout::Cso2 { index, index_shift } => (index, *index_shift),
            _ => unreachable!(),
        };
        let i = (pos / self.block_size as u64) as usize;
        let entry = index[i];
        let next_entry = index[i + 1];
        let off = (cso::cso1_entry_offset(entry) as u64) << index_shift;
        let next_off = (cso::cso1_entry_offset(next_entry) as u64) << index_shift;
        let len = (next_off - off) as usize;
        let kind = cso::cso2_block_kind(entry, next_entry, self.block_size);

        let raw = self
            .cache
            .read(&mut self.file, off, len)
            .map_err(|e| bad_input(format!("short read: {e}")))?
            .to_vec();

        let out = match kind {
            cso::Cso2BlockKind::Raw => raw,
            cso::Cso2BlockKind::Lz4 => lz4_trial::decompress_block(&raw, self.block_size as i32)
                .map_err(invalid_data)?,
            cso::Cso2BlockKind::Deflate => {
                zlib::inflate(&raw, false, self.block_size as usize).map_err(invalid_data)?
            }
        };
        if out.len() > self.block_size as usize {
            return Err(invalid_data("produced more than block_size bytes"));
        }
        if out.len() < 2048 {
            return Err(invalid_data("produced fewer than 2048 bytes"));
        }
        Ok(out)
    }

    fn read_zso_block(&mut self, pos: u64) -> TaskResult<Vec<u8>> {
        let (index, index_shift) = match &self.layout {
            Layout::Zso { index, index_shift } => (index, *index_shift),
            _ => unreachable!(),
        };
        let i = (pos / self.block_size as u64) as usize;
        let entry = index[i];
        let next_entry = index[i + 1];
        let off = (cso::cso1_entry_offset(entry) as u64) << index_shift;
        let next_off = (cso::cso1_entry_offset(next_entry) as u64) << index_shift;
        let len = (next_off - off) as usize;
        let kind = cso::cso1_entry_kind(entry);

        let raw = self
            .cache
            .read(&mut self.file, off, len)
            .map_err(|e| bad_input(format!("short read: {e}")))?
            .to_vec();

        match kind {
            cso::Cso1EntryKind::Uncompressed => Ok(raw),
            cso::Cso1EntryKind::Compressed => {
                let out = lz4_frame::unwrap_frame(&raw, self.block_size as usize)
                    .map_err(invalid_data)?;
                if out.len() < 2048 {
                    return Err(invalid_data("produced fewer than 2048 bytes"));
                }
                Ok(out)
            }
        }
    }

    fn read_dax_block(&mut self, pos: u64) -> TaskResult<Vec<u8>> {
        let (positions, sizes, nc_areas) = match &self.layout {
            Layout::Dax { positions, sizes, nc_areas } => (positions, sizes, nc_areas),
            _ => unreachable!(),
        };
        let i = (pos / self.block_size as u64) as usize;
        let off = positions[i] as u64;
        let size = sizes[i] as usize;

        let raw = self
            .cache
            .read(&mut self.file, off, size)
            .map_err(|e| bad_input(format!("short read: {e}")))?
            .to_vec();

        if dax::frame_in_nc_area(i as u32, nc_areas) {
            return Ok(raw);
        }
        let out = zlib::inflate(&raw, true, self.block_size as usize).map_err(invalid_data)?;
        if out.len() < 2048 {
            return Err(invalid_data("produced fewer than 2048 bytes"));
        }
        Ok(out)
    }
}

fn read_ahead_size(block_size: u32) -> usize {
    (block_size as usize).max(MIN_READ_AHEAD).next_power_of_two()
}
