//! `Output` — index-shift selection, block alignment, ordered/coalesced
//! writes, header+index finalization.
//!
//! Each ready `Sector`'s compression is dispatched onto the Rayon thread
//! pool; completions are reordered through a map keyed by logical position
//! before being written, so writes stay strictly sequential even though
//! compression itself runs out of order.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use crossbeam_channel::{Receiver, Sender};

use crate::compress::{lz4_frame, SectorFormat};
use crate::container::{cso, dax, CsoFormat, SECTOR_SIZE};
use crate::error::{bad_output, cannot_write, invalid_option, TaskResult};
use crate::sector::{CostPolicy, Sector};
use crate::task::TaskFlags;

const FAN_OUT: usize = 16;

struct ReadySector {
    pos: u64,
    format: SectorFormat,
    data: Vec<u8>,
    sector: Option<Box<Sector>>,
}

pub struct Output {
    file: File,
    format: CsoFormat,
    decompress_mode: bool,
    src_size: u64,
    src_pos: u64,
    dst_pos: u64,
    block_size: u32,
    index_shift: u8,
    index_align: u32,
    sectors: usize,

    cso_index: Vec<u32>,
    dax_positions: Vec<u32>,
    dax_sizes: Vec<u16>,

    flags: TaskFlags,
    policy: CostPolicy,
    with_header: bool,

    free_sectors: Vec<Box<Sector>>,
    partial: HashMap<u64, Box<Sector>>,
    in_flight: usize,
    queue_capacity: usize,

    ready_tx: Sender<ReadySector>,
    ready_rx: Receiver<ReadySector>,
    pending: BTreeMap<u64, ReadySector>,

    index_ready: bool,
    data_written: bool,
}

impl Output {
    #[allow(clippy::too_many_arguments)]
    pub fn set_file(
        mut file: File,
        src_size: u64,
        block_size: u32,
        format: CsoFormat,
        flags: TaskFlags,
        policy: CostPolicy,
        queue_capacity: usize,
    ) -> TaskResult<Self> {
        if block_size < SECTOR_SIZE || !block_size.is_power_of_two() {
            return Err(invalid_option("block size must be a power of two >= 2048"));
        }
        let decompress_mode = flags.contains(TaskFlags::DECOMPRESS);
        let sectors = ((src_size + block_size as u64 - 1) / block_size as u64) as usize;
        let with_header = matches!(format, CsoFormat::Dax);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(queue_capacity.max(1));

        // CSO v1 has no on-disk way to mark a block LZ4-compressed, ZSO's
        // single uncompressed/compressed bit has no way to mark a block
        // deflate-compressed (its compressed blocks are always LZ4 frames),
        // and DAX has no LZ4 decode path at all (its frames are always
        // zlib-wrapped deflate or stored raw via an NC-area). Enforce this
        // at the format boundary rather than trust every caller to set the
        // right `--no-*` flags (the CLI's format defaults do, but a `Task`
        // can be built directly too) — letting a DAX block's winning
        // candidate be LZ4 would silently corrupt that frame, since the
        // decoder always zlib-inflates it.
        let flags = match format {
            CsoFormat::Cso1 => flags | TaskFlags::NO_LZ4,
            CsoFormat::Zso => flags | TaskFlags::NO_ZLIB | TaskFlags::NO_ZOPFLI | TaskFlags::NO_7ZIP,
            CsoFormat::Dax => flags | TaskFlags::NO_LZ4,
            CsoFormat::Cso2 => flags,
        };

        if decompress_mode {
            file.set_len(src_size)
                .map_err(|e| bad_output(format!("truncate failed: {e}")))?;
            return Ok(Output {
                file,
                format,
                decompress_mode,
                src_size,
                src_pos: 0,
                dst_pos: 0,
                block_size,
                index_shift: 0,
                index_align: 1,
                sectors,
                cso_index: Vec::new(),
                dax_positions: Vec::new(),
                dax_sizes: Vec::new(),
                flags,
                policy,
                with_header,
                free_sectors: Self::build_free_sectors(queue_capacity, block_size, flags, with_header, policy),
                partial: HashMap::new(),
                in_flight: 0,
                queue_capacity,
                ready_tx,
                ready_rx,
                pending: BTreeMap::new(),
                index_ready: true,
                data_written: false,
            });
        }

        if matches!(format, CsoFormat::Dax) {
            if block_size != dax::FRAME_SIZE {
                return Err(invalid_option("DAX requires block_size = 8192"));
            }
            if src_size >= (1u64 << 32) {
                return Err(invalid_option("DAX requires uncompressed size < 4 GiB"));
            }
        }

        let header_index_bytes: u64 = match format {
            CsoFormat::Dax => 24 + sectors as u64 * 4 + sectors as u64 * 2,
            _ => 24 + (sectors as u64 + 1) * 4,
        };
        let worst = header_index_bytes + src_size;
        let mut index_shift: u8 = 0;
        for i in (31..=62u32).rev() {
            if worst >= (1u64 << i) {
                index_shift = (i - 30) as u8;
                break;
            }
        }
        if matches!(format, CsoFormat::Dax) && index_shift != 0 {
            return Err(invalid_option("DAX requires index_shift = 0"));
        }

        let index_align = 1u32 << index_shift;
        let dst_pos = align_up_u64(header_index_bytes, index_align as u64);

        Ok(Output {
            file,
            format,
            decompress_mode,
            src_size,
            src_pos: 0,
            dst_pos,
            block_size,
            index_shift,
            index_align,
            sectors,
            cso_index: vec![0u32; sectors + 1],
            dax_positions: vec![0u32; sectors],
            dax_sizes: vec![0u16; sectors],
            flags,
            policy,
            with_header,
            free_sectors: Self::build_free_sectors(queue_capacity, block_size, flags, with_header, policy),
            partial: HashMap::new(),
            in_flight: 0,
            queue_capacity,
            ready_tx,
            ready_rx,
            pending: BTreeMap::new(),
            index_ready: false,
            data_written: false,
        })
    }

    fn build_free_sectors(
        n: usize,
        block_size: u32,
        flags: TaskFlags,
        with_header: bool,
        policy: CostPolicy,
    ) -> Vec<Box<Sector>> {
        (0..n)
            .map(|_| Box::new(Sector::new(block_size as usize, flags, with_header, policy)))
            .collect()
    }

    pub fn queue_full(&self) -> bool {
        self.free_sectors.is_empty()
    }

    pub fn src_pos(&self) -> u64 {
        self.src_pos
    }

    pub fn dst_pos(&self) -> u64 {
        self.dst_pos
    }

    fn should_compress(&self) -> bool {
        !self.decompress_mode
    }

    /// Dispatches one raw 2 KiB sector belonging to the block at
    /// `block_pos = pos - (pos % block_size)`.
    pub fn enqueue(&mut self, pos: u64, raw_sector: &[u8]) -> TaskResult<()> {
        let block_pos = pos - (pos % self.block_size as u64);
        let mut sector = match self.partial.remove(&block_pos) {
            Some(s) => s,
            None => self
                .free_sectors
                .pop()
                .ok_or_else(|| invalid_option("enqueue called while queue is full"))?,
        };
        sector.process(pos, raw_sector);

        if sector.is_ready() {
            self.dispatch(block_pos, sector);
        } else {
            self.partial.insert(block_pos, sector);
        }
        Ok(())
    }

    /// Synthesizes zero-filled padding for the final, partially-filled
    /// block so it can complete without more input.
    pub fn flush_tail(&mut self) -> TaskResult<()> {
        let pending: Vec<u64> = self.partial.keys().copied().collect();
        let zeros = [0u8; 2048];
        for block_pos in pending {
            let mut sector = self.partial.remove(&block_pos).unwrap();
            while !sector.is_ready() {
                let offset = sector.filled_len() as u64;
                sector.process(block_pos + offset, &zeros);
            }
            self.dispatch(block_pos, sector);
        }
        Ok(())
    }

    fn dispatch(&mut self, block_pos: u64, mut sector: Box<Sector>) {
        self.in_flight += 1;
        let tx = self.ready_tx.clone();
        let compress = self.should_compress();
        let index_align = self.index_align;
        let is_zso = self.format == CsoFormat::Zso;
        rayon::spawn(move || {
            let format = if compress {
                let (fmt, _) = sector.compress();
                sector.finalize_best(index_align);
                fmt
            } else {
                SectorFormat::Orig
            };
            // ZSO stores compressed blocks as LZ4 frames, not the bare block
            // form Sector's trials produce; re-wrap before writing.
            let data = if is_zso && format == SectorFormat::Lz4 {
                lz4_frame::wrap_frame(sector.raw_block())
                    .unwrap_or_else(|_| sector.best_bytes().to_vec())
            } else {
                sector.best_bytes().to_vec()
            };
            sector.reset();
            let _ = tx.send(ReadySector { pos: block_pos, format, data, sector: Some(sector) });
        });
    }

    /// Drains completed compressions, writes consecutive in-order blocks up
    /// to a fan-out of `FAN_OUT`, and advances `src_pos`/`dst_pos`. Returns
    /// whether any block was written (used by `TaskRunner` to fire progress
    /// and resume Input).
    pub fn drain_ready(&mut self) -> TaskResult<bool> {
        while let Ok(mut ready) = self.ready_rx.try_recv() {
            self.in_flight -= 1;
            if let Some(sector) = ready.sector.take() {
                self.free_sectors.push(sector);
            }
            self.pending.insert(ready.pos, ready);
        }

        let mut wrote_any = false;
        loop {
            let mut batch = Vec::new();
            while batch.len() < FAN_OUT {
                match self.pending.first_key_value() {
                    Some((&pos, _)) if pos == self.src_pos => {
                        let ready = self.pending.remove(&pos).unwrap();
                        self.src_pos += self.block_size as u64;
                        batch.push(ready);
                    }
                    _ => break,
                }
            }
            if batch.is_empty() {
                break;
            }
            self.write_batch(batch)?;
            wrote_any = true;
        }
        Ok(wrote_any)
    }

    fn write_batch(&mut self, batch: Vec<ReadySector>) -> TaskResult<()> {
        self.file
            .seek(SeekFrom::Start(self.dst_pos))
            .map_err(|e| cannot_write(format!("seek failed: {e}")))?;

        for ready in batch {
            let block_index = (ready.pos / self.block_size as u64) as usize;
            self.update_index(block_index, ready.format, ready.data.len())?;

            // In decompress mode the output is the raw image itself: the
            // final block must not leak its zero-padded tail past src_size.
            let write_len = if self.decompress_mode {
                let remaining = self.src_size.saturating_sub(ready.pos);
                (ready.data.len() as u64).min(remaining) as usize
            } else {
                ready.data.len()
            };

            self.file
                .write_all(&ready.data[..write_len])
                .map_err(|e| cannot_write(format!("short write: {e}")))?;
            self.dst_pos += write_len as u64;

            if !self.decompress_mode {
                let padded = align_up_u64(self.dst_pos, self.index_align as u64);
                if padded > self.dst_pos {
                    let pad = vec![0u8; (padded - self.dst_pos) as usize];
                    self.file
                        .write_all(&pad)
                        .map_err(|e| cannot_write(format!("short write: {e}")))?;
                    self.dst_pos = padded;
                }
            }

            if self.src_pos >= self.src_size && !self.decompress_mode {
                self.index_ready = true;
            }
        }

        if self.src_pos >= self.src_size {
            self.data_written = true;
        }
        Ok(())
    }

    fn update_index(&mut self, block_index: usize, format: SectorFormat, size: usize) -> TaskResult<()> {
        if self.decompress_mode {
            return Ok(());
        }
        match self.format {
            CsoFormat::Cso1 => {
                if format == SectorFormat::Lz4 {
                    return Err(invalid_option("LZ4 format not supported within CSO v1 file"));
                }
                let entry = (self.dst_pos >> self.index_shift) as u32;
                self.cso_index[block_index] = if format == SectorFormat::Orig {
                    entry | cso::CSO_INDEX_UNCOMPRESSED
                } else {
                    entry
                };
            }
            CsoFormat::Zso => {
                if format == SectorFormat::Deflate {
                    return Err(invalid_option("deflate format not supported within ZSO file"));
                }
                let entry = (self.dst_pos >> self.index_shift) as u32;
                self.cso_index[block_index] = if format == SectorFormat::Orig {
                    entry | cso::CSO_INDEX_UNCOMPRESSED
                } else {
                    entry
                };
            }
            CsoFormat::Cso2 => {
                let entry = (self.dst_pos >> self.index_shift) as u32;
                self.cso_index[block_index] = if format == SectorFormat::Lz4 {
                    entry | cso::CSO2_INDEX_LZ4
                } else {
                    entry
                };
            }
            CsoFormat::Dax => {
                if format == SectorFormat::Lz4 {
                    return Err(invalid_option("LZ4 format not supported within DAX file"));
                }
                self.dax_positions[block_index] = self.dst_pos as u32;
                self.dax_sizes[block_index] = size as u16;
            }
        }
        Ok(())
    }

    /// Sectors still accumulating raw input (not yet dispatched for
    /// compression). Distinct from `in_flight`: these don't resolve on
    /// their own and need `flush_tail` to push them through.
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_complete(&self) -> bool {
        self.data_written && self.index_ready
    }

    /// Finalizes the file: writes the trailing index entry (CSO/ZSO) or the
    /// positions+sizes arrays and header (DAX), then the header for CSO/ZSO.
    /// A no-op beyond truncation in decompress mode.
    pub fn finish(&mut self) -> TaskResult<()> {
        if self.decompress_mode {
            self.index_ready = true;
            return Ok(());
        }

        match self.format {
            CsoFormat::Cso1 | CsoFormat::Cso2 | CsoFormat::Zso => {
                self.cso_index[self.sectors] = (self.dst_pos >> self.index_shift) as u32;
                let version = if self.format == CsoFormat::Cso2 { 2 } else { 1 };
                let magic = if self.format == CsoFormat::Zso { *cso::ZSO_MAGIC } else { *cso::CSO_MAGIC };
                let header = cso::CsoHeader {
                    magic,
                    header_size: cso::HEADER_SIZE,
                    uncompressed_size: self.src_size,
                    sector_size: self.block_size,
                    version,
                    index_shift: self.index_shift,
                };
                self.file
                    .seek(SeekFrom::Start(0))
                    .map_err(|e| cannot_write(format!("seek failed: {e}")))?;
                self.file
                    .write_all(&header.to_bytes())
                    .map_err(|e| cannot_write(format!("short write: {e}")))?;
                self.file
                    .write_all(&cso::serialize_index(&self.cso_index))
                    .map_err(|e| cannot_write(format!("short write: {e}")))?;
            }
            CsoFormat::Dax => {
                let header = dax::DaxHeader {
                    magic: *dax::DAX_MAGIC,
                    uncompressed_size: self.src_size as u32,
                    version: 1,
                    nc_areas: 0,
                };
                self.file
                    .seek(SeekFrom::Start(0))
                    .map_err(|e| cannot_write(format!("seek failed: {e}")))?;
                self.file
                    .write_all(&header.to_bytes())
                    .map_err(|e| cannot_write(format!("short write: {e}")))?;
                for p in &self.dax_positions {
                    self.file
                        .write_all(&p.to_le_bytes())
                        .map_err(|e| cannot_write(format!("short write: {e}")))?;
                }
                for s in &self.dax_sizes {
                    self.file
                        .write_all(&s.to_le_bytes())
                        .map_err(|e| cannot_write(format!("short write: {e}")))?;
                }
            }
        }
        self.index_ready = true;
        Ok(())
    }
}

fn align_up_u64(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}
