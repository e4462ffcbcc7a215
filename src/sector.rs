//! `Sector` — the per-block trial engine: fills a pooled buffer, runs every
//! enabled compressor over it, and keeps whichever candidate wins under the
//! active cost policy.

use crate::compress::{Candidate, SectorFormat, TrialSet};
use crate::pool::{alloc, PoolBuffer};
use crate::task::TaskFlags;

/// Cost tolerances in bytes, threaded through from `Task`.
#[derive(Debug, Clone, Copy)]
pub struct CostPolicy {
    pub orig_max_cost: u32,
    pub lz4_max_cost: u32,
    /// True for DAX output: there is no inline "store raw" encoding, so the
    /// first real compressed trial always wins regardless of size.
    pub dax_override: bool,
}

/// A reusable work unit for one logical block. Pre-allocated in a
/// fixed-size free list and reused across blocks by `Output`.
pub struct Sector {
    block_size: usize,
    buf: PoolBuffer,
    ready_size: usize,
    busy: bool,
    trials: TrialSet,
    policy: CostPolicy,
    best_format: SectorFormat,
    best_data: Vec<u8>,
}

impl Sector {
    pub fn new(block_size: usize, flags: TaskFlags, with_header: bool, policy: CostPolicy) -> Self {
        let mut buf = alloc();
        if buf.len() < block_size {
            // The pool's configured size must be >= block_size; `TaskRunner`
            // calls `pool::set_buffer_size` before building Sectors, so this
            // only fires if that contract is violated.
            panic!("pool buffer size {} smaller than block_size {}", buf.len(), block_size);
        }
        buf.as_mut_slice()[..block_size].fill(0);
        Sector {
            block_size,
            buf,
            ready_size: 0,
            busy: false,
            trials: TrialSet::new(flags, with_header),
            policy,
            best_format: SectorFormat::Orig,
            best_data: Vec::new(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_ready(&self) -> bool {
        self.ready_size == self.block_size
    }

    /// Bytes already fed in via `process`, always a multiple of 2048.
    pub fn filled_len(&self) -> usize {
        self.ready_size
    }

    /// Places one raw 2 KiB sector at `pos & (block_size-1)`. `pos` is the
    /// absolute logical byte offset; the caller guarantees it falls within
    /// this Sector's block.
    pub fn process(&mut self, pos: u64, raw_sector: &[u8]) {
        debug_assert_eq!(raw_sector.len(), 2048);
        self.busy = true;
        let offset = (pos as usize) & (self.block_size - 1);
        self.buf.as_mut_slice()[offset..offset + raw_sector.len()].copy_from_slice(raw_sector);
        self.ready_size += raw_sector.len();
    }

    /// Runs the enabled trials in spec order, keeping the smallest result
    /// under the cost policy. Returns the best (format, size).
    pub fn compress(&mut self) -> (SectorFormat, usize) {
        let block = self.buf.as_slice()[..self.block_size].to_vec();
        let candidates = self.trials.run_all(&block);

        self.best_format = SectorFormat::Orig;
        self.best_data = Vec::new();

        for candidate in candidates {
            self.submit_trial(candidate);
        }

        (self.best_format, self.best_size())
    }

    fn best_size(&self) -> usize {
        if self.best_format == SectorFormat::Orig {
            self.block_size
        } else {
            self.best_data.len()
        }
    }

    /// The cost-tolerance candidate-selection policy: compares a new
    /// candidate against the current best under `self.policy` and accepts
    /// it only if it wins outright for its format family.
    fn submit_trial(&mut self, candidate: Candidate) {
        let size = candidate.data.len() as u32;

        if self.best_format == SectorFormat::Orig {
            if self.policy.dax_override {
                self.accept(candidate);
            } else if size + self.policy.orig_max_cost < self.block_size as u32 {
                self.accept(candidate);
            }
            return;
        }

        let best = self.best_size() as u32;
        let wins = match (candidate.format, self.best_format) {
            (SectorFormat::Lz4, SectorFormat::Deflate) => size <= best + self.policy.lz4_max_cost,
            (SectorFormat::Deflate, SectorFormat::Lz4) => size + self.policy.lz4_max_cost < best,
            _ => size + self.policy.orig_max_cost < best,
        };
        if wins {
            self.accept(candidate);
        }
    }

    fn accept(&mut self, candidate: Candidate) {
        self.best_format = candidate.format;
        self.best_data = candidate.data;
    }

    /// `finalize_best` — discards the compressed result if alignment erases
    /// its savings, except under DAX (no inline raw encoding).
    pub fn finalize_best(&mut self, index_align: u32) {
        if self.best_format == SectorFormat::Orig || self.policy.dax_override {
            return;
        }
        let aligned = align_up(self.best_data.len() as u32, index_align);
        if aligned >= self.block_size as u32 {
            self.best_format = SectorFormat::Orig;
            self.best_data = Vec::new();
        }
    }

    pub fn best_format(&self) -> SectorFormat {
        self.best_format
    }

    /// The bytes to write: either the compressed candidate, or the raw
    /// accumulated block.
    pub fn best_bytes(&self) -> &[u8] {
        if self.best_format == SectorFormat::Orig {
            &self.buf.as_slice()[..self.block_size]
        } else {
            &self.best_data
        }
    }

    /// The original, uncompressed accumulated block bytes — still resident
    /// even after a compressed candidate has become `best`.
    pub fn raw_block(&self) -> &[u8] {
        &self.buf.as_slice()[..self.block_size]
    }

    /// Resets state so this Sector can be reused for the next block.
    pub fn reset(&mut self) {
        self.ready_size = 0;
        self.busy = false;
        self.best_format = SectorFormat::Orig;
        self.best_data.clear();
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CostPolicy {
        CostPolicy { orig_max_cost: 0, lz4_max_cost: 0, dax_override: false }
    }

    #[test]
    fn highly_compressible_block_beats_raw() {
        crate::pool::set_buffer_size(16384);
        let mut sector = Sector::new(2048, TaskFlags::empty(), false, policy());
        sector.process(0, &[0u8; 2048]);
        assert!(sector.is_ready());
        let (fmt, size) = sector.compress();
        assert_ne!(fmt, SectorFormat::Orig);
        assert!(size < 2048);
    }

    #[test]
    fn incompressible_block_falls_back_to_orig_after_finalize() {
        crate::pool::set_buffer_size(16384);
        let mut flags = TaskFlags::empty();
        flags.insert(TaskFlags::NO_ZLIB_BRUTE);
        flags.insert(TaskFlags::NO_ZOPFLI);
        flags.insert(TaskFlags::NO_7ZIP);
        flags.insert(TaskFlags::NO_LZ4_HC);
        let mut sector = Sector::new(2048, flags, false, policy());
        // Pseudo-random incompressible content.
        let mut raw = [0u8; 2048];
        let mut x: u32 = 0x9E3779B9;
        for b in raw.iter_mut() {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            *b = (x & 0xFF) as u8;
        }
        sector.process(0, &raw);
        sector.compress();
        // Regardless of whether some trial squeezed out a few bytes, a
        // generous index_align forces it back to ORIG.
        sector.finalize_best(2048);
        assert_eq!(sector.best_format(), SectorFormat::Orig);
        assert_eq!(sector.best_bytes().len(), 2048);
    }

    #[test]
    fn dax_override_keeps_first_compressed_trial_even_if_larger_than_tolerance() {
        crate::pool::set_buffer_size(16384);
        let policy = CostPolicy { orig_max_cost: 0, lz4_max_cost: 0, dax_override: true };
        let mut sector = Sector::new(2048, TaskFlags::empty(), true, policy);
        sector.process(0, &[7u8; 2048]);
        let (fmt, _) = sector.compress();
        assert_ne!(fmt, SectorFormat::Orig);
        sector.finalize_best(2048);
        assert_ne!(sector.best_format(), SectorFormat::Orig);
    }
}
