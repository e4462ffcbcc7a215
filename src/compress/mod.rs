//! Per-block compression trials.
//!
//! Each trial is a small, independently gated wrapper around one real
//! compressor; `Sector` (see `crate::sector`) owns a set of these, runs the
//! enabled subset over a block's raw bytes, and keeps whichever result wins
//! under its active cost policy.

pub mod lz4_frame;
pub mod lz4_trial;
pub mod sevenzip;
pub mod zlib;
pub mod zopfli_trial;

use crate::task::TaskFlags;
use zlib::{ZlibStrategy, ZlibTrial};

/// The compression format a candidate buffer was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorFormat {
    /// Stored uncompressed (the original block bytes, verbatim).
    Orig,
    Deflate,
    Lz4,
}

/// One candidate result produced by a trial: the compressed bytes and which
/// family produced them (needed by `submit_trial`'s cross-family tolerance
/// rules and by `Output::update_index`'s per-container flag rules).
pub struct Candidate {
    pub format: SectorFormat,
    pub data: Vec<u8>,
}

/// Holds one reusable encoder context per enabled trial for a single
/// `Sector` slot, so repeated `run_all` calls across blocks reuse allocator
/// state rather than re-initializing a `z_stream`/LZ4 context per block.
pub struct TrialSet {
    with_header: bool,
    zlib_default: Option<ZlibTrial>,
    zlib_filtered: Option<ZlibTrial>,
    zlib_huffman: Option<ZlibTrial>,
    zlib_rle: Option<ZlibTrial>,
    zopfli: Option<zopfli_trial::ZopfliTrial>,
    sevenzip: Option<sevenzip::SevenZipTrial>,
    lz4_default: bool,
    lz4_hc_levels: &'static [i32],
}

impl TrialSet {
    /// Builds the enabled trial set for one task's flags. `with_header`
    /// selects raw-deflate (CSO/ZSO) vs zlib-wrapped (DAX) framing for the
    /// deflate-family trials.
    pub fn new(flags: TaskFlags, with_header: bool) -> Self {
        let brute = flags.contains(TaskFlags::FORCE_ALL);

        let zlib_default = (!flags.contains(TaskFlags::NO_ZLIB_DEFAULT))
            .then(|| ZlibTrial::new(ZlibStrategy::Default, with_header));
        let zlib_brute = !flags.contains(TaskFlags::NO_ZLIB_BRUTE);
        let zlib_filtered = zlib_brute.then(|| ZlibTrial::new(ZlibStrategy::Filtered, with_header));
        let zlib_huffman = zlib_brute.then(|| ZlibTrial::new(ZlibStrategy::HuffmanOnly, with_header));
        let zlib_rle = zlib_brute.then(|| ZlibTrial::new(ZlibStrategy::Rle, with_header));

        let zopfli = (!flags.contains(TaskFlags::NO_ZOPFLI))
            .then(|| zopfli_trial::ZopfliTrial::new(with_header));
        let sevenzip = (!flags.contains(TaskFlags::NO_7ZIP))
            .then(|| sevenzip::SevenZipTrial::new(with_header));

        let lz4_default = !flags.contains(TaskFlags::NO_LZ4_DEFAULT);
        let lz4_hc_levels = if flags.contains(TaskFlags::NO_LZ4_HC) {
            &[][..]
        } else {
            lz4_trial::hc_levels(brute && !flags.contains(TaskFlags::NO_LZ4_HC_BRUTE))
        };

        TrialSet {
            with_header,
            zlib_default,
            zlib_filtered,
            zlib_huffman,
            zlib_rle,
            zopfli,
            sevenzip,
            lz4_default,
            lz4_hc_levels,
        }
    }

    /// Runs every enabled trial over `block` and returns all candidates that
    /// produced output, in the original's trial order (zlib family first,
    /// then zopfli, then 7-zip, then LZ4 family) so ties break the same way
    /// `submit_trial` expects.
    pub fn run_all(&mut self, block: &[u8]) -> Vec<Candidate> {
        let mut out = Vec::new();

        for trial in [
            &mut self.zlib_default,
            &mut self.zlib_filtered,
            &mut self.zlib_huffman,
            &mut self.zlib_rle,
        ] {
            if let Some(t) = trial {
                if let Some(data) = t.run(block) {
                    out.push(Candidate { format: SectorFormat::Deflate, data });
                }
            }
        }

        if let Some(t) = &self.zopfli {
            if let Some(data) = t.run(block) {
                out.push(Candidate { format: SectorFormat::Deflate, data });
            }
        }

        if let Some(t) = &mut self.sevenzip {
            if let Some(data) = t.run(block) {
                out.push(Candidate { format: SectorFormat::Deflate, data });
            }
        }

        if self.lz4_default {
            if let Some(data) = lz4_trial::compress_default(block) {
                out.push(Candidate { format: SectorFormat::Lz4, data });
            }
        }
        for &level in self.lz4_hc_levels {
            if let Some(data) = lz4_trial::compress_hc(block, level) {
                out.push(Candidate { format: SectorFormat::Lz4, data });
            }
        }

        out
    }

    pub fn with_header(&self) -> bool {
        self.with_header
    }
}
