//! zlib-family deflate trials, reusable per-`Sector` encoder contexts.
//!
//! Built on `miniz_oxide::deflate::core`, which exposes zlib's strategy knob
//! (filtered / huffman-only / RLE) directly rather than just a compression
//! level, without linking a system zlib.

use miniz_oxide::deflate::core::{
    compress, create_comp_flags_from_zip_params, CompressorOxide, TDEFLFlush, TDEFLStatus,
};
use miniz_oxide::inflate::decompress_to_vec_with_limit;
use miniz_oxide::inflate::decompress_to_vec_zlib_with_limit;

const LEVEL: i32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZlibStrategy {
    Default,
    Filtered,
    HuffmanOnly,
    Rle,
}

impl ZlibStrategy {
    fn as_miniz_strategy(self) -> i32 {
        // Matches miniz_oxide's zlib-compatible strategy constants, which in
        // turn match the `Z_*` constants `deflateInit2` takes in the original.
        match self {
            ZlibStrategy::Default => 0,
            ZlibStrategy::Filtered => 1,
            ZlibStrategy::HuffmanOnly => 2,
            ZlibStrategy::Rle => 3,
        }
    }
}

/// One reusable deflate context for a single (strategy, header) pair. A
/// `Sector` owns one per enabled strategy and calls `run` once per block,
/// exactly mirroring `deflateReset` + `deflate(Z_FINISH)` in the original.
pub struct ZlibTrial {
    strategy: ZlibStrategy,
    with_header: bool,
    compressor: CompressorOxide,
}

impl ZlibTrial {
    pub fn new(strategy: ZlibStrategy, with_header: bool) -> Self {
        Self::with_level(strategy, with_header, LEVEL)
    }

    /// Same as `new`, but with an explicit zip-style level (0-10) instead of
    /// the default 9. miniz_oxide indexes its match-finder probe count by
    /// this value up to 10, one more than zlib's own max of 9, so level 10
    /// spends more probes per match than `new`'s level 9 ever does.
    pub fn with_level(strategy: ZlibStrategy, with_header: bool, level: i32) -> Self {
        let window_bits = if with_header { 15 } else { -15 };
        let flags =
            create_comp_flags_from_zip_params(level, window_bits, strategy.as_miniz_strategy());
        ZlibTrial {
            strategy,
            with_header,
            compressor: CompressorOxide::new(flags),
        }
    }

    pub fn strategy(&self) -> ZlibStrategy {
        self.strategy
    }

    /// Compresses `input` in one shot, growing the output buffer as needed.
    /// Returns `None` if the stream never reaches `Done` (should not happen
    /// for well-formed input; treated the same as the original's
    /// `res != Z_STREAM_END` failure path).
    pub fn run(&mut self, input: &[u8]) -> Option<Vec<u8>> {
        self.compressor.reset();

        let mut out = vec![0u8; (input.len() / 2).max(64)];
        let mut in_pos = 0;
        let mut out_pos = 0;
        loop {
            let (status, bytes_in, bytes_out) = compress(
                &mut self.compressor,
                &input[in_pos..],
                &mut out[out_pos..],
                TDEFLFlush::Finish,
            );
            in_pos += bytes_in;
            out_pos += bytes_out;

            match status {
                TDEFLStatus::Done => {
                    out.truncate(out_pos);
                    return Some(out);
                }
                TDEFLStatus::Okay => {
                    if out.len().saturating_sub(out_pos) < 32 {
                        let new_len = (out.len() * 2).max(out.len() + 64);
                        out.resize(new_len, 0);
                    } else if bytes_in == 0 && bytes_out == 0 {
                        return None;
                    }
                }
                _ => return None,
            }
        }
    }
}

/// Raw-deflate or zlib-wrapped inflate with a known maximum output size
/// (always exactly one block/sector; errors if decompression would produce
/// more than `block_size` bytes).
pub fn inflate(data: &[u8], with_header: bool, max_len: usize) -> Result<Vec<u8>, String> {
    let result = if with_header {
        decompress_to_vec_zlib_with_limit(data, max_len)
    } else {
        decompress_to_vec_with_limit(data, max_len)
    };
    result.map_err(|e| format!("inflate failed: {:?}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_raw_deflate() {
        let input = vec![0xA5u8; 4096];
        let mut trial = ZlibTrial::new(ZlibStrategy::Default, false);
        let compressed = trial.run(&input).expect("compress");
        assert!(compressed.len() < input.len());
        let back = inflate(&compressed, false, input.len()).expect("inflate");
        assert_eq!(back, input);
    }

    #[test]
    fn round_trips_zlib_wrapped() {
        let input: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let mut trial = ZlibTrial::new(ZlibStrategy::Rle, true);
        let compressed = trial.run(&input).expect("compress");
        let back = inflate(&compressed, true, input.len()).expect("inflate");
        assert_eq!(back, input);
    }

    #[test]
    fn reused_context_is_stable_across_blocks() {
        let mut trial = ZlibTrial::new(ZlibStrategy::Filtered, false);
        let a = vec![1u8; 2048];
        let b = vec![2u8; 2048];
        let ca = trial.run(&a).unwrap();
        let cb = trial.run(&b).unwrap();
        assert_eq!(inflate(&ca, false, a.len()).unwrap(), a);
        assert_eq!(inflate(&cb, false, b.len()).unwrap(), b);
    }
}
