//! LZ4 block trials, built on the `lz4` crate's block API (a thin binding
//! over `liblz4`, so compression levels match the reference implementation
//! 1:1).

use lz4::block::{compress, decompress, CompressionMode};

/// `LZ4_compress_default`.
pub fn compress_default(input: &[u8]) -> Option<Vec<u8>> {
    compress(input, Some(CompressionMode::DEFAULT), false).ok()
}

/// `LZ4_compress_HC` at a specific level (4..=16; brute mode tries
/// 4,7,10,13,16, else just 16).
pub fn compress_hc(input: &[u8], level: i32) -> Option<Vec<u8>> {
    compress(input, Some(CompressionMode::HIGHCOMPRESSION(level)), false).ok()
}

/// Block-form decompress for CSO v2 (the compressed size is already known
/// from the index delta; the decompressed size is always `block_size`).
pub fn decompress_block(input: &[u8], uncompressed_size: i32) -> Result<Vec<u8>, String> {
    decompress(input, Some(uncompressed_size)).map_err(|e| format!("lz4 decompress failed: {e}"))
}

/// Levels tried by the HC trial.
pub fn hc_levels(brute: bool) -> &'static [i32] {
    if brute {
        &[4, 7, 10, 13, 16]
    } else {
        &[16]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips() {
        let input = vec![7u8; 2048];
        let compressed = compress_default(&input).expect("compress");
        let back = decompress_block(&compressed, input.len() as i32).expect("decompress");
        assert_eq!(back, input);
    }

    #[test]
    fn hc_round_trips_at_each_level() {
        let input: Vec<u8> = (0..4096u32).map(|i| (i % 17) as u8).collect();
        for &level in hc_levels(true) {
            let compressed = compress_hc(&input, level).expect("compress");
            let back = decompress_block(&compressed, input.len() as i32).expect("decompress");
            assert_eq!(back, input, "level {level}");
        }
    }
}
