//! LZ4 frame wrap/unwrap for ZSO blocks.
//!
//! ZSO stores its compressed blocks as LZ4 *frames* rather than the bare
//! block format CSO v2 uses, so a reader can length-safely partial-decompress
//! a block without the compressed length being stored in the index (trailing
//! padding is tolerated). `Sector`'s trials always produce block-compressed
//! bytes (the algorithm is the same either way); this module adapts those
//! bytes to and from the framed on-disk form so a ZSO file round-trips
//! through a real LZ4 frame reader.

use std::io::{Read, Write};

use lz4::{Decoder, EncoderBuilder};

/// Highest HC level the block trial (`lz4_trial::hc_levels`) ever tries;
/// used here so the frame re-encode is never weaker than what the trial
/// already picked.
const FRAME_LEVEL: u32 = 16;

/// Wraps a raw LZ4 block payload in a minimal LZ4 frame, for ZSO output.
///
/// The `lz4` crate's frame API has no "wrap this already-compressed block"
/// entry point, so this re-encodes `original_block` through the frame
/// encoder rather than reusing the block trial's output bytes directly. It
/// runs at `FRAME_LEVEL` rather than the encoder's fast default so the
/// framed output matches the strength the winning HC trial already found,
/// instead of silently downgrading to a weaker frame-default encode.
pub fn wrap_frame(original_block: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = EncoderBuilder::new()
        .level(FRAME_LEVEL)
        .build(Vec::new())
        .map_err(|e| format!("lz4 frame encoder init failed: {e}"))?;
    encoder
        .write_all(original_block)
        .map_err(|e| format!("lz4 frame write failed: {e}"))?;
    let (out, result) = encoder.finish();
    result.map_err(|e| format!("lz4 frame finish failed: {e}"))?;
    Ok(out)
}

/// Decodes a ZSO block's LZ4 frame, tolerating trailing padding and not
/// requiring a declared content size up front.
pub fn unwrap_frame(framed: &[u8], max_len: usize) -> Result<Vec<u8>, String> {
    let mut decoder =
        Decoder::new(std::io::Cursor::new(framed)).map_err(|e| format!("lz4 frame decoder init failed: {e}"))?;
    let mut out = Vec::with_capacity(max_len.min(framed.len() * 4));
    let mut chunk = [0u8; 4096];
    loop {
        let n = decoder
            .read(&mut chunk)
            .map_err(|e| format!("lz4 frame read failed: {e}"))?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
        if out.len() > max_len {
            return Err("lz4 frame produced more than block_size bytes".to_string());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        let original: Vec<u8> = (0..2048u32).map(|i| (i % 200) as u8).collect();
        let framed = wrap_frame(&original).expect("wrap");
        let back = unwrap_frame(&framed, original.len()).expect("unwrap");
        assert_eq!(back, original);
    }

    #[test]
    fn frame_tolerates_trailing_padding() {
        let original = vec![9u8; 512];
        let mut framed = wrap_frame(&original).expect("wrap");
        framed.extend_from_slice(&[0u8; 64]);
        let back = unwrap_frame(&framed, original.len()).expect("unwrap");
        assert_eq!(back, original);
    }
}
