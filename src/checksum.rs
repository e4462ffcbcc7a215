//! Checksum-only task path: folds each decoded block into a running CRC-32
//! in logical order, using an ordered map to absorb out-of-order completions
//! the same way `Output`'s write-reorder buffer does for compressed output.

use std::collections::BTreeMap;

use crc32fast::Hasher;

use crate::error::TaskResult;
use crate::input::Input;

/// Drives `input` to completion, folding every sector into a CRC-32 in
/// strict logical order, and returns the formatted result — grounded on the
/// original's `"CRC32: %08x"` success message.
pub fn run(input: &mut Input) -> TaskResult<String> {
    let mut hasher = Hasher::new();
    let mut next_pos: u64 = 0;
    let mut pending: BTreeMap<u64, Vec<u8>> = BTreeMap::new();

    while let Some((pos, block)) = input.next_block()? {
        pending.insert(pos, block);
        while let Some(block) = pending.remove(&next_pos) {
            hasher.update(&block);
            next_pos += block.len() as u64;
        }
    }

    Ok(format!("CRC32: {:08x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn checksum_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.iso");
        let mut data = vec![0u8; 2048 * 4];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        std::fs::File::create(&path).unwrap().write_all(&data).unwrap();

        let mut input = Input::open(&path).unwrap();
        let reported = run(&mut input).unwrap();

        let mut hasher = Hasher::new();
        hasher.update(&data);
        let expected = format!("CRC32: {:08x}", hasher.finalize());
        assert_eq!(reported, expected);
    }
}
