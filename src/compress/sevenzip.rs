//! "7-zip deflate" trial.
//!
//! No crate in this ecosystem binds 7-zip's bespoke deflate matcher (it's
//! not part of `p7zip`'s published Rust bindings, and no pure-Rust
//! reimplementation exists on crates.io). Rather than fabricate a dependency,
//! this trial runs zlib's own matcher at level 10 ("uber compression" in
//! miniz_oxide's probe table, one step past the level-9 default-strategy
//! trial), gated independently by `NO_7ZIP` — see DESIGN.md for the
//! substitution rationale. It typically loses to the Zopfli trial but
//! occasionally wins on data where Zopfli's iteration budget undershoots.

use crate::compress::zlib::{ZlibStrategy, ZlibTrial};

const LEVEL: i32 = 10;

pub struct SevenZipTrial {
    inner: ZlibTrial,
}

impl SevenZipTrial {
    pub fn new(with_header: bool) -> Self {
        SevenZipTrial {
            inner: ZlibTrial::with_level(ZlibStrategy::Default, with_header, LEVEL),
        }
    }

    pub fn run(&mut self, input: &[u8]) -> Option<Vec<u8>> {
        self.inner.run(input)
    }
}
