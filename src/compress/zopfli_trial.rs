//! Zopfli trial (5 iterations, last-block splitting enabled), using the
//! pure-Rust `zopfli` crate instead of linking the C zopfli library.

use std::num::NonZeroU64;

use zopfli::{Format, Options};

pub struct ZopfliTrial {
    options: Options,
    format: Format,
}

impl ZopfliTrial {
    pub fn new(with_header: bool) -> Self {
        let options = Options {
            iteration_count: NonZeroU64::new(5).unwrap(),
            ..Options::default()
        };
        ZopfliTrial {
            options,
            format: if with_header {
                Format::Zlib
            } else {
                Format::Deflate
            },
        }
    }

    pub fn run(&self, input: &[u8]) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        zopfli::compress(&self.options, &self.format, input, &mut out).ok()?;
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}
