//! Command-line shell. A thin collaborator that only talks to the core
//! through `Task` values — argument parsing and flag composition live here,
//! nothing else.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use crate::task::TaskFlags;

#[derive(Parser, Debug)]
#[command(author, version, about = "Convert PSP disc images between ISO and CSO/ZSO/DAX", long_about = None)]
pub struct Args {
    /// One or more input paths (ISO, CSO, ZSO, or DAX)
    pub inputs: Vec<PathBuf>,

    /// Output path, one per input in order; defaults to the input with its
    /// `.iso`/`.ISO` suffix replaced by `.cso`
    #[arg(short = 'o', long = "out")]
    pub out: Vec<PathBuf>,

    /// Worker thread count (defaults to detected CPU count)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Block size in bytes (0 = automatic: 2048, or 16384 above 2 GiB)
    #[arg(long, default_value_t = 0)]
    pub block: u32,

    /// Output container format
    #[arg(long, value_enum, default_value_t = Format::Cso1)]
    pub format: Format,

    #[arg(long)]
    pub quiet: bool,

    /// Compute a CRC-32 of the decompressed content instead of converting
    #[arg(long)]
    pub crc: bool,

    /// Decompress a compressed container back to a raw ISO
    #[arg(long)]
    pub decompress: bool,

    /// Use the fastest trial subset (zlib-default + LZ4-default only)
    #[arg(long)]
    pub fast: bool,

    /// Enable every trial, including the brute-force variants
    #[arg(long)]
    pub smallest: bool,

    #[arg(long = "use-zlib")]
    pub use_zlib: bool,
    #[arg(long = "no-zlib")]
    pub no_zlib: bool,
    #[arg(long = "only-zlib")]
    pub only_zlib: bool,

    #[arg(long = "use-zopfli")]
    pub use_zopfli: bool,
    #[arg(long = "no-zopfli")]
    pub no_zopfli: bool,
    #[arg(long = "only-zopfli")]
    pub only_zopfli: bool,

    #[arg(long = "use-7zdeflate")]
    pub use_7zdeflate: bool,
    #[arg(long = "no-7zdeflate")]
    pub no_7zdeflate: bool,
    #[arg(long = "only-7zdeflate")]
    pub only_7zdeflate: bool,

    #[arg(long = "use-lz4")]
    pub use_lz4: bool,
    #[arg(long = "no-lz4")]
    pub no_lz4: bool,
    #[arg(long = "only-lz4")]
    pub only_lz4: bool,

    #[arg(long = "use-lz4brute")]
    pub use_lz4brute: bool,
    #[arg(long = "no-lz4brute")]
    pub no_lz4brute: bool,
    #[arg(long = "only-lz4brute")]
    pub only_lz4brute: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Cso1,
    Cso2,
    Zso,
    Dax,
}

impl Args {
    /// Pairs each input with its output path: `-o`/`--out` supplies one
    /// override per input in order; the rest default to the
    /// input path with its `.iso`/`.ISO` suffix replaced by `.cso`.
    pub fn output_for(&self, index: usize, input: &PathBuf) -> Option<PathBuf> {
        if self.crc {
            return None;
        }
        if let Some(explicit) = self.out.get(index) {
            return Some(explicit.clone());
        }
        let name = input.to_string_lossy();
        let replaced = if let Some(stripped) = name.strip_suffix(".iso").or_else(|| name.strip_suffix(".ISO")) {
            format!("{stripped}.cso")
        } else {
            format!("{name}.cso")
        };
        Some(PathBuf::from(replaced))
    }

    /// Builds the effective `TaskFlags` starting from the format's default
    /// set, then applying `--use`/`--no`/`--only`/`--fast`/`--smallest` in
    /// that order.
    pub fn flags(&self) -> Result<TaskFlags> {
        // CSO v1 has no LZ4 index bit at all, so its default trial set
        // excludes LZ4 entirely; `--use-lz4` can still force it back on,
        // at which point `Output::update_index` will reject it if a block
        // actually ends up choosing it.
        let mut flags = match self.format {
            Format::Cso1 => TaskFlags::NO_LZ4,
            Format::Cso2 => TaskFlags::FMT_CSO_2,
            Format::Zso => TaskFlags::FMT_ZSO | TaskFlags::NO_ZLIB | TaskFlags::NO_ZOPFLI | TaskFlags::NO_7ZIP,
            Format::Dax => TaskFlags::FMT_DAX | TaskFlags::NO_LZ4,
        };

        if self.decompress {
            flags.insert(TaskFlags::DECOMPRESS);
        }

        for (use_flag, no_flag, only_flag, bits) in [
            (self.use_zlib, self.no_zlib, self.only_zlib, TaskFlags::NO_ZLIB),
            (self.use_zopfli, self.no_zopfli, self.only_zopfli, TaskFlags::NO_ZOPFLI),
            (self.use_7zdeflate, self.no_7zdeflate, self.only_7zdeflate, TaskFlags::NO_7ZIP),
            (self.use_lz4, self.no_lz4, self.only_lz4, TaskFlags::NO_LZ4_DEFAULT),
            (self.use_lz4brute, self.no_lz4brute, self.only_lz4brute, TaskFlags::from_bits_truncate(TaskFlags::NO_LZ4_HC.bits() | TaskFlags::NO_LZ4_HC_BRUTE.bits())),
        ] {
            if use_flag {
                flags.remove(bits);
            }
            if no_flag {
                flags.insert(bits);
            }
            if only_flag {
                flags.insert(TaskFlags::NO_ZLIB | TaskFlags::NO_ZOPFLI | TaskFlags::NO_7ZIP | TaskFlags::NO_LZ4);
                flags.remove(bits);
            }
        }

        if self.fast {
            flags.insert(TaskFlags::NO_ZLIB_BRUTE | TaskFlags::NO_ZOPFLI | TaskFlags::NO_7ZIP | TaskFlags::NO_LZ4_HC);
        }
        if self.smallest {
            flags.insert(TaskFlags::FORCE_ALL);
        }

        if self.inputs.is_empty() {
            bail!("at least one input path is required");
        }
        Ok(flags)
    }
}
