//! Core conversion engine for PSP disc images (ISO ↔ CSO v1/CSO v2/ZSO/DAX),
//! plus CRC-32 checksumming. The CLI in `main.rs` is a thin shell over this
//! library's `Task`/`TaskRunner` contract.

pub mod checksum;
pub mod cli;
pub mod compress;
pub mod container;
pub mod error;
pub mod input;
pub mod output;
pub mod pool;
pub mod runner;
pub mod sector;
pub mod task;
