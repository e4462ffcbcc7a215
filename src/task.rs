//! The `Task` contract: the only interface between the CLI shell and the
//! compression core. Constructed by the caller, read-only once handed to a
//! `TaskRunner`.

use std::path::PathBuf;

use bitflags::bitflags;

bitflags! {
    /// Stable flag bits. `DECOMPRESS` and `FMT_DAX` are assigned the next
    /// free bits after the documented core set; see DESIGN.md.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskFlags: u32 {
        const NO_ZLIB_DEFAULT  = 0x001;
        const NO_ZLIB_BRUTE    = 0x002;
        const NO_ZLIB          = 0x003;
        const NO_ZOPFLI        = 0x004;
        const NO_7ZIP          = 0x008;
        const FORCE_ALL        = 0x010;
        const FMT_ZSO          = 0x020;
        const FMT_CSO_2        = 0x040;
        const NO_LZ4_DEFAULT   = 0x080;
        const NO_LZ4_HC        = 0x100;
        const NO_LZ4_HC_BRUTE  = 0x200;
        const NO_LZ4           = 0x380;
        const DECOMPRESS       = 0x400;
        /// DAX is one of the four target container formats; assigned the
        /// next free bit after the documented core set. See DESIGN.md.
        const FMT_DAX          = 0x800;
    }
}

impl Default for TaskFlags {
    fn default() -> Self {
        TaskFlags::empty()
    }
}

/// Status reported through a `Task`'s progress/error callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    InProgress,
    Success,
    BadInput,
    BadOutput,
    InvalidData,
    CannotWrite,
    InvalidOption,
}

/// A single conversion (or checksum) job.
///
/// `output` is `None` for checksum-only tasks. `block_size` of `0` means
/// "auto" (automatic block-size policy): 2048 bytes until the
/// input is known to exceed 2 GiB, then 16384.
pub struct Task {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub block_size: u32,
    pub flags: TaskFlags,
    pub orig_max_cost_percent: u32,
    pub lz4_max_cost_percent: u32,
    pub progress: Box<dyn FnMut(TaskStatus, i64, i64, i64) + Send>,
    pub error: Box<dyn FnMut(TaskStatus, &str) + Send>,
}

impl Task {
    pub fn notify_progress(&mut self, status: TaskStatus, pos: i64, total: i64, written: i64) {
        (self.progress)(status, pos, total, written);
    }

    pub fn notify_error(&mut self, status: TaskStatus, reason: &str) {
        (self.error)(status, reason);
    }

    pub fn is_checksum_only(&self) -> bool {
        self.output.is_none()
    }

    pub fn format(&self) -> crate::container::CsoFormat {
        if self.flags.contains(TaskFlags::FMT_DAX) {
            crate::container::CsoFormat::Dax
        } else if self.flags.contains(TaskFlags::FMT_ZSO) {
            crate::container::CsoFormat::Zso
        } else if self.flags.contains(TaskFlags::FMT_CSO_2) {
            crate::container::CsoFormat::Cso2
        } else {
            crate::container::CsoFormat::Cso1
        }
    }
}
