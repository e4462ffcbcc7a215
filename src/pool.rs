//! Global buffer pool.
//!
//! Pools block-sized allocations behind a mutex so repeated per-sector
//! buffers don't hit the allocator on every block. Rust's
//! ownership model lets us make that pooling safe instead of advisory: a
//! checked-out buffer is a move-only `PoolBuffer` handle that returns itself
//! to the pool on `Drop`, so there is no `Release`-call-site to forget.

use std::sync::{Mutex, OnceLock};

const MIN_SIZE: usize = 16384;

struct BufferPoolInner {
    buffer_size: usize,
    free: Vec<Vec<u8>>,
    outstanding: usize,
}

static POOL: OnceLock<Mutex<BufferPoolInner>> = OnceLock::new();

fn pool() -> &'static Mutex<BufferPoolInner> {
    POOL.get_or_init(|| {
        Mutex::new(BufferPoolInner {
            buffer_size: MIN_SIZE,
            free: Vec::new(),
            outstanding: 0,
        })
    })
}

/// A checked-out buffer. Returned to the global pool on drop; never clears
/// its contents on return (matching the original, which treats buffer
/// contents as scratch that callers must fully overwrite before reading).
pub struct PoolBuffer {
    buf: Option<Vec<u8>>,
}

impl PoolBuffer {
    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_ref().expect("buffer taken")
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buf.as_mut().expect("buffer taken")
    }

    pub fn len(&self) -> usize {
        self.buf.as_ref().map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for PoolBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            release_raw(buf);
        }
    }
}

/// Checks out a buffer sized to the pool's current `buffer_size`
/// (`set_buffer_size`'s value, or `MIN_SIZE` until first set).
pub fn alloc() -> PoolBuffer {
    let mut inner = pool().lock().unwrap();
    let size = inner.buffer_size;
    let buf = match inner.free.pop() {
        Some(mut buf) if buf.len() == size => {
            inner.outstanding += 1;
            buf.clear();
            buf.resize(size, 0);
            buf
        }
        _ => {
            inner.outstanding += 1;
            vec![0u8; size]
        }
    };
    PoolBuffer { buf: Some(buf) }
}

fn release_raw(buf: Vec<u8>) {
    let mut inner = pool().lock().unwrap();
    inner.outstanding = inner.outstanding.saturating_sub(1);
    if buf.len() == inner.buffer_size {
        inner.free.push(buf);
    }
    // A buffer sized for a stale `buffer_size` (checked out before a
    // `set_buffer_size` call) is simply dropped rather than pooled.
}

/// Changes the pool's buffer size. Fails (returns `false`, pool left
/// untouched) while any buffer is still checked out. See DESIGN.md.
pub fn set_buffer_size(new_size: usize) -> bool {
    let mut inner = pool().lock().unwrap();
    if inner.outstanding > 0 {
        return false;
    }
    inner.buffer_size = new_size.max(MIN_SIZE);
    inner.free.clear();
    true
}

pub fn buffer_size() -> usize {
    pool().lock().unwrap().buffer_size
}

#[cfg(test)]
mod tests {
    use super::*;

    // The pool is a process-global singleton, so these tests serialize
    // through their own lock rather than risk cross-test interference when
    // the test harness runs them concurrently.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn alloc_returns_current_size() {
        let _guard = TEST_LOCK.lock().unwrap();
        assert!(set_buffer_size(32768));
        let buf = alloc();
        assert_eq!(buf.len(), 32768);
    }

    #[test]
    fn set_buffer_size_fails_with_outstanding_buffer() {
        let _guard = TEST_LOCK.lock().unwrap();
        assert!(set_buffer_size(16384));
        let held = alloc();
        assert!(!set_buffer_size(65536));
        assert_eq!(buffer_size(), 16384);
        drop(held);
        assert!(set_buffer_size(65536));
    }

    #[test]
    fn dropped_buffer_is_reused() {
        let _guard = TEST_LOCK.lock().unwrap();
        assert!(set_buffer_size(16384));
        {
            let _buf = alloc();
        }
        let buf = alloc();
        assert_eq!(buf.len(), 16384);
    }
}
