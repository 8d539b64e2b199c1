//! Progress reporting hooks.
//!
//! Chunk sources and the extraction sink receive a reporter explicitly when
//! they are constructed; there is no process-wide progress state.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

/// Receiver of progress notifications. Every method defaults to a no-op.
pub trait Progress: Send + Sync {
    /// `bytes` more bytes were taken from the archive on disk.
    fn archive_read(&self, _bytes: u64) {}

    /// An entry is about to be written to `path`.
    fn entry_started(&self, _path: &Path, _declared_size: Option<u64>) {}

    /// `bytes` more decoded bytes of the current entry were written.
    fn entry_advanced(&self, _bytes: u64) {}

    /// The current entry was closed after `bytes` bytes.
    fn entry_finished(&self, _path: &Path, _bytes: u64) {}
}

/// Reporter that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// Reporter that keeps byte counters and logs archive consumption in 10% steps.
#[derive(Debug, Default)]
pub struct LogProgress {
    total: Option<u64>,
    read_bytes: AtomicU64,
    written_bytes: AtomicU64,
}

impl LogProgress {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|&t| t > 0),
            ..Self::default()
        }
    }

    /// Bytes consumed from the archive so far.
    pub fn read_bytes(&self) -> u64 {
        self.read_bytes.load(Ordering::Relaxed)
    }

    /// Decoded bytes written so far.
    pub fn written_bytes(&self) -> u64 {
        self.written_bytes.load(Ordering::Relaxed)
    }
}

impl Progress for LogProgress {
    fn archive_read(&self, bytes: u64) {
        let before = self.read_bytes.fetch_add(bytes, Ordering::Relaxed);
        let Some(total) = self.total else {
            return;
        };
        let after = before + bytes;
        let step_before = before.saturating_mul(10) / total;
        let step_after = after.saturating_mul(10) / total;
        if step_after > step_before {
            info!(
                "consumed {}% of archive ({} of {} bytes)",
                (step_after * 10).min(100),
                after,
                total
            );
        }
    }

    fn entry_started(&self, path: &Path, declared_size: Option<u64>) {
        match declared_size {
            Some(size) => debug!("writing {} ({} bytes declared)", path.display(), size),
            None => debug!("writing {}", path.display()),
        }
    }

    fn entry_advanced(&self, bytes: u64) {
        self.written_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}
