use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ChunkSource, SourceState, read_exact_at, write_all_at};
use crate::progress::Progress;

/// Destructive reader over a single archive file.
///
/// Every call to [`next_chunk`](ChunkSource::next_chunk) reads the first
/// `chunk_size` bytes of the file, moves the rest of the file left over them
/// block by block, and truncates the tail. When the call returns, the bytes it
/// yielded are no longer on disk and the file is exactly that many bytes
/// shorter, so extraction never needs more disk space than one chunk.
///
/// The source is single pass. A failure in the middle of a shift can leave
/// the file with duplicated or shifted-but-untruncated content; nothing is
/// rolled back.
pub struct ShiftTruncateSource {
    path: PathBuf,
    file: File,
    len: u64,
    chunk_size: usize,
    scratch: Vec<u8>,
    progress: Arc<dyn Progress>,
    state: SourceState,
}

impl ShiftTruncateSource {
    pub fn new(path: &Path, chunk_size: usize, progress: Arc<dyn Progress>) -> io::Result<Self> {
        if chunk_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "chunk size must be greater than zero",
            ));
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            chunk_size,
            scratch: Vec::new(),
            progress,
            state: SourceState::Active,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes still on disk.
    pub fn remaining(&self) -> u64 {
        self.len
    }

    /// Read the head, shift the remainder over it and truncate.
    fn take_head(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.len == 0 {
            return Ok(None);
        }

        let head_len = (self.chunk_size as u64).min(self.len);
        let mut head = vec![0u8; head_len as usize];
        read_exact_at(&self.file, &mut head, 0)?;

        let mut read_pos = head_len;
        if read_pos < self.len && self.scratch.is_empty() {
            self.scratch = vec![0u8; self.chunk_size];
        }
        while read_pos < self.len {
            let block = (self.chunk_size as u64).min(self.len - read_pos) as usize;
            let buf = &mut self.scratch[..block];
            read_exact_at(&self.file, buf, read_pos)?;
            write_all_at(&self.file, buf, read_pos - head_len)?;
            read_pos += block as u64;
        }

        let new_len = self.len - head_len;
        self.file.set_len(new_len)?;
        self.len = new_len;

        self.progress.archive_read(head_len);
        Ok(Some(head))
    }
}

impl ChunkSource for ShiftTruncateSource {
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.state {
            SourceState::Exhausted => return Ok(None),
            SourceState::Failed => return Err(SourceState::aborted()),
            SourceState::Active => {}
        }
        match self.take_head() {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            Ok(None) => {
                self.state = SourceState::Exhausted;
                Ok(None)
            }
            Err(e) => {
                self.state = SourceState::Failed;
                Err(e)
            }
        }
    }
}
