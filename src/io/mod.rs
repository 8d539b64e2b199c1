mod local;
mod volumes;

pub use local::ShiftTruncateSource;
pub use volumes::{
    VolumeChainSource, VolumeKind, check_volume_set, discover_volumes, volume_base_name,
};

use std::fs::File;
use std::io::{self, Read};

/// Trait for a destructive, single-pass source of archive bytes
pub trait ChunkSource {
    /// Take the next chunk, or `None` once the source is exhausted.
    ///
    /// A chunk is never longer than the source's configured chunk size.
    /// After `None` every further call returns `None`; after an error every
    /// further call fails.
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>>;
}

impl<S: ChunkSource + ?Sized> ChunkSource for Box<S> {
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        (**self).next_chunk()
    }
}

/// Lifecycle of a chunk source, shared by both implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Active,
    Exhausted,
    Failed,
}

impl SourceState {
    fn aborted() -> io::Error {
        io::Error::other("chunk source aborted by an earlier error")
    }
}

/// Read until `buf` is full or the reader hits end of file.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_exact_at(buf, offset)
    }

    #[cfg(not(unix))]
    {
        use std::io::{Seek, SeekFrom};
        let mut file = file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }
}

fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.write_all_at(buf, offset)
    }

    #[cfg(not(unix))]
    {
        use std::io::{Seek, SeekFrom, Write};
        let mut file = file;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)
    }
}
