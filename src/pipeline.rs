use std::io::Read;

use crate::error::Result;

/// One entry announced by a decompression pipeline.
pub struct RawEntry<'a> {
    /// Entry name exactly as stored in the archive.
    pub name: Vec<u8>,
    /// The archive marks `name` as UTF-8.
    pub unicode: bool,
    /// Declared uncompressed size, when the archive states it up front.
    pub size: Option<u64>,
    /// Decoded contents.
    pub data: Box<dyn Read + 'a>,
}

/// A decompression pipeline that hands out entries one at a time.
///
/// Each entry borrows the stream, so the previous entry is gone before the
/// next one can be requested. Implementations discard whatever part of an
/// entry the caller did not read.
pub trait EntryStream {
    fn next_entry(&mut self) -> Result<Option<RawEntry<'_>>>;
}
