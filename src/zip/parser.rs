//! Forward-only ZIP parser.
//!
//! This module reads a ZIP archive front to back from a [`ChunkSource`],
//! without ever seeking. That is the only way to read an archive whose bytes
//! disappear from disk as soon as they have been handed out.
//!
//! ## Parsing Strategy
//!
//! Instead of starting at the central directory like a random-access reader,
//! the stream walks the local file headers in order:
//! 1. Read a Local File Header and its name
//! 2. Decode the entry data (STORED or DEFLATE, optionally ZipCrypto)
//! 3. Skip the data descriptor if flag bit 3 is set
//! 4. Stop at the first central directory record and drain the rest of the
//!    source, so every byte of the archive is consumed
//!
//! Entries whose compressed size is only recorded in a trailing data
//! descriptor are handled for DEFLATE, because the deflate stream marks its
//! own end. STORED entries of that kind are rejected.

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::bufread::DeflateDecoder;
use std::io::{self, BufRead, Read};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::io::ChunkSource;
use crate::pipeline::{EntryStream, RawEntry};

use super::crypto::{ENCRYPTION_HEADER_LEN, ZipCrypto};
use super::structures::*;

/// Largest run of ciphertext decrypted ahead of the decoder.
const DECRYPT_BATCH: usize = 64 * 1024;

/// Buffered, forward-only view over a chunk source.
///
/// Holds at most one chunk at a time; the next chunk is only requested once
/// the current one has been consumed.
pub struct ChunkReader<S> {
    source: S,
    buf: Vec<u8>,
    pos: usize,
    consumed: u64,
    exhausted: bool,
}

impl<S: ChunkSource> ChunkReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buf: Vec::new(),
            pos: 0,
            consumed: 0,
            exhausted: false,
        }
    }

    /// Archive bytes consumed so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Put bytes that were consumed by mistake back in front of the buffer.
    fn unread(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut front = Vec::with_capacity(bytes.len() + self.buf.len() - self.pos);
        front.extend_from_slice(bytes);
        front.extend_from_slice(&self.buf[self.pos..]);
        self.buf = front;
        self.pos = 0;
        self.consumed -= bytes.len() as u64;
    }

    /// Consume and discard everything left in the source.
    fn drain(&mut self) -> io::Result<u64> {
        let mut drained = 0u64;
        loop {
            let n = self.fill_buf()?.len();
            if n == 0 {
                return Ok(drained);
            }
            self.consume(n);
            drained += n as u64;
        }
    }
}

impl<S: ChunkSource> Read for ChunkReader<S> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let avail = self.fill_buf()?;
        let n = avail.len().min(out.len());
        out[..n].copy_from_slice(&avail[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<S: ChunkSource> BufRead for ChunkReader<S> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos == self.buf.len() && !self.exhausted {
            match self.source.next_chunk()? {
                Some(chunk) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                None => {
                    self.buf = Vec::new();
                    self.pos = 0;
                    self.exhausted = true;
                }
            }
        }
        Ok(&self.buf[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.buf.len() - self.pos);
        self.pos += amt;
        self.consumed += amt as u64;
    }
}

/// Raw (still compressed) bytes of one entry, decrypted when needed.
///
/// Owns the chunk reader while the entry is open and gives it back through
/// [`into_reader`](Self::into_reader).
struct EntryData<S> {
    src: ChunkReader<S>,
    remaining: Option<u64>,
    cipher: Option<ZipCrypto>,
    raw: Vec<u8>,
    plain: Vec<u8>,
    pos: usize,
}

impl<S: ChunkSource> EntryData<S> {
    fn new(src: ChunkReader<S>, remaining: Option<u64>) -> Self {
        Self {
            src,
            remaining,
            cipher: None,
            raw: Vec::new(),
            plain: Vec::new(),
            pos: 0,
        }
    }

    fn limit(&self) -> usize {
        match self.remaining {
            Some(r) => usize::try_from(r).unwrap_or(usize::MAX),
            None => usize::MAX,
        }
    }

    /// Hand the chunk reader back. Ciphertext that was decrypted ahead but
    /// never used is returned to the reader first.
    fn into_reader(mut self) -> ChunkReader<S> {
        if self.pos < self.raw.len() {
            self.src.unread(&self.raw[self.pos..]);
        }
        self.src
    }
}

fn truncated_entry() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "archive ends inside an entry")
}

impl<S: ChunkSource> BufRead for EntryData<S> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.cipher.is_some() && self.pos < self.plain.len() {
            return Ok(&self.plain[self.pos..]);
        }
        let limit = self.limit();
        if limit == 0 {
            return Ok(&[][..]);
        }

        if self.cipher.is_none() {
            let avail = self.src.fill_buf()?;
            if avail.is_empty() && self.remaining.is_some() {
                return Err(truncated_entry());
            }
            let n = avail.len().min(limit);
            return Ok(&avail[..n]);
        }

        let n = {
            let avail = self.src.fill_buf()?;
            if avail.is_empty() {
                if self.remaining.is_some() {
                    return Err(truncated_entry());
                }
                return Ok(&[][..]);
            }
            let n = avail.len().min(limit).min(DECRYPT_BATCH);
            self.raw.clear();
            self.raw.extend_from_slice(&avail[..n]);
            n
        };
        self.src.consume(n);
        if let Some(r) = self.remaining.as_mut() {
            *r -= n as u64;
        }

        self.plain.clear();
        self.plain.extend_from_slice(&self.raw);
        if let Some(cipher) = self.cipher.as_mut() {
            cipher.decrypt_in_place(&mut self.plain);
        }
        self.pos = 0;
        Ok(&self.plain[..])
    }

    fn consume(&mut self, amt: usize) {
        if self.cipher.is_some() {
            self.pos = (self.pos + amt).min(self.plain.len());
        } else {
            self.src.consume(amt);
            if let Some(r) = self.remaining.as_mut() {
                *r = r.saturating_sub(amt as u64);
            }
        }
    }
}

impl<S: ChunkSource> Read for EntryData<S> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let avail = self.fill_buf()?;
        let n = avail.len().min(out.len());
        out[..n].copy_from_slice(&avail[..n]);
        self.consume(n);
        Ok(n)
    }
}

enum EntryDecoder<S: ChunkSource> {
    Stored(EntryData<S>),
    Deflated(DeflateDecoder<EntryData<S>>),
}

impl<S: ChunkSource> Read for EntryDecoder<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EntryDecoder::Stored(data) => data.read(buf),
            EntryDecoder::Deflated(inflater) => inflater.read(buf),
        }
    }
}

struct ActiveEntry<S: ChunkSource> {
    header: LocalFileHeader,
    decoder: EntryDecoder<S>,
}

enum State<S: ChunkSource> {
    /// Positioned at the next record signature.
    Between(ChunkReader<S>),
    /// An entry has been handed out and may be partially read.
    Entry(Box<ActiveEntry<S>>),
    /// The central directory was reached and the source drained.
    Finished,
    /// A previous call failed part way.
    Poisoned,
}

/// Streaming ZIP decoder over a destructive chunk source.
///
/// ## Usage
///
/// ```ignore
/// let mut stream = ZipStream::new(source).with_password(Some("secret"));
/// while let Some(mut entry) = stream.next_entry()? {
///     std::io::copy(&mut entry.data, &mut std::io::sink())?;
/// }
/// ```
pub struct ZipStream<S: ChunkSource> {
    state: State<S>,
    password: Option<Vec<u8>>,
    entries_read: u64,
}

impl<S: ChunkSource> ZipStream<S> {
    /// Create a stream positioned at the start of the archive.
    pub fn new(source: S) -> Self {
        Self {
            state: State::Between(ChunkReader::new(source)),
            password: None,
            entries_read: 0,
        }
    }

    /// Set the password used for encrypted entries.
    pub fn with_password(mut self, password: Option<&str>) -> Self {
        self.password = password.map(|p| p.as_bytes().to_vec());
        self
    }

    /// Number of local file headers read so far.
    pub fn entries_read(&self) -> u64 {
        self.entries_read
    }

    /// Move to the next entry, returning `false` at the end of the archive.
    fn advance(&mut self) -> Result<bool> {
        self.finish_entry()?;

        let mut reader = match std::mem::replace(&mut self.state, State::Poisoned) {
            State::Between(reader) => reader,
            State::Finished => {
                self.state = State::Finished;
                return Ok(false);
            }
            State::Entry(_) | State::Poisoned => {
                return Err(Error::Corrupt(
                    "zip stream used after an earlier failure".to_string(),
                ));
            }
        };

        loop {
            let Some(signature) = read_signature(&mut reader)? else {
                warn!(
                    "archive ended after {} bytes without a central directory",
                    reader.consumed()
                );
                self.state = State::Finished;
                return Ok(false);
            };

            match signature {
                LFH_SIGNATURE => {
                    let header =
                        LocalFileHeader::read_after_signature(&mut reader).map_err(truncated)?;
                    let active = self.open_entry(reader, header)?;
                    self.entries_read += 1;
                    self.state = State::Entry(Box::new(active));
                    return Ok(true);
                }
                DATA_DESCRIPTOR_SIGNATURE if reader.consumed() == 4 => {
                    debug!("skipping split archive marker");
                }
                CDFH_SIGNATURE | EOCD_SIGNATURE | ZIP64_EOCD_SIGNATURE | DIGITAL_SIGNATURE => {
                    let trailing = reader.drain()?;
                    debug!(
                        "reached central directory after {} entries, drained {} trailing bytes",
                        self.entries_read,
                        trailing + 4
                    );
                    self.state = State::Finished;
                    return Ok(false);
                }
                other => {
                    return Err(Error::Corrupt(format!(
                        "unexpected record signature {:02x?} at offset {}",
                        other,
                        reader.consumed() - 4
                    )));
                }
            }
        }
    }

    fn open_entry(
        &self,
        reader: ChunkReader<S>,
        header: LocalFileHeader,
    ) -> Result<ActiveEntry<S>> {
        let name = header.display_name();
        match header.compression_method {
            CompressionMethod::Stored | CompressionMethod::Deflate => {}
            CompressionMethod::Aes => {
                return Err(Error::Unsupported(format!("AES encryption (entry '{name}')")));
            }
            CompressionMethod::Unknown(method) => {
                return Err(Error::Unsupported(format!(
                    "compression method {method} (entry '{name}')"
                )));
            }
        }

        let compressed_size = header.known_compressed_size();
        if compressed_size.is_none() && header.compression_method == CompressionMethod::Stored {
            return Err(Error::Unsupported(format!(
                "stored entry '{name}' without sizes in its local header"
            )));
        }

        debug!(
            "entry '{}': method {}, compressed {:?}, uncompressed {:?}, encrypted {}",
            name,
            header.compression_method.as_u16(),
            compressed_size,
            header.known_uncompressed_size(),
            header.is_encrypted()
        );

        let mut data = EntryData::new(reader, compressed_size);
        if header.is_encrypted() {
            let password = self
                .password
                .as_deref()
                .ok_or_else(|| Error::PasswordRequired(name.clone()))?;

            let mut encryption_header = [0u8; ENCRYPTION_HEADER_LEN];
            data.read_exact(&mut encryption_header).map_err(|e| truncated(e.into()))?;
            let mut cipher = ZipCrypto::new(password);
            cipher.decrypt_in_place(&mut encryption_header);
            if encryption_header[ENCRYPTION_HEADER_LEN - 1] != header.password_check_byte() {
                return Err(Error::WrongPassword(name));
            }
            data.cipher = Some(cipher);
        }

        let decoder = match header.compression_method {
            CompressionMethod::Deflate => EntryDecoder::Deflated(DeflateDecoder::new(data)),
            _ => EntryDecoder::Stored(data),
        };
        Ok(ActiveEntry { header, decoder })
    }

    /// Discard what is left of the open entry and its data descriptor.
    fn finish_entry(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Poisoned) {
            State::Entry(active) => {
                let reader = close_entry(*active)?;
                self.state = State::Between(reader);
            }
            other => self.state = other,
        }
        Ok(())
    }
}

fn close_entry<S: ChunkSource>(active: ActiveEntry<S>) -> Result<ChunkReader<S>> {
    let ActiveEntry { header, decoder } = active;
    let data = match decoder {
        EntryDecoder::Stored(mut data) => {
            io::copy(&mut data, &mut io::sink()).map_err(|e| truncated(e.into()))?;
            data
        }
        EntryDecoder::Deflated(mut inflater) => {
            io::copy(&mut inflater, &mut io::sink()).map_err(|e| truncated(e.into()))?;
            let mut data = inflater.into_inner();
            if data.remaining.is_some() {
                io::copy(&mut data, &mut io::sink()).map_err(|e| truncated(e.into()))?;
            }
            data
        }
    };

    let mut reader = data.into_reader();
    if header.has_data_descriptor() {
        let first = reader.read_u32::<LittleEndian>().map_err(|e| truncated(e.into()))?;
        let crc = if first.to_le_bytes() == DATA_DESCRIPTOR_SIGNATURE {
            None
        } else {
            Some(first)
        };
        let descriptor =
            DataDescriptor::read_rest(&mut reader, crc, header.zip64).map_err(truncated)?;
        debug!(
            "data descriptor for '{}': crc {:08x}, compressed {}, uncompressed {}",
            header.display_name(),
            descriptor.crc32,
            descriptor.compressed_size,
            descriptor.uncompressed_size
        );
    }
    Ok(reader)
}

fn read_signature<S: ChunkSource>(reader: &mut ChunkReader<S>) -> Result<Option<[u8; 4]>> {
    if reader.fill_buf()?.is_empty() {
        return Ok(None);
    }
    let mut signature = [0u8; 4];
    reader
        .read_exact(&mut signature)
        .map_err(|e| truncated(e.into()))?;
    Ok(Some(signature))
}

/// Running out of input in the middle of a record means the archive is cut short.
fn truncated(err: Error) -> Error {
    match err {
        Error::Stream(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Error::Corrupt("archive is truncated".to_string())
        }
        other => other,
    }
}

struct EntryReader<'a, S: ChunkSource> {
    stream: &'a mut ZipStream<S>,
}

impl<S: ChunkSource> Read for EntryReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.stream.state {
            State::Entry(active) => active.decoder.read(buf),
            _ => Ok(0),
        }
    }
}

impl<S: ChunkSource> EntryStream for ZipStream<S> {
    fn next_entry(&mut self) -> Result<Option<RawEntry<'_>>> {
        if !self.advance()? {
            return Ok(None);
        }
        let State::Entry(active) = &self.state else {
            return Ok(None);
        };
        let name = active.header.file_name.clone();
        let unicode = active.header.is_utf8();
        let size = active.header.known_uncompressed_size();
        Ok(Some(RawEntry {
            name,
            unicode,
            size,
            data: Box::new(EntryReader { stream: self }),
        }))
    }
}
