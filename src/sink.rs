//! Materializes decoded entries under the extraction root.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pipeline::{EntryStream, RawEntry};
use crate::progress::Progress;
use crate::zip::{NameDecoder, NameEncoding};

const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Counters for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
    pub elapsed: Duration,
    started: Instant,
}

impl ExtractionResult {
    pub fn start() -> Self {
        Self {
            files: 0,
            directories: 0,
            bytes: 0,
            elapsed: Duration::ZERO,
            started: Instant::now(),
        }
    }

    /// Freeze the elapsed time.
    pub fn finish(&mut self) {
        self.elapsed = self.started.elapsed();
    }
}

/// What a single entry turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Directory(PathBuf),
    File {
        path: PathBuf,
        bytes: u64,
        sha256: String,
    },
}

/// Writes entries below `root`, one at a time and in archive order.
pub struct ExtractionSink {
    root: PathBuf,
    names: Box<dyn NameDecoder>,
    progress: Arc<dyn Progress>,
    buf: Vec<u8>,
}

impl ExtractionSink {
    pub fn new(root: impl Into<PathBuf>, progress: Arc<dyn Progress>) -> Self {
        Self {
            root: root.into(),
            names: Box::new(NameEncoding::default()),
            progress,
            buf: vec![0u8; COPY_BUFFER_SIZE],
        }
    }

    pub fn with_name_decoder(mut self, names: Box<dyn NameDecoder>) -> Self {
        self.names = names;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drive every entry of `stream` through the sink.
    pub fn extract_all<E: EntryStream + ?Sized>(
        &mut self,
        stream: &mut E,
        result: &mut ExtractionResult,
    ) -> Result<()> {
        while let Some(entry) = stream.next_entry()? {
            self.extract_entry(entry, result)?;
        }
        Ok(())
    }

    /// Create the directory or file for one entry.
    ///
    /// A name ending in a separator only creates a directory. Otherwise the
    /// entry data is drained into a fresh file while its SHA-256 is computed.
    /// On failure the partially written file is left as it is.
    pub fn extract_entry(
        &mut self,
        entry: RawEntry<'_>,
        result: &mut ExtractionResult,
    ) -> Result<Extracted> {
        let name = self.names.decode(&entry.name, entry.unicode)?;
        let (path, is_dir) = resolve_entry_path(&self.root, &name)?;

        if is_dir {
            fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
            result.directories += 1;
            debug!("created directory {}", path.display());
            return Ok(Extracted::Directory(path));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        self.progress.entry_started(&path, entry.size);

        let declared = entry.size;
        let mut data = entry.data;
        let mut hasher = Sha256::new();
        let mut written = 0u64;
        loop {
            let n = match data.read(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(entry_read_error(&name, e)),
            };
            let chunk = &self.buf[..n];
            file.write_all(chunk).map_err(|e| Error::io(&path, e))?;
            hasher.update(chunk);
            written += n as u64;
            result.bytes += n as u64;
            self.progress.entry_advanced(n as u64);
        }
        file.flush().map_err(|e| Error::io(&path, e))?;
        drop(file);

        result.files += 1;
        let sha256 = hex::encode(hasher.finalize());
        info!("extracted {} ({} bytes) sha256={}", path.display(), written, sha256);
        if let Some(size) = declared {
            if size != written {
                warn!(
                    "{}: archive declared {} bytes but {} were decoded",
                    path.display(),
                    size,
                    written
                );
            }
        }
        self.progress.entry_finished(&path, written);

        Ok(Extracted::File {
            path,
            bytes: written,
            sha256,
        })
    }
}

/// Decoder failures inside entry data are archive corruption. Anything else
/// came from the chunk source.
fn entry_read_error(name: &str, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
            Error::Corrupt(format!("entry '{name}': {err}"))
        }
        _ => Error::Stream(err),
    }
}

/// Join a decoded entry name onto `root`.
///
/// Both `/` and `\` separate segments, and empty or `.` segments are
/// ignored. Absolute names and `..` segments are rejected so that nothing is
/// written outside `root`. Returns the path and whether it is a directory
/// marker.
fn resolve_entry_path(root: &Path, name: &str) -> Result<(PathBuf, bool)> {
    let invalid = |reason: &str| Error::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.starts_with(['/', '\\']) {
        return Err(invalid("absolute path"));
    }
    if name.contains('\0') {
        return Err(invalid("contains a NUL byte"));
    }

    let is_dir = name.is_empty() || name.ends_with(['/', '\\']);
    let mut path = root.to_path_buf();
    let mut segments = 0;
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return Err(invalid("parent directory component")),
            s => {
                let mut components = Path::new(s).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => path.push(s),
                    _ => return Err(invalid("not a plain relative path")),
                }
                segments += 1;
            }
        }
    }

    if segments == 0 && !is_dir {
        return Err(invalid("does not name a file"));
    }
    Ok((path, is_dir))
}
