//! Split (multi-volume) archive discovery and streaming.
//!
//! A split zip is stored as `base.z01`, `base.z02`, ..., `base.zip`, where the
//! final `.zip` volume holds the central directory. Some tools instead emit
//! `base.zip.001`, `base.zip.002`, .... Both layouts are recognised, matched
//! case-insensitively, and streamed in ascending volume order.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};

use super::{ChunkSource, SourceState, read_full};
use crate::error::{Error, Result};
use crate::progress::Progress;

/// Length of the spanning marker at the start of the first `.z01` volume.
pub const SPANNED_HEADER_LEN: u64 = 4;

static VOLUME_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)\.(?:z(\d+)|zip\.(\d+)|zip)$").expect("valid volume pattern")
});

/// Position of a file within a split archive.
///
/// The derived ordering is the streaming order: every `.zNN` volume, then
/// every `.zip.NNN` volume, then the final `.zip` container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VolumeKind {
    /// `base.zNN`
    Intermediate(u64),
    /// `base.zip.NNN`
    Numbered(u64),
    /// `base.zip`
    Final,
}

impl VolumeKind {
    /// Classify a file name, returning its base name and volume kind.
    pub fn classify(file_name: &str) -> Option<(&str, VolumeKind)> {
        let caps = VOLUME_NAME.captures(file_name)?;
        let base = caps.get(1)?.as_str();
        let kind = if let Some(n) = caps.get(2) {
            VolumeKind::Intermediate(parse_index(n.as_str()))
        } else if let Some(n) = caps.get(3) {
            VolumeKind::Numbered(parse_index(n.as_str()))
        } else {
            VolumeKind::Final
        };
        Some((base, kind))
    }

    /// Whether this volume is a part of a split set rather than a plain `.zip`.
    pub fn is_split_part(&self) -> bool {
        !matches!(self, VolumeKind::Final)
    }

    /// The first `.z` volume starts with a 4-byte spanning marker that is
    /// not part of the archive data.
    ///
    /// Any spelling of index 1 matches (`.z1`, `.z01`, `.z001`). A set that
    /// passed [`check_volume_set`] holds exactly one of them.
    pub fn has_spanned_header(&self) -> bool {
        matches!(self, VolumeKind::Intermediate(1))
    }
}

fn parse_index(digits: &str) -> u64 {
    digits.parse().unwrap_or(u64::MAX)
}

/// Strip a `.zNN`, `.zip.NNN` or `.zip` suffix (any case) from a file name.
pub fn volume_base_name(file_name: &str) -> &str {
    VolumeKind::classify(file_name)
        .map(|(base, _)| base)
        .unwrap_or(file_name)
}

/// Find every volume belonging to the same archive as `path`, in streaming
/// order.
///
/// Only regular files in the same directory whose names are exactly
/// `base.zNN`, `base.zip` or `base.zip.NNN` (ignoring case) are returned.
/// The list is sorted explicitly instead of trusting directory order.
pub fn discover_volumes(path: &Path) -> Result<Vec<PathBuf>> {
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Argument(format!("'{}' is not a file path", path.display())))?;
    let base = volume_base_name(&file_name).to_string();
    let base_lower = base.to_lowercase();

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut volumes = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))? {
        let entry = entry.map_err(|e| Error::io(&dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some((candidate_base, kind)) = VolumeKind::classify(name) else {
            continue;
        };
        if candidate_base.to_lowercase() != base_lower {
            continue;
        }
        let is_file = entry
            .file_type()
            .map(|t| t.is_file())
            .map_err(|e| Error::io(entry.path(), e))?;
        if is_file {
            volumes.push((kind, entry.path()));
        }
    }

    volumes.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    debug!("discovered {} volume(s) for '{}'", volumes.len(), base);
    Ok(volumes.into_iter().map(|(_, p)| p).collect())
}

/// Check that `volumes` form one complete split set.
///
/// Two layouts are accepted: `.z01`..`.zNN` followed by exactly one `.zip`,
/// or `.zip.001`..`.zip.NNN` alone. Numbering must start at 1 with no gaps
/// or repeats. Nothing is opened, so a rejected set is left untouched.
pub fn check_volume_set(volumes: &[PathBuf]) -> Result<()> {
    let mut intermediates = Vec::new();
    let mut numbered = Vec::new();
    let mut finals = 0usize;
    for path in volumes {
        let kind = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(VolumeKind::classify)
            .map(|(_, kind)| kind)
            .ok_or_else(|| Error::Argument(format!("'{}' is not a volume name", path.display())))?;
        match kind {
            VolumeKind::Intermediate(n) => intermediates.push(n),
            VolumeKind::Numbered(n) => numbered.push(n),
            VolumeKind::Final => finals += 1,
        }
    }
    intermediates.sort_unstable();
    numbered.sort_unstable();

    if !numbered.is_empty() {
        if !intermediates.is_empty() || finals > 0 {
            return Err(Error::Argument(
                "split archive mixes .zip.NNN volumes with .zNN or .zip volumes".to_string(),
            ));
        }
        return check_sequence(&numbered, |n| format!(".zip.{n:03}"));
    }

    match finals {
        0 => Err(Error::Argument(
            "incomplete split archive: the final .zip volume is missing".to_string(),
        )),
        1 => check_sequence(&intermediates, |n| format!(".z{n:02}")),
        _ => Err(Error::Argument(
            "incomplete split archive: the final .zip volume appears more than once".to_string(),
        )),
    }
}

/// `indices` is sorted; it must be exactly `1..=len`.
fn check_sequence(indices: &[u64], suffix: impl Fn(u64) -> String) -> Result<()> {
    for (expected, &index) in (1u64..).zip(indices) {
        if index == expected {
            continue;
        }
        let problem = if index < expected {
            format!("volume {} appears more than once", suffix(index))
        } else {
            format!("volume {} is missing", suffix(expected))
        };
        return Err(Error::Argument(format!("incomplete split archive: {problem}")));
    }
    Ok(())
}

type OpenVolume = Box<dyn FnMut(&Path) -> io::Result<Box<dyn Read>>>;

struct CurrentVolume {
    path: PathBuf,
    reader: Box<dyn Read>,
}

/// Streams the volumes of a split archive back to back and deletes each one
/// once it has been read to the end.
///
/// A volume whose read fails part way is left on disk.
pub struct VolumeChainSource {
    pending: VecDeque<PathBuf>,
    current: Option<CurrentVolume>,
    chunk_size: usize,
    bytes_read: u64,
    open: OpenVolume,
    progress: Arc<dyn Progress>,
    state: SourceState,
}

impl VolumeChainSource {
    /// `volumes` must already be in streaming order (see [`discover_volumes`]).
    pub fn new(
        volumes: Vec<PathBuf>,
        chunk_size: usize,
        progress: Arc<dyn Progress>,
    ) -> io::Result<Self> {
        Self::with_opener(
            volumes,
            chunk_size,
            progress,
            Box::new(|path: &Path| Ok(Box::new(File::open(path)?) as Box<dyn Read>)),
        )
    }

    fn with_opener(
        volumes: Vec<PathBuf>,
        chunk_size: usize,
        progress: Arc<dyn Progress>,
        open: OpenVolume,
    ) -> io::Result<Self> {
        if chunk_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "chunk size must be greater than zero",
            ));
        }
        Ok(Self {
            pending: volumes.into(),
            current: None,
            chunk_size,
            bytes_read: 0,
            open,
            progress,
            state: SourceState::Active,
        })
    }

    /// Archive bytes streamed so far, across all volumes.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    fn open_next(&mut self) -> io::Result<bool> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(false);
        };
        let mut reader = (self.open)(&path)?;

        let skip_header = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(VolumeKind::classify)
            .is_some_and(|(_, kind)| kind.has_spanned_header());
        if skip_header {
            io::copy(&mut reader.by_ref().take(SPANNED_HEADER_LEN), &mut io::sink())?;
        }

        debug!("streaming volume {}", path.display());
        self.current = Some(CurrentVolume { path, reader });
        Ok(true)
    }

    fn read_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if self.current.is_none() && !self.open_next()? {
                return Ok(None);
            }
            let Some(volume) = self.current.as_mut() else {
                continue;
            };

            let mut chunk = vec![0u8; self.chunk_size];
            let n = read_full(&mut volume.reader, &mut chunk)?;
            if n > 0 {
                chunk.truncate(n);
                self.bytes_read += n as u64;
                self.progress.archive_read(n as u64);
                return Ok(Some(chunk));
            }

            // End of this volume: close the handle before removing the file.
            if let Some(CurrentVolume { path, reader }) = self.current.take() {
                drop(reader);
                remove_volume(&path);
            }
        }
    }
}

fn remove_volume(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!("removed volume {}", path.display()),
        Err(e) => warn!("could not remove volume {}: {}", path.display(), e),
    }
}

impl ChunkSource for VolumeChainSource {
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.state {
            SourceState::Exhausted => return Ok(None),
            SourceState::Failed => return Err(SourceState::aborted()),
            SourceState::Active => {}
        }
        match self.read_chunk() {
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
