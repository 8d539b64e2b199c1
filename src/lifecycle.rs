//! Drives one archive from resolution to cleanup.
//!
//! An [`Extraction`] moves through `Initializing → Streaming → Finalizing →
//! Done`, or to `Failed` on the first fatal error. Nothing destructive happens
//! before streaming starts, so argument problems leave the archive untouched.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::archive::{Archive, VolumeMode};
use crate::error::{Error, Result};
use crate::io::{ChunkSource, ShiftTruncateSource, VolumeChainSource};
use crate::progress::{NoProgress, Progress};
use crate::sink::{ExtractionResult, ExtractionSink};
use crate::zip::{NameEncoding, ZipStream};

/// Chunk size used when none is given: 512 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024 * 1024;

/// Knobs for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Upper bound on the bytes taken from the archive per step.
    pub chunk_size: usize,
    pub password: Option<String>,
    pub name_encoding: NameEncoding,
    pub mode: VolumeMode,
    /// Extract here instead of next to the archive.
    pub output_dir: Option<PathBuf>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            password: None,
            name_encoding: NameEncoding::default(),
            mode: VolumeMode::default(),
            output_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Streaming,
    Finalizing,
    Done,
    Failed,
}

/// A prepared extraction of one archive.
pub struct Extraction {
    archive: Archive,
    root: PathBuf,
    options: ExtractOptions,
    progress: Arc<dyn Progress>,
    phase: Phase,
}

impl Extraction {
    /// Validate `options`, resolve the archive at `path` and create the
    /// extraction root.
    pub fn prepare(path: &Path, options: ExtractOptions) -> Result<Self> {
        if options.chunk_size == 0 {
            return Err(Error::Argument("chunk size must be greater than zero".to_string()));
        }

        let archive = Archive::resolve(path, options.mode)?;
        let root = match &options.output_dir {
            Some(dir) => dir.clone(),
            None => archive.default_root(),
        };
        if archive.files().iter().any(|f| f == &root) {
            return Err(Error::Argument(format!(
                "extraction root '{}' would overwrite the archive",
                root.display()
            )));
        }

        fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;
        debug!(
            "initialized {} with {} file(s), extracting into {}",
            archive_kind(&archive),
            archive.files().len(),
            root.display()
        );

        Ok(Self {
            archive,
            root,
            options,
            progress: Arc::new(NoProgress),
            phase: Phase::Initializing,
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Stream every entry into the extraction root, consuming the archive.
    pub fn run(&mut self) -> Result<ExtractionResult> {
        if self.phase != Phase::Initializing {
            return Err(Error::Argument(format!(
                "extraction cannot run from the {:?} phase",
                self.phase
            )));
        }

        let mut result = ExtractionResult::start();
        self.enter(Phase::Streaming);
        if let Err(e) = self.stream(&mut result) {
            self.enter(Phase::Failed);
            return Err(e);
        }

        self.enter(Phase::Finalizing);
        self.finalize();

        result.finish();
        self.enter(Phase::Done);
        info!(
            "extracted {} files ({} bytes) in {:.2}s",
            result.files,
            result.bytes,
            result.elapsed.as_secs_f64()
        );
        Ok(result)
    }

    fn enter(&mut self, phase: Phase) {
        debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    // The source is dropped on return, closing every archive handle.
    fn stream(&self, result: &mut ExtractionResult) -> Result<()> {
        let chunk_size = self.options.chunk_size;
        let source: Box<dyn ChunkSource> = match &self.archive {
            Archive::Single(path) => Box::new(
                ShiftTruncateSource::new(path, chunk_size, self.progress.clone())
                    .map_err(|e| Error::io(path, e))?,
            ),
            Archive::MultiVolume { volumes, .. } => Box::new(VolumeChainSource::new(
                volumes.clone(),
                chunk_size,
                self.progress.clone(),
            )?),
        };

        let mut entries = ZipStream::new(source).with_password(self.options.password.as_deref());
        let mut sink = ExtractionSink::new(self.root.clone(), self.progress.clone())
            .with_name_decoder(Box::new(self.options.name_encoding));
        sink.extract_all(&mut entries, result)?;
        debug!("pipeline finished after {} entries", entries.entries_read());
        Ok(())
    }

    fn finalize(&self) {
        // Split volumes are removed by the chunk source as they are read.
        let Archive::Single(path) = &self.archive else {
            return;
        };
        match fs::remove_file(path) {
            Ok(()) => info!("removed archive {}", path.display()),
            Err(e) => warn!("could not remove archive {}: {}", path.display(), e),
        }
    }
}

fn archive_kind(archive: &Archive) -> &'static str {
    match archive {
        Archive::Single(_) => "single archive",
        Archive::MultiVolume { .. } => "split archive",
    }
}

/// Extract the archive at `path` with default progress handling.
pub fn extract(path: &Path, options: ExtractOptions) -> Result<ExtractionResult> {
    Extraction::prepare(path, options)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(chunk_size: usize) -> ExtractOptions {
        ExtractOptions {
            chunk_size,
            ..ExtractOptions::default()
        }
    }

    #[test]
    fn defaults() {
        let options = ExtractOptions::default();
        assert_eq!(options.chunk_size, 512 * 1024 * 1024);
        assert_eq!(options.mode, VolumeMode::Auto);
        assert!(options.password.is_none());
    }

    #[test]
    fn zero_chunk_size_is_rejected_before_anything_happens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        fs::write(&path, b"PK\x03\x04").unwrap();

        let err = Extraction::prepare(&path, options(0)).err().unwrap();
        assert!(matches!(err, Error::Argument(_)));
        assert_eq!(fs::read(&path).unwrap(), b"PK\x03\x04");
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn prepare_creates_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        fs::write(&path, b"").unwrap();

        let extraction = Extraction::prepare(&path, options(16)).unwrap();
        assert_eq!(extraction.phase(), Phase::Initializing);
        assert_eq!(extraction.root(), dir.path().join("a"));
        assert!(dir.path().join("a").is_dir());
    }

    #[test]
    fn root_must_not_be_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        fs::write(&path, b"").unwrap();

        let mut opts = options(16);
        opts.output_dir = Some(path.clone());
        let err = Extraction::prepare(&path, opts).err().unwrap();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn empty_archive_finishes_and_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        fs::write(&path, b"").unwrap();

        let mut extraction = Extraction::prepare(&path, options(16)).unwrap();
        let result = extraction.run().unwrap();
        assert_eq!(extraction.phase(), Phase::Done);
        assert_eq!(result.files, 0);
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_archive_fails_and_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        fs::write(&path, b"this is not a zip archive at all").unwrap();

        let mut extraction = Extraction::prepare(&path, options(8)).unwrap();
        let err = extraction.run().unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
        assert_eq!(extraction.phase(), Phase::Failed);
        assert!(path.exists());

        assert!(matches!(extraction.run(), Err(Error::Argument(_))));
    }

    // One stored entry encrypted with "pw"; the CRC's high byte 0x12 is the check byte.
    fn encrypted_archive() -> Vec<u8> {
        let data = b"secret";
        let mut cipher = crate::zip::crypto::ZipCrypto::new(b"pw");
        let mut plain = vec![7u8; 11];
        plain.push(0x12);
        plain.extend_from_slice(data);
        let payload: Vec<u8> = plain.iter().map(|&b| cipher.encrypt(b)).collect();

        let mut out = b"PK\x03\x04".to_vec();
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&[0u8; 6]);
        out.extend_from_slice(&0x1234_5678u32.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(b"s.txt".len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(b"s.txt");
        out.extend_from_slice(&payload);
        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&[0u8; 18]);
        out
    }

    #[test]
    fn wrong_password_fails_and_keeps_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.zip");
        fs::write(&path, encrypted_archive()).unwrap();

        let opts = ExtractOptions {
            password: Some("nope".to_string()),
            ..options(16)
        };
        let mut extraction = Extraction::prepare(&path, opts).unwrap();
        let err = extraction.run().unwrap_err();
        assert!(matches!(err, Error::WrongPassword(ref name) if name == "s.txt"), "{err}");
        assert_eq!(extraction.phase(), Phase::Failed);
        assert!(path.exists());
        assert!(!dir.path().join("locked").join("s.txt").exists());
    }

    #[test]
    fn right_password_extracts_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.zip");
        fs::write(&path, encrypted_archive()).unwrap();

        let opts = ExtractOptions {
            password: Some("pw".to_string()),
            ..options(16)
        };
        let result = Extraction::prepare(&path, opts).unwrap().run().unwrap();
        assert_eq!(result.files, 1);
        assert_eq!(fs::read(dir.path().join("locked").join("s.txt")).unwrap(), b"secret");
        assert!(!path.exists());
    }
}
