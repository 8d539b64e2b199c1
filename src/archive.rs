use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::io::{VolumeKind, check_volume_set, discover_volumes, volume_base_name};

/// How to decide between single-file and split archives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum VolumeMode {
    /// Split when the name is a volume or sibling volumes exist
    #[default]
    Auto,
    /// Always treat the path as one self-contained archive
    Single,
    /// Always look for sibling volumes
    Multi,
}

/// The archive being extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Archive {
    Single(PathBuf),
    MultiVolume { volumes: Vec<PathBuf>, base: String },
}

impl Archive {
    /// Work out which kind of archive `path` is.
    ///
    /// A split set is checked for completeness here, before any volume is
    /// opened or consumed.
    pub fn resolve(path: &Path, mode: VolumeMode) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::Argument(format!("'{}' is not a usable file name", path.display()))
            })?;

        if mode == VolumeMode::Single {
            ensure_file(path)?;
            return Ok(Archive::Single(path.to_path_buf()));
        }

        let named_as_part =
            VolumeKind::classify(file_name).is_some_and(|(_, kind)| kind.is_split_part());
        if mode == VolumeMode::Auto && !named_as_part {
            ensure_file(path)?;
        }

        let volumes = discover_volumes(path)?;
        let split = match mode {
            VolumeMode::Multi => true,
            _ => named_as_part || volumes.iter().any(|v| v.as_path() != path),
        };
        if !split {
            return Ok(Archive::Single(path.to_path_buf()));
        }
        if volumes.is_empty() {
            return Err(Error::Argument(format!("no volumes found for '{}'", path.display())));
        }
        check_volume_set(&volumes)?;
        Ok(Archive::MultiVolume {
            volumes,
            base: volume_base_name(file_name).to_string(),
        })
    }

    /// Default extraction root: a directory next to the archive named after it.
    pub fn default_root(&self) -> PathBuf {
        match self {
            Archive::Single(path) => {
                let stem = path.file_stem().unwrap_or(path.as_os_str());
                sibling(path).join(stem)
            }
            Archive::MultiVolume { volumes, base } => match volumes.first() {
                Some(first) => sibling(first).join(base),
                None => PathBuf::from(base),
            },
        }
    }

    /// Every file the run will consume.
    pub fn files(&self) -> &[PathBuf] {
        match self {
            Archive::Single(path) => std::slice::from_ref(path),
            Archive::MultiVolume { volumes, .. } => volumes,
        }
    }

    /// Combined on-disk size of the archive, if it can be read.
    pub fn total_size(&self) -> Option<u64> {
        self.files()
            .iter()
            .map(|f| fs::metadata(f).map(|m| m.len()).ok())
            .sum()
    }
}

fn sibling(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn ensure_file(path: &Path) -> Result<()> {
    let meta = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    if !meta.is_file() {
        return Err(Error::Argument(format!("'{}' is not a regular file", path.display())));
    }
    Ok(())
}
