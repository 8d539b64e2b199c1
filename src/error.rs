use std::io;
use std::path::PathBuf;

/// Errors raised while consuming and extracting an archive.
///
/// Everything here is fatal for the run. Failing to delete an archive or a
/// volume after it was fully consumed is not an error; it is logged as a
/// warning instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("I/O error on '{path}': {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("corrupt archive: {0}")]
    Corrupt(String),

    #[error("unsupported archive feature: {0}")]
    Unsupported(String),

    #[error("entry '{0}' is encrypted and no password was given")]
    PasswordRequired(String),

    #[error("incorrect password for entry '{0}'")]
    WrongPassword(String),

    #[error("invalid entry name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error(transparent)]
    Stream(#[from] io::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
