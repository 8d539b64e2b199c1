//! # dunzip
//!
//! A destructive unzip utility for disks that cannot hold an archive and its
//! extracted contents at the same time.
//!
//! The archive is consumed front to back in bounded chunks. A single-file
//! archive gives up each chunk by shifting the rest of the file left and
//! truncating it, and a split archive deletes each volume once it has been
//! read to the end. The bytes flow through a forward-only ZIP decoder into
//! the extraction root, so peak extra disk usage stays around one chunk.
//!
//! ## Features
//!
//! - Single-file archives and split archives (`.z01`.. `.zip` and `.zip.001`..)
//! - Support for STORED (uncompressed) and DEFLATE compression methods
//! - ZIP64 sizes and data descriptors
//! - Traditional PKWARE password protection
//! - Configurable decoding of legacy entry names
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use dunzip::{ExtractOptions, extract};
//!
//! fn main() -> dunzip::Result<()> {
//!     let options = ExtractOptions {
//!         chunk_size: 64 * 1024 * 1024,
//!         ..ExtractOptions::default()
//!     };
//!     let result = extract(Path::new("backup.zip"), options)?;
//!     println!("{} files, {} bytes", result.files, result.bytes);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod error;
pub mod io;
pub mod lifecycle;
pub mod pipeline;
pub mod progress;
pub mod sink;
pub mod zip;

pub use archive::{Archive, VolumeMode};
pub use cli::Cli;
pub use error::{Error, Result};
pub use io::{ChunkSource, ShiftTruncateSource, VolumeChainSource};
pub use lifecycle::{ExtractOptions, Extraction, Phase, extract};
pub use pipeline::{EntryStream, RawEntry};
pub use progress::{LogProgress, NoProgress, Progress};
pub use sink::{Extracted, ExtractionResult, ExtractionSink};
pub use zip::{NameDecoder, NameEncoding, ZipStream};
