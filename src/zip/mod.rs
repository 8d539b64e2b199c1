//! ZIP archive decoding.
//!
//! This module turns the byte stream of a ZIP archive into a sequence of
//! entries without random access, so it can sit directly on top of a
//! destructive [`ChunkSource`](crate::io::ChunkSource).
//!
//! ## Architecture
//!
//! - [`structures`]: Record signatures, flags and the Local File Header
//! - [`parser`]: The forward-only [`ZipStream`] decoder
//! - [`crypto`]: Traditional PKWARE encryption
//! - [`name`]: Entry name decoding strategies
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! A random-access reader starts from the EOCD. This one cannot, because by
//! the time the end of the archive is visible its beginning is already gone,
//! so it relies on the local headers alone and treats the central directory
//! as the end marker.
//!
//! ## Supported Features
//!
//! - STORED (no compression) method
//! - DEFLATE compression method
//! - Data descriptors on DEFLATE entries
//! - ZIP64 sizes in local headers
//! - Traditional PKWARE (ZipCrypto) encryption
//!
//! ## Limitations
//!
//! - No AES encryption
//! - No BZIP2, LZMA, or other compression methods
//! - CRC-32 values are not verified

pub mod crypto;
pub mod name;
mod parser;
pub mod structures;

pub use name::{NameDecoder, NameEncoding};
pub use parser::{ChunkReader, ZipStream};
pub use structures::{CompressionMethod, LocalFileHeader};
