use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

use crate::error::{Error, Result};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Aes,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            99 => CompressionMethod::Aes,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Aes => 99,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: [u8; 4] = *b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Central Directory File Header
pub const CDFH_SIGNATURE: [u8; 4] = *b"PK\x01\x02";

/// End of Central Directory
pub const EOCD_SIGNATURE: [u8; 4] = *b"PK\x05\x06";

/// ZIP64 End of Central Directory
pub const ZIP64_EOCD_SIGNATURE: [u8; 4] = *b"PK\x06\x06";

/// Data descriptor signature. Also written as the 4-byte spanning marker at
/// the very start of a split archive.
pub const DATA_DESCRIPTOR_SIGNATURE: [u8; 4] = *b"PK\x07\x08";

/// Digital signature record, found just before the end of the central directory
pub const DIGITAL_SIGNATURE: [u8; 4] = *b"PK\x05\x05";

/// General purpose flag bits
pub const FLAG_ENCRYPTED: u16 = 1 << 0;
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
pub const FLAG_UTF8: u16 = 1 << 11;

const ZIP64_EXTRA_ID: u16 = 0x0001;
const ZIP64_MARKER: u32 = 0xFFFF_FFFF;

/// Parsed Local File Header, including the variable-length name
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub file_name: Vec<u8>,
    pub zip64: bool,
}

impl LocalFileHeader {
    /// Parse the header that follows an already-consumed `PK\x03\x04`.
    pub fn read_after_signature<R: Read>(reader: &mut R) -> Result<Self> {
        let version_needed = reader.read_u16::<LittleEndian>()?;
        let flags = reader.read_u16::<LittleEndian>()?;
        let compression_method = reader.read_u16::<LittleEndian>()?;
        let last_mod_time = reader.read_u16::<LittleEndian>()?;
        let last_mod_date = reader.read_u16::<LittleEndian>()?;
        let crc32 = reader.read_u32::<LittleEndian>()?;
        let compressed_size = reader.read_u32::<LittleEndian>()?;
        let uncompressed_size = reader.read_u32::<LittleEndian>()?;
        let file_name_length = reader.read_u16::<LittleEndian>()?;
        let extra_field_length = reader.read_u16::<LittleEndian>()?;

        let mut file_name = vec![0u8; file_name_length as usize];
        reader.read_exact(&mut file_name)?;
        let mut extra = vec![0u8; extra_field_length as usize];
        reader.read_exact(&mut extra)?;

        let mut header = Self {
            version_needed,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size: compressed_size as u64,
            uncompressed_size: uncompressed_size as u64,
            file_name,
            zip64: false,
        };
        header.apply_zip64_extra(&extra, compressed_size, uncompressed_size)?;
        Ok(header)
    }

    /// The ZIP64 extended information field (0x0001) carries 64-bit sizes.
    /// In a local header the uncompressed size comes first.
    fn apply_zip64_extra(
        &mut self,
        extra: &[u8],
        compressed: u32,
        uncompressed: u32,
    ) -> Result<()> {
        let mut rest = extra;
        while rest.len() >= 4 {
            let header_id = u16::from_le_bytes([rest[0], rest[1]]);
            let field_size = u16::from_le_bytes([rest[2], rest[3]]) as usize;
            let body_end = (4 + field_size).min(rest.len());
            let mut body = &rest[4..body_end];

            if header_id == ZIP64_EXTRA_ID {
                self.zip64 = true;
                if uncompressed == ZIP64_MARKER {
                    self.uncompressed_size = body.read_u64::<LittleEndian>().map_err(|_| {
                        Error::Corrupt("truncated ZIP64 extra field".to_string())
                    })?;
                }
                if compressed == ZIP64_MARKER {
                    self.compressed_size = body.read_u64::<LittleEndian>().map_err(|_| {
                        Error::Corrupt("truncated ZIP64 extra field".to_string())
                    })?;
                }
            }
            rest = &rest[body_end..];
        }
        Ok(())
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    pub fn is_utf8(&self) -> bool {
        self.flags & FLAG_UTF8 != 0
    }

    /// Compressed size, when the header actually records it.
    pub fn known_compressed_size(&self) -> Option<u64> {
        if self.has_data_descriptor() && self.compressed_size == 0 {
            None
        } else {
            Some(self.compressed_size)
        }
    }

    /// Uncompressed size, when the header actually records it.
    pub fn known_uncompressed_size(&self) -> Option<u64> {
        if self.has_data_descriptor() && self.uncompressed_size == 0 && self.compressed_size == 0 {
            None
        } else {
            Some(self.uncompressed_size)
        }
    }

    /// Byte that the last byte of a decrypted encryption header must match.
    pub fn password_check_byte(&self) -> u8 {
        if self.has_data_descriptor() {
            (self.last_mod_time >> 8) as u8
        } else {
            (self.crc32 >> 24) as u8
        }
    }

    /// Name for messages, regardless of its real encoding.
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.file_name).into_owned()
    }
}

/// Data descriptor that trails an entry written with flag bit 3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Read a descriptor whose optional signature has already been handled.
    /// `first` is the CRC when the signature was absent.
    pub fn read_rest<R: Read>(reader: &mut R, first: Option<u32>, zip64: bool) -> Result<Self> {
        let crc32 = match first {
            Some(crc) => crc,
            None => reader.read_u32::<LittleEndian>()?,
        };
        let (compressed_size, uncompressed_size) = if zip64 {
            (
                reader.read_u64::<LittleEndian>()?,
                reader.read_u64::<LittleEndian>()?,
            )
        } else {
            (
                reader.read_u32::<LittleEndian>()? as u64,
                reader.read_u32::<LittleEndian>()? as u64,
            )
        };
        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }
}
