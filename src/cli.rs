use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

use crate::archive::VolumeMode;
use crate::lifecycle::{DEFAULT_CHUNK_SIZE, ExtractOptions};
use crate::zip::NameEncoding;

#[derive(Parser, Debug)]
#[command(name = "dunzip")]
#[command(version)]
#[command(
    about = "Extract a ZIP archive while consuming it, for disks too full to hold both",
    long_about = None
)]
#[command(after_help = "Examples:\n  \
  dunzip photos.zip                 extract into ./photos, deleting photos.zip\n  \
  dunzip backup.z01 64M             stream backup.z01.. backup.zip in 64 MiB chunks\n  \
  dunzip secret.zip 1024*1024 pw    extract an encrypted archive")]
pub struct Cli {
    /// ZIP archive, or any volume of a split archive
    #[arg(value_name = "ARCHIVE")]
    pub file: PathBuf,

    /// Bytes taken from the archive per step (e.g. 4096, 64M, 1GiB, 1024*1024)
    #[arg(
        value_name = "CHUNK_SIZE",
        value_parser = parse_chunk_size,
        default_value_t = DEFAULT_CHUNK_SIZE
    )]
    pub chunk_size: usize,

    /// Password for encrypted entries
    #[arg(value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<PathBuf>,

    /// Single file or split archive
    #[arg(long, value_enum, default_value_t = VolumeMode::Auto)]
    pub mode: VolumeMode,

    /// Encoding of entry names without the UTF-8 flag
    #[arg(long, value_enum, default_value_t = NameEncoding::Auto)]
    pub name_encoding: NameEncoding,

    /// Log more detail
    #[arg(short = 'v', conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet mode, only warnings and errors
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn log_level(&self) -> Level {
        if self.is_quiet() {
            Level::WARN
        } else if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    pub fn options(&self) -> ExtractOptions {
        ExtractOptions {
            chunk_size: self.chunk_size,
            password: self.password.clone(),
            name_encoding: self.name_encoding,
            mode: self.mode,
            output_dir: self.extract_dir.clone(),
        }
    }
}

/// Parse a chunk size such as `4096`, `64M`, `1GiB` or `1024*1024`.
///
/// Suffixes are binary (`K` = 1024). Zero is rejected.
pub fn parse_chunk_size(s: &str) -> Result<usize, String> {
    let mut total: usize = 1;
    for factor in s.split('*') {
        let factor = parse_factor(factor.trim())?;
        total = total
            .checked_mul(factor)
            .ok_or_else(|| format!("chunk size '{s}' is too large"))?;
    }
    if total == 0 {
        return Err("chunk size must be greater than zero".to_string());
    }
    Ok(total)
}

fn parse_factor(s: &str) -> Result<usize, String> {
    let upper = s.to_ascii_uppercase();
    let unit = upper
        .strip_suffix("IB")
        .or_else(|| upper.strip_suffix('B'))
        .unwrap_or(&upper);
    let (digits, shift) = match unit.as_bytes().last() {
        Some(b'K') => (&unit[..unit.len() - 1], 10),
        Some(b'M') => (&unit[..unit.len() - 1], 20),
        Some(b'G') => (&unit[..unit.len() - 1], 30),
        _ => (unit, 0),
    };
    let value: usize = digits
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a size"))?;
    value
        .checked_mul(1usize << shift)
        .ok_or_else(|| format!("'{s}' is too large"))
}
