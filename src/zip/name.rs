//! Entry name decoding.
//!
//! ZIP stores names as raw bytes. Flag bit 11 marks UTF-8; anything else is
//! in whatever code page the archiving tool used, IBM PC code page 437 by the
//! format's own definition. Archives made on Chinese-locale Windows use GBK.

use crate::error::{Error, Result};

/// Turns raw entry-name bytes into text.
pub trait NameDecoder: Send + Sync {
    /// `unicode` is the archive's own claim (flag bit 11) that `raw` is UTF-8.
    fn decode(&self, raw: &[u8], unicode: bool) -> Result<String>;
}

/// Built-in name decoding strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum NameEncoding {
    /// UTF-8 when flagged or valid, code page 437 otherwise
    #[default]
    Auto,
    /// Strict UTF-8; undecodable names are an error
    Utf8,
    /// IBM PC code page 437 unless the entry is flagged as UTF-8
    Cp437,
    /// GBK unless the entry is flagged as UTF-8
    Gbk,
}

const CP437_HIGH: &str = concat!(
    "ÇüéâäàåçêëèïîìÄÅ",
    "ÉæÆôöòûùÿÖÜ¢£¥₧ƒ",
    "áíóúñÑªº¿⌐¬½¼¡«»",
    "░▒▓│┤╡╢╖╕╣║╗╝╜╛┐",
    "└┴┬├─┼╞╟╚╔╩╦╠═╬╧",
    "╨╤╥╙╘╒╓╫╪┘┌█▄▌▐▀",
    "αßΓπΣσµτΦΘΩδ∞φε∩",
    "≡±≥≤⌠⌡÷≈°∙·√ⁿ²■\u{a0}",
);

fn decode_cp437(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                CP437_HIGH
                    .chars()
                    .nth((b - 0x80) as usize)
                    .unwrap_or(char::REPLACEMENT_CHARACTER)
            }
        })
        .collect()
}

fn decode_gbk(raw: &[u8]) -> Result<String> {
    let (text, had_errors) = encoding_rs::GBK.decode_without_bom_handling(raw);
    if had_errors {
        return Err(Error::InvalidName {
            name: text.into_owned(),
            reason: "not valid GBK".to_string(),
        });
    }
    Ok(text.into_owned())
}

fn decode_utf8(raw: &[u8]) -> Result<String> {
    String::from_utf8(raw.to_vec()).map_err(|e| Error::InvalidName {
        name: String::from_utf8_lossy(raw).into_owned(),
        reason: format!("not valid UTF-8: {e}"),
    })
}

impl NameDecoder for NameEncoding {
    fn decode(&self, raw: &[u8], unicode: bool) -> Result<String> {
        if unicode {
            return decode_utf8(raw);
        }
        match self {
            NameEncoding::Auto => match std::str::from_utf8(raw) {
                Ok(s) => Ok(s.to_string()),
                Err(_) => Ok(decode_cp437(raw)),
            },
            NameEncoding::Utf8 => decode_utf8(raw),
            NameEncoding::Cp437 => Ok(decode_cp437(raw)),
            NameEncoding::Gbk => decode_gbk(raw),
        }
    }
}
