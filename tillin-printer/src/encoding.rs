//! Charset resolution for ESC/POS text
//!
//! Thermal printers expect text in the code page selected on the device.
//! This module maps a logical encoding name to:
//! - a byte codec (PC850, true Latin-1, or any WHATWG encoding via `encoding_rs`)
//! - codepage-specific substitutions (the Euro sign on PC858)
//!
//! Unknown names fail closed with `UnsupportedEncoding`.

use encoding_rs::{EncoderResult, Encoding};

use crate::error::{PrintError, PrintResult};

/// Byte written for characters the codec cannot represent
const UNMAPPABLE: u8 = b'?';

/// PC858 is PC850 with the Euro sign at 0xD5
const EURO_PC858: &[(char, &[u8])] = &[('€', &[0xD5])];

/// Upper half (0x80..=0xFF) of IBM code page 850
const CP850_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', 'ø', '£', 'Ø', '×', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '®', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', 'Á', 'Â', 'À', '©', '╣', '║', '╗', '╝', '¢', '¥', '┐', //
    '└', '┴', '┬', '├', '─', '┼', 'ã', 'Ã', '╚', '╔', '╩', '╦', '╠', '═', '╬', '¤', //
    'ð', 'Ð', 'Ê', 'Ë', 'È', 'ı', 'Í', 'Î', 'Ï', '┘', '┌', '█', '▄', '¦', 'Ì', '▀', //
    'Ó', 'ß', 'Ô', 'Ò', 'õ', 'Õ', 'µ', 'þ', 'Þ', 'Ú', 'Û', 'Ù', 'ý', 'Ý', '¯', '´', //
    '\u{AD}', '±', '‗', '¾', '¶', '§', '÷', '¸', '°', '¨', '·', '¹', '³', '²', '■', '\u{A0}',
];

/// Byte codec backing a charset profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// IBM code page 850 (multilingual Latin-1, DOS)
    Cp850,
    /// ISO-8859-1, one byte per code point up to U+00FF
    Latin1,
    /// Any encoding known to `encoding_rs`
    Standard(&'static Encoding),
}

impl Codec {
    /// Canonical codec name
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Cp850 => "IBM850",
            Codec::Latin1 => "ISO-8859-1",
            Codec::Standard(encoding) => encoding.name(),
        }
    }

    /// Encode text, writing `?` for unmappable characters
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Codec::Cp850 => text.chars().map(cp850_byte).collect(),
            Codec::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(UNMAPPABLE))
                .collect(),
            Codec::Standard(encoding) => encode_standard(encoding, text),
        }
    }

    /// Decode bytes back into text
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Codec::Cp850 => bytes
                .iter()
                .map(|&b| {
                    if b < 0x80 {
                        b as char
                    } else {
                        CP850_HIGH[(b - 0x80) as usize]
                    }
                })
                .collect(),
            Codec::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            Codec::Standard(encoding) => encoding
                .decode_without_bom_handling(bytes)
                .0
                .into_owned(),
        }
    }
}

fn cp850_byte(c: char) -> u8 {
    if c.is_ascii() {
        return c as u8;
    }
    CP850_HIGH
        .iter()
        .position(|&high| high == c)
        .map(|idx| 0x80 + idx as u8)
        .unwrap_or(UNMAPPABLE)
}

/// Encode through `encoding_rs` without its HTML numeric-reference fallback,
/// which a printer would print literally.
fn encode_standard(encoding: &'static Encoding, text: &str) -> Vec<u8> {
    let mut encoder = encoding.new_encoder();
    let mut out = Vec::with_capacity(text.len());
    let mut chunk = [0u8; 1024];
    let mut src = text;

    loop {
        let (result, read, written) =
            encoder.encode_from_utf8_without_replacement(src, &mut chunk, true);
        out.extend_from_slice(&chunk[..written]);
        src = &src[read..];
        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => continue,
            EncoderResult::Unmappable(_) => out.push(UNMAPPABLE),
        }
    }

    out
}

/// A resolved encoding: codec plus special substitutions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharsetProfile {
    name: &'static str,
    codec: Codec,
    substitutions: &'static [(char, &'static [u8])],
}

impl CharsetProfile {
    fn new(name: &'static str, codec: Codec, substitutions: &'static [(char, &'static [u8])]) -> Self {
        Self {
            name,
            codec,
            substitutions,
        }
    }

    /// Canonical profile name (e.g. "IBM00858", "UTF-8")
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn substitutions(&self) -> &'static [(char, &'static [u8])] {
        self.substitutions
    }

    /// Substituted output bytes for `c`, if this profile overrides it
    pub fn substitution(&self, c: char) -> Option<&'static [u8]> {
        self.substitutions
            .iter()
            .find(|(from, _)| *from == c)
            .map(|(_, bytes)| *bytes)
    }

    /// Encode text, applying substitutions before the codec
    pub fn encode(&self, text: &str) -> Vec<u8> {
        if self.substitutions.is_empty() {
            return self.codec.encode(text);
        }

        let mut out = Vec::with_capacity(text.len());
        let mut start = 0;
        for (idx, c) in text.char_indices() {
            if let Some(bytes) = self.substitution(c) {
                out.extend(self.codec.encode(&text[start..idx]));
                out.extend_from_slice(bytes);
                start = idx + c.len_utf8();
            }
        }
        out.extend(self.codec.encode(&text[start..]));
        out
    }
}

/// Resolve a logical encoding name (case-insensitive)
///
/// - `cp858` / `ibm858` / `ibm00858`: PC850 codec, Euro sign as 0xD5
/// - `cp850` / `ibm850`: PC850 codec
/// - `latin1` / `iso-8859-1`: true Latin-1
/// - anything else: WHATWG label lookup (`utf-8`, `windows-1252`, `gbk`, ...),
///   limited to encodings that can encode into themselves
pub fn resolve(name: &str) -> PrintResult<CharsetProfile> {
    let lower = name.to_ascii_lowercase();
    let profile = match lower.as_str() {
        "cp858" | "ibm858" | "ibm00858" => {
            CharsetProfile::new("IBM00858", Codec::Cp850, EURO_PC858)
        }
        "cp850" | "ibm850" => CharsetProfile::new("IBM850", Codec::Cp850, &[]),
        "latin1" | "iso-8859-1" => CharsetProfile::new("ISO-8859-1", Codec::Latin1, &[]),
        _ => {
            // UTF-16 and `replacement` encoders emit UTF-8, not their own bytes
            let encoding = Encoding::for_label(lower.as_bytes())
                .filter(|encoding| encoding.output_encoding() == *encoding)
                .ok_or_else(|| PrintError::UnsupportedEncoding(name.to_string()))?;
            CharsetProfile::new(encoding.name(), Codec::Standard(encoding), &[])
        }
    };
    Ok(profile)
}
