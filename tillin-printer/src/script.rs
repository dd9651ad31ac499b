//! Escape script compiler
//!
//! Turns a human-authored, line-oriented script into raw printer bytes:
//!
//! ```text
//! \x1B\x40        ; init
//! \x1Ba\x01       ; center
//! Total: 12,50€
//!
//! \x1DV\x42\x01   ; cut
//! ```
//!
//! - `;` starts a comment (use `\x3B` for a literal semicolon)
//! - `\xHH`, `\n`, `\r`, `\t`, `\\` are escapes; malformed escapes stay text
//! - an empty line prints a line feed, a comment-only line prints nothing
//! - no newline is inserted between lines

use tracing::instrument;

use crate::encoding::{self, CharsetProfile};
use crate::error::PrintResult;
use crate::escpos::ByteStream;

/// Compile a script with the named encoding
///
/// Fails with `UnsupportedEncoding` before any line is processed.
#[instrument(skip(script), fields(len = script.len()))]
pub fn compile(script: &str, encoding: &str) -> PrintResult<ByteStream> {
    let profile = encoding::resolve(encoding)?;
    Ok(compile_with(script, &profile))
}

/// Compile a script with an already resolved profile
pub fn compile_with(script: &str, profile: &CharsetProfile) -> ByteStream {
    let mut stream = ByteStream::new();

    for raw_line in script.split('\n') {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        let content = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let trimmed = content.trim_end();

        if trimmed.is_empty() {
            // Preserve blank lines as a line feed
            if line.is_empty() {
                stream.push(vec![0x0A]);
            }
            continue;
        }

        compile_line(trimmed, profile, &mut stream);
    }

    stream
}

fn compile_line(text: &str, profile: &CharsetProfile, stream: &mut ByteStream) {
    let chars: Vec<char> = text.chars().collect();
    let mut normal = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(bytes) = profile.substitution(c) {
            flush(&mut normal, profile, stream);
            stream.push(bytes.to_vec());
            i += 1;
            continue;
        }

        if c == '\\'
            && let Some((byte, consumed)) = escape(&chars[i + 1..])
        {
            flush(&mut normal, profile, stream);
            stream.push(vec![byte]);
            i += consumed;
            continue;
        }

        normal.push(c);
        i += 1;
    }

    flush(&mut normal, profile, stream);
}

/// Decode the escape following a backslash.
///
/// Returns the byte and the number of chars consumed including the backslash.
fn escape(rest: &[char]) -> Option<(u8, usize)> {
    match rest.first()? {
        'x' => {
            let hi = rest.get(1)?.to_digit(16)?;
            let lo = rest.get(2)?.to_digit(16)?;
            Some(((hi * 16 + lo) as u8, 4))
        }
        'n' => Some((0x0A, 2)),
        'r' => Some((0x0D, 2)),
        't' => Some((0x09, 2)),
        '\\' => Some((0x5C, 2)),
        _ => None,
    }
}

fn flush(normal: &mut String, profile: &CharsetProfile, stream: &mut ByteStream) {
    if normal.is_empty() {
        return;
    }
    stream.push(profile.encode(normal));
    normal.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrintError;

    fn bytes(script: &str, encoding: &str) -> Vec<u8> {
        compile(script, encoding).unwrap().into_bytes()
    }

    #[test]
    fn test_hex_escapes() {
        assert_eq!(bytes(r"\x41\x42", "cp850"), vec![0x41, 0x42]);
        assert_eq!(bytes(r"\x1b\x40", "cp850"), vec![0x1B, 0x40]);
    }

    #[test]
    fn test_invalid_hex_is_literal() {
        assert_eq!(bytes(r"\xZZ", "cp850"), br"\xZZ".to_vec());
        // Too short to be an escape
        assert_eq!(bytes(r"A\x4", "cp850"), br"A\x4".to_vec());
    }

    #[test]
    fn test_simple_escapes() {
        assert_eq!(bytes(r"a\nb\rc\td\\e", "cp850"), b"a\nb\rc\td\\e".to_vec());
        // Unknown escape stays literal
        assert_eq!(bytes(r"\q", "cp850"), br"\q".to_vec());
        // Trailing backslash stays literal
        assert_eq!(bytes(r"end\", "cp850"), br"end\".to_vec());
    }

    #[test]
    fn test_comments_and_blank_lines() {
        assert_eq!(bytes("; note", "cp850"), Vec::<u8>::new());
        assert_eq!(bytes("", "cp850"), vec![0x0A]);
        assert_eq!(bytes("   ", "cp850"), Vec::<u8>::new());
        assert_eq!(bytes("A ; trailing comment", "cp850"), vec![b'A']);
    }

    #[test]
    fn test_scenario_comment_between_lines() {
        assert_eq!(bytes("A\n; comment\nB", "cp850"), vec![0x41, 0x0A, 0x42]);
    }

    #[test]
    fn test_crlf_lines() {
        assert_eq!(bytes("A\r\n\r\nB\r\n", "cp850"), vec![b'A', 0x0A, b'B', 0x0A]);
    }

    #[test]
    fn test_euro_substitution() {
        assert_eq!(bytes("9€", "cp858"), vec![b'9', 0xD5]);
        assert_eq!(bytes("9€", "cp850"), vec![b'9', b'?']);
    }

    #[test]
    fn test_accented_text_is_encoded() {
        assert_eq!(bytes("Café", "cp850"), vec![b'C', b'a', b'f', 0x82]);
        assert_eq!(bytes("Café", "latin1"), vec![b'C', b'a', b'f', 0xE9]);
    }

    #[test]
    fn test_ascii_round_trip() {
        let text = "Hello, printer! 0123456789 ~{}[]";
        let profile = encoding::resolve("cp850").unwrap();
        let out = compile_with(text, &profile).into_bytes();
        assert_eq!(profile.codec().decode(&out), text);
    }

    #[test]
    fn test_unsupported_encoding() {
        assert!(matches!(
            compile("A", "ebcdic-klingon"),
            Err(PrintError::UnsupportedEncoding(_))
        ));
    }
}
