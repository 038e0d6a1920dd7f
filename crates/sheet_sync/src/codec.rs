//! Sheet file encoding
//!
//! ```text
//! <password> <version>
//! <cellName> <contents>
//! ```
//!
//! Names and contents are escaped so that any string round-trips: `\\`,
//! `\n`, `\r` and `\t` everywhere, `\s` for a space inside a name or at the
//! start of contents, and `\u{..}` for any other whitespace in those
//! positions. Decoding is lenient past the header: blank lines are skipped,
//! a name without contents is an empty cell, unknown escapes are kept as-is
//! and invalid UTF-8 in cell lines is replaced.

use std::collections::BTreeMap;

/// First line of a sheet file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub password: String,
    pub version: u64,
}

/// Fully decoded sheet file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSheet {
    pub header: Header,
    pub cells: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("missing header line")]
    MissingHeader,

    #[error("header is not valid UTF-8")]
    HeaderEncoding,

    #[error("header must be '<password> <version>', found {0} token(s)")]
    HeaderShape(usize),

    #[error("invalid version '{0}'")]
    BadVersion(String),
}

/// Encode a sheet. Cells with an empty name are not representable and are skipped.
pub fn encode(password: &str, version: u64, cells: &BTreeMap<String, String>) -> String {
    let mut out = format!("{} {}\n", password, version);
    for (name, contents) in cells {
        if name.is_empty() {
            tracing::warn!("Skipping cell with empty name ({} bytes of contents)", contents.len());
            continue;
        }
        out.push_str(&escape_name(name));
        out.push(' ');
        out.push_str(&escape_contents(contents));
        out.push('\n');
    }
    out
}

/// Decode a whole sheet file
pub fn decode(input: &str) -> Result<DecodedSheet, DecodeError> {
    decode_bytes(input.as_bytes())
}

/// Decode raw file bytes. The header must be UTF-8; invalid sequences in cell
/// lines are replaced with U+FFFD instead of failing the whole sheet.
pub fn decode_bytes(input: &[u8]) -> Result<DecodedSheet, DecodeError> {
    if input.is_empty() {
        return Err(DecodeError::MissingHeader);
    }

    let (header_line, body): (&[u8], &[u8]) = match input.iter().position(|&b| b == b'\n') {
        Some(newline) => (&input[..newline], &input[newline + 1..]),
        None => (input, &[]),
    };
    let header_line = std::str::from_utf8(header_line).map_err(|_| DecodeError::HeaderEncoding)?;
    let header = decode_header(header_line)?;

    Ok(DecodedSheet {
        header,
        cells: decode_cells(&String::from_utf8_lossy(body)),
    })
}

fn decode_cells(body: &str) -> BTreeMap<String, String> {
    let mut cells = BTreeMap::new();
    for line in body.lines() {
        let line = line.trim_start();
        if line.is_empty() {
            continue;
        }

        let (name, rest) = match line.find(char::is_whitespace) {
            Some(split) => (&line[..split], line[split..].trim_start()),
            None => (line, ""),
        };

        let contents = unescape(rest);
        if contents.is_empty() {
            continue;
        }
        cells.insert(unescape(name), contents);
    }
    cells
}

/// Decode only the header line
pub fn decode_header(line: &str) -> Result<Header, DecodeError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != 2 {
        return Err(DecodeError::HeaderShape(tokens.len()));
    }

    let version = tokens[1]
        .parse::<u64>()
        .map_err(|_| DecodeError::BadVersion(tokens[1].to_string()))?;

    Ok(Header {
        password: tokens[0].to_string(),
        version,
    })
}

fn push_escaped(out: &mut String, c: char, whitespace_sensitive: bool) {
    match c {
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        ' ' if whitespace_sensitive => out.push_str("\\s"),
        c if whitespace_sensitive && c.is_whitespace() => {
            out.push_str(&format!("\\u{{{:x}}}", c as u32));
        }
        c => out.push(c),
    }
}

pub fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        push_escaped(&mut out, c, true);
    }
    out
}

/// Only the first character of contents is whitespace sensitive, since the
/// decoder swallows the separator run before it.
pub fn escape_contents(contents: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    for (i, c) in contents.chars().enumerate() {
        push_escaped(&mut out, c, i == 0);
    }
    out
}

pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('s') => out.push(' '),
            Some('u') => {
                chars.next();
                match read_unicode_escape(&mut chars) {
                    Some(decoded) => out.push(decoded),
                    None => out.push_str("\\u"),
                }
                continue;
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => {
                out.push('\\');
                continue;
            }
        }
        chars.next();
    }

    out
}

/// Reads `{hex}` after `\u`; consumes nothing when the escape is malformed.
fn read_unicode_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<char> {
    let lookahead: String = chars.clone().take(10).collect();
    let body = lookahead.strip_prefix('{')?;
    let end = body.find('}')?;
    let digits = &body[..end];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let decoded = u32::from_str_radix(digits, 16)
        .ok()
        .and_then(char::from_u32)?;

    // '{' + hex digits + '}'
    for _ in 0..end + 2 {
        chars.next();
    }
    Some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_encode_layout() {
        let encoded = encode("secret", 3, &cells(&[("B2", "hello world"), ("A1", "42")]));
        assert_eq!(encoded, "secret 3\nA1 42\nB2 hello world\n");
    }

    #[test]
    fn test_decode_plain_file() {
        let decoded = decode("secret 7\nA1 42\nB2 hello   world\n").unwrap();
        assert_eq!(decoded.header.password, "secret");
        assert_eq!(decoded.header.version, 7);
        assert_eq!(decoded.cells["A1"], "42");
        // Internal spaces survive, only the separator run is swallowed.
        assert_eq!(decoded.cells["B2"], "hello   world");
    }

    #[test]
    fn test_awkward_contents_round_trip() {
        let original = cells(&[
            ("A1", "line one\nline two"),
            ("A2", "C:\\temp\\new"),
            ("A3", "  leading spaces"),
            ("A4", "\ttabbed\r\n"),
            ("my cell", "name has a space"),
            ("A5", "literal \\n is not a newline"),
        ]);

        let decoded = decode(&encode("pw", 12, &original)).unwrap();
        assert_eq!(decoded.cells, original);
        assert_eq!(decoded.header.version, 12);
    }

    #[test]
    fn test_unusual_whitespace_in_names() {
        let original = cells(&[("a\u{a0}b", "nbsp in name"), ("x", "\u{2003}em space")]);
        let decoded = decode(&encode("pw", 0, &original)).unwrap();
        assert_eq!(decoded.cells, original);
    }

    #[test]
    fn test_empty_name_is_skipped() {
        let encoded = encode("pw", 1, &cells(&[("", "orphan"), ("A1", "kept")]));
        assert_eq!(encoded, "pw 1\nA1 kept\n");
    }

    #[test]
    fn test_lenient_cell_lines() {
        let decoded = decode("pw 2\n\n   \nA1\nB1    spaced\n  C1 indented\n").unwrap();
        assert!(!decoded.cells.contains_key("A1"));
        assert_eq!(decoded.cells["B1"], "spaced");
        assert_eq!(decoded.cells["C1"], "indented");
    }

    #[test]
    fn test_unknown_and_truncated_escapes_are_literal() {
        assert_eq!(unescape("a\\qb"), "a\\qb");
        assert_eq!(unescape("end\\"), "end\\");
        assert_eq!(unescape("\\u{zz}"), "\\u{zz}");
        assert_eq!(unescape("\\u41"), "\\u41");
        assert_eq!(unescape("\\u{+41}"), "\\u{+41}");
        assert_eq!(unescape("\\u{}"), "\\u{}");
        assert_eq!(unescape("\\u{41}"), "A");
    }

    #[test]
    fn test_header_errors() {
        assert_eq!(decode(""), Err(DecodeError::MissingHeader));
        assert_eq!(decode_header("onlypassword"), Err(DecodeError::HeaderShape(1)));
        assert_eq!(decode_header("pw 1 extra"), Err(DecodeError::HeaderShape(3)));
        assert_eq!(
            decode_header("pw -1"),
            Err(DecodeError::BadVersion("-1".to_string()))
        );
    }

    #[test]
    fn test_invalid_utf8_only_fails_in_header() {
        let decoded = decode_bytes(b"secret 3\nA1 42\nB1 caf\xE9\n").unwrap();
        assert_eq!(decoded.header.version, 3);
        assert_eq!(decoded.cells["A1"], "42");
        assert_eq!(decoded.cells["B1"], "caf\u{FFFD}");

        assert_eq!(
            decode_bytes(b"s\xE9cret 3\nA1 42\n"),
            Err(DecodeError::HeaderEncoding)
        );
    }

    #[test]
    fn test_crlf_files_decode() {
        let decoded = decode("pw 4\r\nA1 42\r\n").unwrap();
        assert_eq!(decoded.header.version, 4);
        assert_eq!(decoded.cells["A1"], "42");
    }
}
