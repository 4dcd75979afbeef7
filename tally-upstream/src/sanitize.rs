//! Response sanitization: encoding recovery plus XML repair.
//!
//! The upstream does not advertise its response encoding reliably and
//! splices raw control bytes and bare ampersands into text fields, so
//! every response goes through this pass before any parser sees it.

use std::sync::LazyLock;

use regex_lite::Regex;

// Numeric character references, decimal or hex. References that resolve
// to a control code point are dropped; everything else passes through.
static NUMERIC_CHAR_REFS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#([0-9]+|[xX][0-9A-Fa-f]+);").expect("static regex"));

/// Decode raw response bytes trying UTF-8, then Windows-1252, then
/// Latin-1, and repair the result into well-formed XML text.
#[must_use]
pub fn sanitize_response(bytes: &[u8]) -> String {
    let decoded = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => decode_windows_1252(bytes).unwrap_or_else(|| decode_latin1(bytes)),
    };
    sanitize_text(&decoded)
}

/// Repair already-decoded text: drop control characters and references
/// to them, then re-escape ampersands that start no recognized entity.
#[must_use]
pub fn sanitize_text(text: &str) -> String {
    let stripped = NUMERIC_CHAR_REFS.replace_all(text, |caps: &regex_lite::Captures<'_>| {
        let digits = &caps[1];
        let code = match digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => digits.parse::<u32>().ok(),
        };
        match code {
            Some(code) if is_stripped_control(code) => String::new(),
            _ => caps[0].to_string(),
        }
    });
    let mut cleaned = String::with_capacity(stripped.len());
    for ch in stripped.chars() {
        if !is_stripped_control(u32::from(ch)) {
            cleaned.push(ch);
        }
    }
    escape_lone_ampersands(&cleaned)
}

/// U+0000–U+001F except TAB, LF and CR, plus U+007F.
fn is_stripped_control(code: u32) -> bool {
    (code < 0x20 && !matches!(code, 0x09 | 0x0a | 0x0d)) || code == 0x7f
}

/// Windows-1252 has five undefined code points in the 0x80–0x9F block;
/// a payload using any of them falls through to Latin-1.
fn decode_windows_1252(bytes: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            0x81 | 0x8d | 0x8f | 0x90 | 0x9d => return None,
            0x80..=0x9f => out.push(WINDOWS_1252_C1[(byte - 0x80) as usize]),
            _ => out.push(byte as char),
        }
    }
    Some(out)
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| byte as char).collect()
}

// The 0x80–0x9F block of Windows-1252. Undefined slots keep the C1 code
// point; they are unreachable because decode_windows_1252 bails first.
const WINDOWS_1252_C1: [char; 32] = [
    '\u{20ac}', '\u{81}', '\u{201a}', '\u{192}', '\u{201e}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{2c6}', '\u{2030}', '\u{160}', '\u{2039}', '\u{152}', '\u{8d}', '\u{17d}', '\u{8f}',
    '\u{90}', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{2dc}', '\u{2122}', '\u{161}', '\u{203a}', '\u{153}', '\u{9d}', '\u{17e}', '\u{178}',
];

/// Re-escape `&` characters that do not begin a recognized entity
/// (`amp|lt|gt|quot|apos|#NNN|#xHHH`).
fn escape_lone_ampersands(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] != b'&' {
            let ch_len = utf8_len(bytes[index]);
            out.push_str(&text[index..index + ch_len]);
            index += ch_len;
            continue;
        }
        if starts_entity(&text[index..]) {
            out.push('&');
        } else {
            out.push_str("&amp;");
        }
        index += 1;
    }
    out
}

fn utf8_len(byte: u8) -> usize {
    match byte {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}

fn starts_entity(rest: &str) -> bool {
    for named in ["&amp;", "&lt;", "&gt;", "&quot;", "&apos;"] {
        if rest.starts_with(named) {
            return true;
        }
    }
    let Some(after) = rest.strip_prefix("&#") else {
        return false;
    };
    let (digits, hex): (&str, bool) = match after.strip_prefix('x').or_else(|| after.strip_prefix('X')) {
        Some(rest) => (rest, true),
        None => (after, false),
    };
    let mut count = 0;
    for ch in digits.chars() {
        if ch == ';' {
            return count > 0;
        }
        let valid = if hex {
            ch.is_ascii_hexdigit()
        } else {
            ch.is_ascii_digit()
        };
        if !valid || count >= 7 {
            return false;
        }
        count += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn utf8_passes_through() {
        assert_eq!(sanitize_response("₹ 100 £".as_bytes()), "₹ 100 £");
    }

    #[test]
    fn windows_1252_smart_quotes_decode() {
        // 0x93/0x94 are curly quotes in cp1252, invalid as UTF-8 leads.
        let bytes = b"\x93quoted\x94 \x80 100";
        assert_eq!(sanitize_response(bytes), "\u{201c}quoted\u{201d} € 100");
    }

    #[test]
    fn latin1_is_the_last_resort() {
        // 0x90 is undefined in cp1252, so the £ byte decodes via latin-1.
        let bytes = b"\x90 \xa3 12";
        assert_eq!(sanitize_response(bytes), "\u{90} \u{a3} 12");
    }

    #[test]
    fn control_characters_and_references_are_stripped() {
        assert_eq!(sanitize_text("a\u{1}b\u{7f}c\td"), "abc\td");
        assert_eq!(sanitize_text("x&#2;y&#31;z"), "xyz");
        // Hex references and the DEL references are controls too.
        assert_eq!(sanitize_text("x&#x1;y&#x1F;z"), "xyz");
        assert_eq!(sanitize_text("a&#x7f;b&#127;c"), "abc");
        // TAB, LF and CR survive, as do their references.
        assert_eq!(sanitize_text("a\tb\nc\rd"), "a\tb\nc\rd");
        assert_eq!(sanitize_text("a&#9;b&#10;c"), "a&#9;b&#10;c");
        // Non-control references pass through untouched.
        assert_eq!(sanitize_text("p&#163;q&#x41;r"), "p&#163;q&#x41;r");
    }

    #[test]
    fn lone_ampersands_are_escaped() {
        assert_eq!(sanitize_text("Tata & Sons"), "Tata &amp; Sons");
        assert_eq!(sanitize_text("A &amp; B"), "A &amp; B");
        assert_eq!(sanitize_text("x &lt; y &#163; &#x41; &"), "x &lt; y &#163; &#x41; &amp;");
        assert_eq!(sanitize_text("&bogus;"), "&amp;bogus;");
    }
}
