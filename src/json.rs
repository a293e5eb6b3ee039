//! JSON string scalar escaping and unescaping.
//!
//! `escape` only touches backslash, quote, newline and carriage return.
//! `unescape_range` decodes a string body in place without parsing the
//! surrounding document.

/// Backslash-escape `\` and `"`, and turn newline / carriage return into the
/// two-character escapes. Every other character is passed through unchanged,
/// so other control characters are not representable in the output.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Decode a whole JSON string body (no surrounding quotes).
pub fn unescape(s: &str) -> String {
    unescape_range(s.as_bytes(), 0, s.len())
}

/// Decode the JSON string body found between `start` and `end` in `bytes`.
///
/// - `\uXXXX` high surrogates are paired with an immediately following low
///   surrogate; a lone surrogate becomes U+FFFD and only its own escape is
///   consumed.
/// - `\u` with a non-hex digit drops the `u` and keeps scanning.
/// - Any other unknown escape yields the escaped character itself.
/// - A truncated escape at the end of the range stops decoding.
pub fn unescape_range(bytes: &[u8], start: usize, end: usize) -> String {
    let end = end.min(bytes.len());
    let start = start.min(end);
    let s = &bytes[start..end];

    let mut out: Vec<u8> = Vec::with_capacity(s.len());
    let mut p = 0;
    while p < s.len() {
        if s[p] != b'\\' {
            out.push(s[p]);
            p += 1;
            continue;
        }
        p += 1;
        let Some(&esc) = s.get(p) else { break };
        match esc {
            b'"' | b'\\' | b'/' => {
                out.push(esc);
                p += 1;
            }
            b'b' => {
                out.push(0x08);
                p += 1;
            }
            b'f' => {
                out.push(0x0c);
                p += 1;
            }
            b'n' => {
                out.push(b'\n');
                p += 1;
            }
            b'r' => {
                out.push(b'\r');
                p += 1;
            }
            b't' => {
                out.push(b'\t');
                p += 1;
            }
            b'u' => {
                // Four hex digits must follow the `u`.
                if p + 4 >= s.len() {
                    break;
                }
                let Some(unit) = hex4(&s[p + 1..p + 5]) else {
                    p += 1;
                    continue;
                };
                p += 5;

                if (0xD800..=0xDBFF).contains(&unit) {
                    let low = (p + 6 <= s.len() && s[p] == b'\\' && s[p + 1] == b'u')
                        .then(|| hex4(&s[p + 2..p + 6]))
                        .flatten()
                        .filter(|lo| (0xDC00..=0xDFFF).contains(lo));
                    match low {
                        Some(lo) => {
                            let cp = 0x10000 + (((unit - 0xD800) << 10) | (lo - 0xDC00));
                            push_code_point(&mut out, cp);
                            p += 6;
                        }
                        None => push_code_point(&mut out, 0xFFFD),
                    }
                } else {
                    push_code_point(&mut out, unit);
                }
            }
            other => {
                out.push(other);
                p += 1;
            }
        }
    }

    match String::from_utf8(out) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

fn hex4(digits: &[u8]) -> Option<u32> {
    digits.iter().try_fold(0u32, |acc, &d| {
        let v = (d as char).to_digit(16)?;
        Some((acc << 4) | v)
    })
}

fn push_code_point(out: &mut Vec<u8>, cp: u32) {
    // Unpaired low surrogates have no UTF-8 encoding.
    let c = char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER);
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_quotes_backslashes_and_newlines() {
        assert_eq!(escape(r#"say "hi"\now"#), r#"say \"hi\"\\now"#);
        assert_eq!(escape("a\nb\r\n"), "a\\nb\\r\\n");
    }

    #[test]
    fn escape_leaves_other_control_characters_alone() {
        assert_eq!(escape("a\tb"), "a\tb");
        assert_eq!(escape("héllo ✓"), "héllo ✓");
    }

    #[test]
    fn simple_escapes_decode() {
        assert_eq!(unescape(r#"a\"b\\c\/d"#), "a\"b\\c/d");
        assert_eq!(unescape(r"\b\f\n\r\t"), "\u{8}\u{c}\n\r\t");
    }

    #[test]
    fn round_trips_through_escape() {
        for s in ["plain", "quote \" and \\ slash", "multi\nline\r\ntext", "ünïcødé 🎉", ""] {
            assert_eq!(unescape(&escape(s)), s);
        }
    }

    #[test]
    fn basic_multilingual_plane_escape() {
        assert_eq!(unescape(r"caf\u00e9"), "café");
        assert_eq!(unescape(r"\u4F60\u597d"), "你好");
    }

    #[test]
    fn surrogate_pair_combines_into_one_code_point() {
        let out = unescape(r"\uD83D\uDE00");
        assert_eq!(out, "\u{1F600}");
        assert_eq!(out.as_bytes(), &[0xF0, 0x9F, 0x98, 0x80]);
    }

    #[test]
    fn lone_high_surrogate_becomes_one_replacement_char() {
        assert_eq!(unescape(r"\uD800"), "\u{FFFD}");
        // Only the six-byte escape is consumed; what follows is kept.
        assert_eq!(unescape(r"\uD800abc"), "\u{FFFD}abc");
        assert_eq!(unescape(r"\uD800A"), "\u{FFFD}A");
    }

    #[test]
    fn lone_low_surrogate_becomes_replacement_char() {
        assert_eq!(unescape(r"x\uDC00y"), "x\u{FFFD}y");
    }

    #[test]
    fn unknown_escape_passes_character_through() {
        assert_eq!(unescape(r"\q\x"), "qx");
    }

    #[test]
    fn bad_hex_drops_only_the_u() {
        assert_eq!(unescape(r"\uZZZZ!"), "ZZZZ!");
    }

    #[test]
    fn truncated_escapes_stop_decoding() {
        assert_eq!(unescape("abc\\"), "abc");
        assert_eq!(unescape(r"abc\u00"), "abc");
        assert_eq!(unescape(r"abc\u004"), "abc");
    }

    #[test]
    fn range_offsets_select_a_slice() {
        let raw = br#"{"content":"Hi\nthere"}"#;
        assert_eq!(unescape_range(raw, 12, 21), "Hi\nthere");
        assert_eq!(unescape_range(raw, 12, 999), "Hi\nthere\"}");
        assert_eq!(unescape_range(raw, 50, 10), "");
    }
}
