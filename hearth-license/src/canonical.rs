//! Canonical JSON encoding of authority payloads.
//!
//! The authority signs the output of PHP's `json_encode()` with default
//! flags, so the bytes verified here must be produced the same way:
//!
//! - object members in the order the authority sent them
//! - no whitespace
//! - `/` escaped as `\/`
//! - every non-ASCII character escaped as lowercase `\uXXXX` UTF-16 units
//! - quotes, backslashes and control characters escaped as standard JSON
//!
//! Member order only survives because `serde_json` is built with
//! `preserve_order`; parsing the response into a `BTreeMap` would break
//! every signature with more than one key out of alphabetical order.

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::Value;
use std::io::{self, Write};

/// Compact output plus PHP's default escaping of `/` and non-ASCII.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhpJsonFormatter;

impl Formatter for PhpJsonFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch != '/' && ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            if ch == '/' {
                writer.write_all(b"\\/")?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Encodes `value` exactly as the authority's signer did. The returned
/// bytes are what the signature covers.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::with_capacity(128);
    let mut serializer = Serializer::with_formatter(&mut out, PhpJsonFormatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(v: &Value) -> String {
        String::from_utf8(canonical_json(v).unwrap()).unwrap()
    }

    #[test]
    fn compact_and_ordered() {
        let v = json!({"valid": true, "expires_at": "2099-01-01", "a": [1, 2]});
        assert_eq!(encode(&v), r#"{"valid":true,"expires_at":"2099-01-01","a":[1,2]}"#);
    }

    #[test]
    fn slashes_escaped() {
        let v = json!({"url": "https://a/b"});
        assert_eq!(encode(&v), r#"{"url":"https:\/\/a\/b"}"#);
    }

    #[test]
    fn non_ascii_escaped_lowercase() {
        let v = json!("\u{ee}nregistrat\u{103}");
        assert_eq!(encode(&v), r#""\u00eenregistrat\u0103""#);
    }

    #[test]
    fn astral_plane_uses_surrogate_pair() {
        let v = json!("\u{1f511}");
        assert_eq!(encode(&v), r#""\ud83d\udd11""#);
    }

    #[test]
    fn control_characters_use_standard_escapes() {
        let v = json!("a\"b\\c\nd\u{1}");
        assert_eq!(encode(&v), r#""a\"b\\c\nd\u0001""#);
    }

    #[test]
    fn keys_are_escaped_too() {
        let v = json!({"\u{219}/x": null});
        assert_eq!(encode(&v), r#"{"\u0219\/x":null}"#);
    }
}
