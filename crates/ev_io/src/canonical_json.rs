//! Canonical JSON (byte-deterministic serialization).
//!
//! - Objects: keys sorted lexicographically (UTF-8 codepoint order) at every
//!   nesting depth
//! - Arrays: order preserved (caller is responsible for stable ordering)
//! - Separators `","` and `":"`, no insignificant whitespace, no trailing
//!   newline
//! - Non-ASCII escaped as `\uXXXX` (UTF-16 pairs above the BMP) so output is
//!   ASCII-safe byte-for-byte across platforms
//! - Numbers rendered exactly as serde_json holds them (no reformatting)
//!
//! Contract: structurally equal values (modulo object key order) serialize
//! to identical bytes; insertion order of map keys is irrelevant.

use serde::Serialize;
use serde_json::Value;

use crate::{IoError, IoResult};

/// Serialize any `Serialize` into canonical JSON bytes.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let v = serde_json::to_value(value)?;
    let mut out = Vec::with_capacity(1024);
    write_canonical_value(&v, &mut out);
    Ok(out)
}

/// Canonical JSON as a `String` (always valid ASCII by construction).
pub fn to_canonical_string<T: Serialize>(value: &T) -> IoResult<String> {
    let bytes = to_canonical_bytes(value)?;
    String::from_utf8(bytes).map_err(|e| IoError::Invalid(e.to_string()))
}

fn write_canonical_value(v: &Value, out: &mut Vec<u8>) {
    match v {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_escaped_string(s, out),
        Value::Array(arr) => {
            out.push(b'[');
            let mut first = true;
            for elem in arr {
                if !first {
                    out.push(b',');
                }
                first = false;
                write_canonical_value(elem, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
            keys.sort_unstable();
            let mut first = true;
            for k in keys {
                if !first {
                    out.push(b',');
                }
                first = false;
                write_escaped_string(k, out);
                out.push(b':');
                write_canonical_value(&map[k], out);
            }
            out.push(b'}');
        }
    }
}

/// JSON string literal with ASCII-safe escaping.
///
/// Short escapes for the usual control characters, `\u00xx` for the rest of
/// the control range, `\uXXXX` (lowercase hex, UTF-16 units) for everything
/// outside printable ASCII.
fn write_escaped_string(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{8}' => out.extend_from_slice(b"\\b"),
            '\u{c}' => out.extend_from_slice(b"\\f"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                push_u16_escape(c as u16, out);
            }
            c if c.is_ascii() => out.push(c as u8),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    push_u16_escape(*unit, out);
                }
            }
        }
    }
    out.push(b'"');
}

fn push_u16_escape(unit: u16, out: &mut Vec<u8>) {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    out.extend_from_slice(b"\\u");
    out.push(HEX[((unit >> 12) & 0xF) as usize]);
    out.push(HEX[((unit >> 8) & 0xF) as usize]);
    out.push(HEX[((unit >> 4) & 0xF) as usize]);
    out.push(HEX[(unit & 0xF) as usize]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn objects_are_sorted_arrays_preserved() {
        let v = json!({
            "b": 1,
            "a": { "y": 1, "x": 2 },
            "arr": [ {"k":2,"j":1}, 3, "z" ]
        });
        let s = to_canonical_string(&v).unwrap();
        assert_eq!(s, r#"{"a":{"x":2,"y":1},"arr":[{"j":1,"k":2},3,"z"],"b":1}"#);
    }

    #[test]
    fn no_trailing_newline_or_spaces() {
        let bytes = to_canonical_bytes(&json!({"a": 1, "b": [1, 2]})).unwrap();
        assert!(!bytes.ends_with(b"\n"));
        assert!(!bytes.contains(&b' '));
    }

    #[test]
    fn non_ascii_is_escaped() {
        let s = to_canonical_string(&json!({"name": "Zoë"})).unwrap();
        assert_eq!(s, r#"{"name":"Zo\u00eb"}"#);
        // Astral plane escapes as a surrogate pair.
        let s = to_canonical_string(&json!("𝄞")).unwrap();
        assert_eq!(s, r#""\ud834\udd1e""#);
    }

    #[test]
    fn control_characters_use_short_escapes() {
        let s = to_canonical_string(&json!("a\tb\nc\u{1}")).unwrap();
        assert_eq!(s, r#""a\tb\nc\u0001""#);
    }

    #[test]
    fn null_and_bools_render_bare() {
        let s = to_canonical_string(&json!({"t": true, "f": false, "n": null})).unwrap();
        assert_eq!(s, r#"{"f":false,"n":null,"t":true}"#);
    }

    proptest! {
        // Key insertion order must never leak into the canonical bytes.
        #[test]
        fn key_order_is_irrelevant(
            entries in proptest::collection::btree_map("[a-z]{1,8}", 0i64..1000, 1..8),
        ) {
            let mut fwd = serde_json::Map::new();
            for (k, v) in &entries {
                fwd.insert(k.clone(), json!(v));
            }
            let mut rev = serde_json::Map::new();
            for (k, v) in entries.iter().rev() {
                rev.insert(k.clone(), json!(v));
            }
            let a = to_canonical_bytes(&Value::Object(fwd)).unwrap();
            let b = to_canonical_bytes(&Value::Object(rev)).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
