//! Canonical JSON serialization
//!
//! The canonical form is what gets hashed into an event id, so it has to be
//! byte-for-byte reproducible by any implementation:
//! - object keys sorted ascending by byte-wise UTF-8 comparison
//! - arrays keep their order
//! - compact output, no whitespace
//! - floats written the way ECMAScript `Number::toString` writes them:
//!   shortest round-trip digits, plain notation from 1e-6 up to 1e21,
//!   exponent notation with an explicit sign (`1e+21`, `1.5e-7`) outside it

use serde::Serialize;
use serde_json::{Number, Value};

use super::EventResult;

/// Serialize any value into canonical bytes
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> EventResult<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(canonical_bytes(&value))
}

/// Canonical bytes of an already parsed JSON value
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(out, key);
                out.push(b':');
                write_value(out, item);
            }
            out.push(b'}');
        }
    }
}

fn write_number(out: &mut Vec<u8>, n: &Number) {
    if n.is_u64() || n.is_i64() {
        out.extend_from_slice(n.to_string().as_bytes());
        return;
    }
    out.extend_from_slice(float_text(&n.to_string()).as_bytes());
}

/// Rewrite serde_json's shortest float text (`1e21`, `123.0`, `1.5e-7`)
/// into ECMAScript notation
fn float_text(shortest: &str) -> String {
    let (negative, unsigned) = match shortest.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, shortest),
    };
    let (mantissa, exponent) = match unsigned.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or(0)),
        None => (unsigned, 0),
    };

    // value = 0.DIGITS * 10^point
    let integer_len = mantissa.find('.').unwrap_or(mantissa.len()) as i32;
    let mut digits: Vec<u8> = mantissa.bytes().filter(u8::is_ascii_digit).collect();
    let mut point = integer_len + exponent;

    let leading = digits.iter().take_while(|&&d| d == b'0').count();
    digits.drain(..leading);
    point -= leading as i32;
    while digits.last() == Some(&b'0') {
        digits.pop();
    }

    if digits.is_empty() {
        // Covers -0
        return "0".to_string();
    }

    let k = digits.len() as i32;
    let digits = String::from_utf8_lossy(&digits).into_owned();
    let mut text = String::new();
    if negative {
        text.push('-');
    }

    if k <= point && point <= 21 {
        text.push_str(&digits);
        text.extend(std::iter::repeat('0').take((point - k) as usize));
    } else if 0 < point && point <= 21 {
        text.push_str(&digits[..point as usize]);
        text.push('.');
        text.push_str(&digits[point as usize..]);
    } else if -6 < point && point <= 0 {
        text.push_str("0.");
        text.extend(std::iter::repeat('0').take((-point) as usize));
        text.push_str(&digits);
    } else {
        let exponent = point - 1;
        text.push_str(&digits[..1]);
        if k > 1 {
            text.push('.');
            text.push_str(&digits[1..]);
        }
        text.push('e');
        text.push(if exponent < 0 { '-' } else { '+' });
        text.push_str(&exponent.abs().to_string());
    }
    text
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    const HEX: &[u8; 16] = b"0123456789abcdef";

    out.push(b'"');
    for &byte in s.as_bytes() {
        match byte {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0c => out.extend_from_slice(b"\\f"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x00..=0x1f => {
                out.extend_from_slice(b"\\u00");
                out.push(HEX[(byte >> 4) as usize]);
                out.push(HEX[(byte & 0x0f) as usize]);
            }
            // Multi-byte UTF-8 sequences never contain bytes below 0x80
            _ => out.push(byte),
        }
    }
    out.push(b'"');
}
