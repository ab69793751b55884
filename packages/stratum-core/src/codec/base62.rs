//! Base62 encoding of non-negative integers.
//!
//! Used directly for integer attributes and as a building block by the
//! fixed-point, money, geo, and embedding codecs. Roughly 30-40% shorter than
//! decimal for values at or above one million.

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: u64 = 62;

/// Encodes a non-negative integer as a base62 string.
///
/// `0` encodes to `"0"`, not the empty string.
#[must_use]
pub fn encode(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let digit = (value % BASE) as usize;
        digits.push(ALPHABET[digit]);
        value /= BASE;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base62 alphabet is ASCII")
}

/// Decodes a base62 string back into an integer.
///
/// # Errors
///
/// Returns an error if the string is empty or contains a character outside
/// the base62 alphabet (`0-9A-Za-z`).
pub fn decode(s: &str) -> Result<u64, String> {
    if s.is_empty() {
        return Err("base62: empty input".to_string());
    }
    let mut value: u64 = 0;
    for c in s.bytes() {
        let digit = ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or_else(|| format!("base62: invalid character '{}'", c as char))?;
        value = value
            .checked_mul(BASE)
            .and_then(|v| v.checked_add(digit as u64))
            .ok_or_else(|| "base62: value overflows u64".to_string())?;
    }
    Ok(value)
}

/// Encodes a signed integer using a leading sign nibble: the magnitude is
/// base62-encoded and prefixed with `-` for negative values, nothing for
/// non-negative ones. Used by codecs (fixed-point, money) whose domain
/// includes negative values.
#[must_use]
pub fn encode_signed(value: i64) -> String {
    if value < 0 {
        format!("-{}", encode(value.unsigned_abs()))
    } else {
        encode(value as u64)
    }
}

/// Inverse of [`encode_signed`].
///
/// # Errors
///
/// Returns an error if the magnitude is not valid base62, or (for negative
/// inputs) if the magnitude cannot be represented as `i64`.
pub fn decode_signed(s: &str) -> Result<i64, String> {
    if let Some(rest) = s.strip_prefix('-') {
        let magnitude = decode(rest)?;
        i64::try_from(magnitude)
            .map(|v| -v)
            .map_err(|_| "base62: magnitude overflows i64".to_string())
    } else {
        let magnitude = decode(s)?;
        i64::try_from(magnitude).map_err(|_| "base62: value overflows i64".to_string())
    }
}
