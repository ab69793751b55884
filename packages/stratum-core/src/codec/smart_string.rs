//! "Smart string" codec.
//!
//! Scans the input and picks the cheapest reversible representation:
//!
//! 1. A small fixed dictionary of common tokens (status names, HTTP verbs,
//!    common content types, URL prefixes) maps to sub-5-byte sigils.
//! 2. All-printable-ASCII input is stored as-is.
//! 3. All-Latin-1 input is URL percent-encoded with a `u:` prefix.
//! 4. Anything else is base64-encoded with a `b:` prefix.
//!
//! Decoding peeks at the first two bytes to pick the inverse: a dictionary
//! sigil, `u:`, `b:`, or else as-is.
//!
//! An LRU cache of bounded size remembers the encode-path classification for
//! previously-seen strings, since schema-typed attributes repeat values
//! (status enums, country codes) far more than they vary.

use base64::Engine as _;
use quick_cache::sync::Cache;
use std::sync::OnceLock;

const DICT_SIGIL_PREFIX: char = '\u{1}';

/// Small fixed dictionary of common tokens. Order matters only for the
/// reverse lookup table built once at first use.
const DICTIONARY: &[&str] = &[
    "true", "false", "null", "active", "inactive", "pending", "completed", "cancelled",
    "GET", "POST", "PUT", "PATCH", "DELETE", "application/json", "text/plain", "text/html",
    "https://", "http://", "draft", "published", "archived", "admin", "user", "guest",
];

fn reverse_dictionary() -> &'static std::collections::HashMap<&'static str, usize> {
    static MAP: OnceLock<std::collections::HashMap<&'static str, usize>> = OnceLock::new();
    MAP.get_or_init(|| {
        DICTIONARY
            .iter()
            .enumerate()
            .map(|(i, s)| (*s, i))
            .collect()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Dictionary(usize),
    AsIs,
    Latin1,
    Binary,
}

fn classify(input: &str) -> Classification {
    if let Some(&index) = reverse_dictionary().get(input) {
        return Classification::Dictionary(index);
    }
    if input.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
        return Classification::AsIs;
    }
    if input.chars().all(|c| (c as u32) <= 0xFF) {
        return Classification::Latin1;
    }
    Classification::Binary
}

fn classification_cache() -> &'static Cache<String, Classification> {
    static CACHE: OnceLock<Cache<String, Classification>> = OnceLock::new();
    CACHE.get_or_init(|| Cache::new(4096))
}

fn classify_cached(input: &str) -> Classification {
    let cache = classification_cache();
    if let Some(hit) = cache.get(input) {
        return hit;
    }
    let result = classify(input);
    cache.insert(input.to_string(), result);
    result
}

/// Encodes a string using the cheapest reversible representation.
#[must_use]
pub fn encode(input: &str) -> String {
    match classify_cached(input) {
        Classification::Dictionary(index) => format!("{DICT_SIGIL_PREFIX}{index}"),
        Classification::AsIs => input.to_string(),
        Classification::Latin1 => format!("u:{}", percent_encode(input)),
        Classification::Binary => {
            format!("b:{}", base64::engine::general_purpose::STANDARD.encode(input))
        }
    }
}

/// Decodes a value produced by [`encode`].
///
/// # Errors
///
/// Returns an error if a `u:`/`b:`/dictionary-sigil prefix is present but the
/// remainder is malformed (invalid percent-encoding, invalid base64, invalid
/// UTF-8, or an out-of-range dictionary index).
pub fn decode(encoded: &str) -> Result<String, String> {
    if let Some(rest) = encoded.strip_prefix(DICT_SIGIL_PREFIX) {
        let index: usize = rest
            .parse()
            .map_err(|_| format!("smart_string: invalid dictionary sigil {encoded:?}"))?;
        return DICTIONARY
            .get(index)
            .map(|s| (*s).to_string())
            .ok_or_else(|| format!("smart_string: dictionary index {index} out of range"));
    }
    if let Some(rest) = encoded.strip_prefix("u:") {
        return percent_decode(rest);
    }
    if let Some(rest) = encoded.strip_prefix("b:") {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(rest)
            .map_err(|e| format!("smart_string: invalid base64: {e}"))?;
        return String::from_utf8(bytes)
            .map_err(|e| format!("smart_string: decoded bytes are not valid utf-8: {e}"));
    }
    Ok(encoded.to_string())
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn percent_decode(input: &str) -> Result<String, String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input
                .get(i + 1..i + 3)
                .ok_or_else(|| "smart_string: truncated percent-escape".to_string())?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| format!("smart_string: invalid percent-escape %{hex}"))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|e| format!("smart_string: invalid utf-8: {e}"))
}
