//! IPv4 and "smart" IPv6 codecs.
//!
//! IPv4 addresses are always packed to 4 raw bytes and base64-encoded
//! (8 characters, always shorter than the textual form). IPv6 addresses
//! are packed only when doing so is shorter than the already-compressed
//! textual representation.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use base64::Engine as _;

const IPV6_TEXTUAL_THRESHOLD: usize = 24;

/// Encodes an IPv4 address as base64 of its 4 raw bytes.
#[must_use]
pub fn encode_v4(addr: Ipv4Addr) -> String {
    base64::engine::general_purpose::STANDARD.encode(addr.octets())
}

/// Decodes a value produced by [`encode_v4`].
///
/// # Errors
///
/// Returns an error if the input is not valid base64 or does not decode to
/// exactly 4 bytes.
pub fn decode_v4(s: &str) -> Result<Ipv4Addr, String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| format!("ipv4: invalid base64: {e}"))?;
    let octets: [u8; 4] = bytes
        .try_into()
        .map_err(|_| "ipv4: expected exactly 4 bytes".to_string())?;
    Ok(Ipv4Addr::from(octets))
}

/// Smart-encodes an IPv6 address: keeps the compressed textual form when it
/// is already short (`<= 24` chars), otherwise packs the 16 raw bytes to
/// base64 with a `b:` prefix so the decoder can tell the two apart.
#[must_use]
pub fn encode_v6(addr: Ipv6Addr) -> String {
    let textual = addr.to_string();
    if textual.len() <= IPV6_TEXTUAL_THRESHOLD {
        textual
    } else {
        format!(
            "b:{}",
            base64::engine::general_purpose::STANDARD.encode(addr.octets())
        )
    }
}

/// Decodes a value produced by [`encode_v6`].
///
/// # Errors
///
/// Returns an error if a `b:`-prefixed value is not valid base64 / 16 bytes,
/// or an unprefixed value is not a valid IPv6 textual address.
pub fn decode_v6(s: &str) -> Result<Ipv6Addr, String> {
    if let Some(packed) = s.strip_prefix("b:") {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(packed)
            .map_err(|e| format!("ipv6: invalid base64: {e}"))?;
        let octets: [u8; 16] = bytes
            .try_into()
            .map_err(|_| "ipv6: expected exactly 16 bytes".to_string())?;
        Ok(Ipv6Addr::from(octets))
    } else {
        Ipv6Addr::from_str(s).map_err(|e| format!("ipv6: invalid textual address: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_roundtrip() {
        let addr = Ipv4Addr::new(192, 168, 1, 1);
        let encoded = encode_v4(addr);
        assert_eq!(encoded.len(), 8);
        assert_eq!(decode_v4(&encoded).unwrap(), addr);
    }

    #[test]
    fn v6_short_textual_kept_as_is() {
        let addr = Ipv6Addr::from_str("::1").unwrap();
        let encoded = encode_v6(addr);
        assert_eq!(encoded, "::1");
        assert_eq!(decode_v6(&encoded).unwrap(), addr);
    }

    #[test]
    fn v6_long_textual_packed() {
        let addr = Ipv6Addr::from_str("2001:0db8:85a3:0000:0000:8a2e:0370:7334").unwrap();
        let encoded = encode_v6(addr);
        assert!(encoded.starts_with("b:"));
        assert_eq!(decode_v6(&encoded).unwrap(), addr);
    }

    #[test]
    fn v4_decode_rejects_wrong_length() {
        assert!(decode_v4("AA==").is_err());
    }
}
