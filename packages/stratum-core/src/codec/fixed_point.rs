//! Fixed-point decimal codec: `value * 10^precision -> integer -> base62`.
//!
//! Used directly for the `decimal:N` semantic attribute type, and as the
//! per-element encoding inside [`crate::codec::embedding`].

use super::base62;

/// Encodes a floating-point value at a fixed decimal precision.
///
/// `precision` is the number of decimal digits retained; values are rounded
/// to the nearest representable fixed-point value before encoding.
#[must_use]
pub fn encode(value: f64, precision: u32) -> String {
    let scale = 10f64.powi(precision as i32);
    let scaled = (value * scale).round() as i64;
    base62::encode_signed(scaled)
}

/// Decodes a value previously produced by [`encode`] at the same `precision`.
///
/// # Errors
///
/// Returns an error if `s` is not valid base62.
pub fn decode(s: &str, precision: u32) -> Result<f64, String> {
    let scaled = base62::decode_signed(s)?;
    let scale = 10f64.powi(precision as i32);
    Ok(scaled as f64 / scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_within_precision() {
        for (value, precision) in [(3.14, 2), (-1.5, 1), (0.0, 4), (123_456.789, 3)] {
            let encoded = encode(value, precision);
            let decoded = decode(&encoded, precision).unwrap();
            let scale = 10f64.powi(precision as i32);
            assert!((decoded - value).abs() < 1.0 / scale);
        }
    }

    #[test]
    fn zero_precision_truncates_to_integer() {
        assert_eq!(decode(&encode(3.7, 0), 0).unwrap(), 4.0);
    }

    #[test]
    fn negative_values_roundtrip() {
        let encoded = encode(-42.5, 1);
        assert!((decode(&encoded, 1).unwrap() - (-42.5)).abs() < 0.01);
    }
}
