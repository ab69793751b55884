//! Embedding codec: an array of floats, each fixed-point-encoded to a base62
//! token, comma-joined.

use super::fixed_point;

/// Encodes a float vector at the given fixed-point `precision`.
#[must_use]
pub fn encode(values: &[f64], precision: u32) -> String {
    values
        .iter()
        .map(|v| fixed_point::encode(*v, precision))
        .collect::<Vec<_>>()
        .join(",")
}

/// Decodes a value produced by [`encode`].
///
/// # Errors
///
/// Returns an error if any comma-separated token is not valid base62. An
/// empty string decodes to an empty vector.
pub fn decode(s: &str, precision: u32) -> Result<Vec<f64>, String> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split(',')
        .map(|token| fixed_point::decode(token, precision))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_vector() {
        let values = vec![0.1, -2.5, 3.333, 0.0];
        let encoded = encode(&values, 3);
        let decoded = decode(&encoded, 3).unwrap();
        assert_eq!(decoded.len(), values.len());
        for (a, b) in values.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 0.01);
        }
    }

    #[test]
    fn empty_vector_roundtrips() {
        assert_eq!(decode(&encode(&[], 2), 2).unwrap(), Vec::<f64>::new());
    }

    #[test]
    fn single_element_roundtrips() {
        let encoded = encode(&[42.0], 0);
        assert!(!encoded.contains(','));
        assert_eq!(decode(&encoded, 0).unwrap(), vec![42.0]);
    }
}
