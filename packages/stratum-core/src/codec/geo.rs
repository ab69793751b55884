//! Geo codec: normalize lat/lon into non-negative integer microdegrees,
//! base62-encode each, join with `,`. ~11cm precision at the equator.

use super::base62;

const MICRO: f64 = 1_000_000.0;

/// Encodes a `(latitude, longitude)` pair.
///
/// Latitude is normalized into `[0, 180]` by adding 90; longitude into
/// `[0, 360]` by adding 180, so both encode as non-negative integers.
#[must_use]
pub fn encode(lat: f64, lon: f64) -> String {
    let lat_micro = ((lat + 90.0) * MICRO).round() as u64;
    let lon_micro = ((lon + 180.0) * MICRO).round() as u64;
    format!("{},{}", base62::encode(lat_micro), base62::encode(lon_micro))
}

/// Decodes a value previously produced by [`encode`], returning `(lat, lon)`.
///
/// # Errors
///
/// Returns an error if the comma-joined pair is malformed or either half is
/// not valid base62.
pub fn decode(s: &str) -> Result<(f64, f64), String> {
    let (lat_s, lon_s) = s
        .split_once(',')
        .ok_or_else(|| format!("geo: expected 'lat,lon' pair, got {s:?}"))?;
    let lat_micro = base62::decode(lat_s)?;
    let lon_micro = base62::decode(lon_s)?;
    let lat = lat_micro as f64 / MICRO - 90.0;
    let lon = lon_micro as f64 / MICRO - 180.0;
    Ok((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_known_coordinates() {
        for (lat, lon) in [
            (0.0, 0.0),
            (51.5074, -0.1278),
            (-33.8688, 151.2093),
            (90.0, 180.0),
            (-90.0, -180.0),
        ] {
            let encoded = encode(lat, lon);
            let (dlat, dlon) = decode(&encoded).unwrap();
            assert!((dlat - lat).abs() < 1e-5);
            assert!((dlon - lon).abs() < 1e-5);
        }
    }

    #[test]
    fn malformed_pair_errors() {
        assert!(decode("no-comma-here").is_err());
    }
}
