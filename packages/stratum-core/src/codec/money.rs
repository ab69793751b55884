//! Money codec: integer minor units (cents) -> base62, prefixed with a
//! currency marker.
//!
//! Money is never stored as a float: callers pass the amount already
//! converted to the currency's smallest denomination (e.g. cents for USD).

use super::base62;

/// Encodes an integer amount of minor units, prefixed with `currency` (an
/// ISO 4217 code such as `"USD"`) followed by `:`.
#[must_use]
pub fn encode(minor_units: i64, currency: &str) -> String {
    format!("{currency}:{}", base62::encode_signed(minor_units))
}

/// Decodes a value previously produced by [`encode`], returning
/// `(minor_units, currency)`.
///
/// # Errors
///
/// Returns an error if the `currency:amount` separator is missing or the
/// amount is not valid base62.
pub fn decode(s: &str) -> Result<(i64, String), String> {
    let (currency, amount) = s
        .split_once(':')
        .ok_or_else(|| format!("money: missing currency separator in {s:?}"))?;
    let minor_units = base62::decode_signed(amount)?;
    Ok((minor_units, currency.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let encoded = encode(12_345, "USD");
        let (amount, currency) = decode(&encoded).unwrap();
        assert_eq!(amount, 12_345);
        assert_eq!(currency, "USD");
    }

    #[test]
    fn negative_amount_roundtrips() {
        let encoded = encode(-500, "EUR");
        let (amount, currency) = decode(&encoded).unwrap();
        assert_eq!(amount, -500);
        assert_eq!(currency, "EUR");
    }

    #[test]
    fn missing_separator_errors() {
        assert!(decode("nocolonhere").is_err());
    }
}
