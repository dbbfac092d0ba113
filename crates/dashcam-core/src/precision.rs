use crate::error::FilenameError;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits every encoded coordinate carries.
pub const COORDINATE_SCALE: u32 = 6;

/// Format a Decimal to exactly `scale` decimal places, rounding half away
/// from zero and padding with zeros. Negative zero is printed without a sign.
pub fn format_fixed(dec: &Decimal, scale: u32) -> String {
    let mut rounded = dec.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    let s = rounded.to_string();

    if scale == 0 {
        return s;
    }

    match s.split_once('.') {
        Some((integer_part, decimal_part)) => {
            let mut decimal_padded = decimal_part.to_string();
            if decimal_padded.len() < scale as usize {
                decimal_padded.push_str(&"0".repeat(scale as usize - decimal_padded.len()));
            } else {
                decimal_padded.truncate(scale as usize);
            }
            format!("{}.{}", integer_part, decimal_padded)
        }
        None => format!("{}.{}", s, "0".repeat(scale as usize)),
    }
}

/// Encode one coordinate axis for use in a photo file name.
///
/// `37.4245` becomes `37_424500`, `-122.166` becomes `-122_166000`. The sign
/// stays a literal `-` so the encoding is reversible.
pub fn encode_coordinate(value: f64) -> Result<String, FilenameError> {
    let dec = Decimal::from_f64(value).ok_or(FilenameError::NonFinite)?;
    Ok(format_fixed(&dec, COORDINATE_SCALE).replace('.', "_"))
}

/// Inverse of [`encode_coordinate`]. Requires exactly six fractional digits.
pub fn decode_coordinate(encoded: &str) -> Result<f64, FilenameError> {
    let malformed = || FilenameError::MalformedCoordinate(encoded.to_string());

    let (sign, unsigned) = match encoded.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", encoded),
    };
    let (integer_part, fraction) = unsigned.split_once('_').ok_or_else(malformed)?;

    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(integer_part)
        || !all_digits(fraction)
        || fraction.len() != COORDINATE_SCALE as usize
    {
        return Err(malformed());
    }

    format!("{}{}.{}", sign, integer_part, fraction)
        .parse::<f64>()
        .map_err(|_| malformed())
}
