//! Base-unit conversion for on-chain balances.
//!
//! External balance APIs report amounts in each chain's smallest integer
//! denomination (satoshis, wei, lamports). Dividing those integers by a power
//! of ten as floats loses precision for large balances, so the conversion
//! goes through an exact integer split and a decimal string instead.

use std::str::FromStr;

use rust_decimal::Decimal;

/// Conversion failures for base-unit amounts.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("decimals count {0} exceeds the supported scale")]
    ScaleTooLarge(u32),

    #[error("base-unit value {value} with {decimals} decimals exceeds the decimal range")]
    OutOfRange { value: i128, decimals: u32 },
}

/// Convert an integer base-unit amount into a decimal quantity.
///
/// The value is split into integer and fractional parts with integer
/// division/modulo by `10^decimals`; the remainder is rendered as a
/// zero-padded string of exactly `decimals` digits with trailing zeros
/// stripped. Sign is preserved and the integer part is carried exactly.
pub fn base_units_to_decimal(value: i128, decimals: u32) -> Result<Decimal, ConversionError> {
    if value == 0 {
        return Ok(Decimal::ZERO);
    }

    let negative = value < 0;
    let magnitude = value.unsigned_abs();

    let rendered = if decimals == 0 {
        magnitude.to_string()
    } else {
        let base = 10u128
            .checked_pow(decimals)
            .ok_or(ConversionError::ScaleTooLarge(decimals))?;
        let integer = magnitude / base;
        let remainder = magnitude % base;
        let padded = format!("{:0width$}", remainder, width = decimals as usize);
        let fraction = padded.trim_end_matches('0');
        if fraction.is_empty() {
            integer.to_string()
        } else {
            format!("{integer}.{fraction}")
        }
    };

    let parsed = Decimal::from_str(&rendered)
        .map_err(|_| ConversionError::OutOfRange { value, decimals })?;

    Ok(if negative { -parsed } else { parsed })
}
