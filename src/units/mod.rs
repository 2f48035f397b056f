//! Conversion between human decimal strings and integer base units.
//!
//! `parse_units("10", 18)` yields `10 * 10^18`; `format_units` is the inverse
//! and always keeps at least one fractional digit (`"10.0"`).

pub type Amount = u128;

/// Decimals used by native value and by tokens unless configured otherwise.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Largest exponent for which `10^decimals` fits in an `Amount`.
pub const MAX_DECIMALS: u8 = 38;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("empty amount")]
    Empty,
    #[error("invalid character {0:?} in amount")]
    InvalidCharacter(char),
    #[error("amount has {found} fractional digits, at most {decimals} allowed")]
    TooManyDecimals { found: usize, decimals: u8 },
    #[error("decimals {0} exceed the supported maximum of 38")]
    UnsupportedDecimals(u8),
    #[error("amount overflows 128-bit base units")]
    Overflow,
}

fn scale(decimals: u8) -> Result<Amount, UnitsError> {
    if decimals > MAX_DECIMALS {
        return Err(UnitsError::UnsupportedDecimals(decimals));
    }
    Ok(10u128.pow(decimals as u32))
}

fn parse_digits(digits: &str) -> Result<Amount, UnitsError> {
    let mut value: Amount = 0;
    for c in digits.chars() {
        let d = c.to_digit(10).ok_or(UnitsError::InvalidCharacter(c))?;
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(d as Amount))
            .ok_or(UnitsError::Overflow)?;
    }
    Ok(value)
}

pub fn parse_units(value: &str, decimals: u8) -> Result<Amount, UnitsError> {
    let value = value.trim().replace('_', "");
    if value.is_empty() || value == "." {
        return Err(UnitsError::Empty);
    }
    let unit = scale(decimals)?;
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value.as_str(), ""),
    };
    // trailing zeros beyond the precision carry no value
    let frac = frac.trim_end_matches('0');
    if frac.len() > decimals as usize {
        return Err(UnitsError::TooManyDecimals {
            found: frac.len(),
            decimals,
        });
    }

    let whole = parse_digits(whole)?;
    let frac_value = parse_digits(frac)?
        .checked_mul(10u128.pow((decimals as usize - frac.len()) as u32))
        .ok_or(UnitsError::Overflow)?;

    whole
        .checked_mul(unit)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or(UnitsError::Overflow)
}

pub fn parse_ether(value: &str) -> Result<Amount, UnitsError> {
    parse_units(value, DEFAULT_DECIMALS)
}

pub fn format_units(amount: Amount, decimals: u8) -> Result<String, UnitsError> {
    let unit = scale(decimals)?;
    let whole = amount / unit;
    let frac = amount % unit;
    if decimals == 0 {
        return Ok(format!("{whole}.0"));
    }
    let frac = format!("{:0width$}", frac, width = decimals as usize);
    let frac = frac.trim_end_matches('0');
    let frac = if frac.is_empty() { "0" } else { frac };
    Ok(format!("{whole}.{frac}"))
}
