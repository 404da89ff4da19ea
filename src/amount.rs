//! Integer token amount arithmetic
//!
//! Raw SPL amounts are `u64` base units. Conversions never go through
//! floating point: whole-token supplies are scaled in `u128` and narrowed
//! with checks, and decimal amounts are parsed digit by digit.

use crate::errors::AmountError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest scale an SPL mint created here may use
pub const MAX_DECIMALS: u8 = 9;

/// `whole × 10^decimals` as a raw base-unit amount
pub fn raw_amount(whole: u64, decimals: u8) -> Result<u64, AmountError> {
    let scale = 10u128
        .checked_pow(u32::from(decimals))
        .ok_or(AmountError::Overflow)?;
    let raw = u128::from(whole)
        .checked_mul(scale)
        .ok_or(AmountError::Overflow)?;
    u64::try_from(raw).map_err(|_| AmountError::Overflow)
}

/// Parse a decimal amount string such as `"12.5"` into base units
pub fn parse_ui_amount(input: &str, decimals: u8) -> Result<u64, AmountError> {
    u64::try_from(parse_ui_units(input, decimals)?).map_err(|_| AmountError::Overflow)
}

/// [`parse_ui_amount`] without the `u64` narrowing, for comparisons at a
/// scale finer than any mint's
pub fn parse_ui_units(input: &str, decimals: u8) -> Result<u128, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Malformed(input.to_string()));
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::Malformed(input.to_string()));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(AmountError::Malformed(input.to_string()));
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > usize::from(decimals) {
        return Err(AmountError::TooPrecise {
            input: input.to_string(),
            decimals,
        });
    }

    let whole_units: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| AmountError::Overflow)?
    };
    let scale = 10u128
        .checked_pow(u32::from(decimals))
        .ok_or(AmountError::Overflow)?;
    let whole_raw = whole_units
        .checked_mul(scale)
        .ok_or(AmountError::Overflow)?;

    // Right-pad the fraction to `decimals` digits
    let mut fraction_raw: u128 = 0;
    for i in 0..usize::from(decimals) {
        let digit = fraction
            .as_bytes()
            .get(i)
            .map(|b| u128::from(b - b'0'))
            .unwrap_or(0);
        fraction_raw = fraction_raw
            .checked_mul(10)
            .and_then(|v| v.checked_add(digit))
            .ok_or(AmountError::Overflow)?;
    }

    let raw = whole_raw
        .checked_add(fraction_raw)
        .ok_or(AmountError::Overflow)?;
    if raw == 0 {
        return Err(AmountError::NotPositive);
    }
    Ok(raw)
}

/// Render base units as a decimal string with trailing zeros trimmed
pub fn format_ui_amount(raw: u64, decimals: u8) -> String {
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return raw.to_string();
    }
    let digits = format!("{:0width$}", raw, width = decimals + 1);
    let (whole, fraction) = digits.split_at(digits.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Balance of one holder account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenBalance {
    pub raw: u64,
    pub decimals: u8,
}

impl TokenBalance {
    pub fn new(raw: u64, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    /// `raw / 10^decimals`
    pub fn ui_amount(&self) -> f64 {
        self.raw as f64 / 10f64.powi(i32::from(self.decimals))
    }
}

impl fmt::Display for TokenBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_ui_amount(self.raw, self.decimals))
    }
}
