//! Amount decoding for inconsistently encoded monetary values
//!
//! Raw event logs carry amounts in three shapes: a string with a currency
//! prefix (`"$1,234.50"`, `"USD 10.00"`), a plain numeric string
//! (`"10.00"`), or an integer count of cents (`1000`). Every shape decodes to
//! the same `BigDecimal` at [`MINOR_UNIT_SCALE`], so equal values compare
//! equal and sum without drift.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Number of decimal places in the reporting currency's minor unit
pub const MINOR_UNIT_SCALE: i64 = 2;

const CURRENCY_SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

/// Which decode rule produced an amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmountEncoding {
    /// Integer number of minor units (cents)
    MinorUnits,
    /// String prefixed by a currency symbol or ISO code
    SymbolString,
    /// Bare decimal string in major units
    PlainString,
}

/// A successfully decoded amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAmount {
    pub value: BigDecimal,
    pub encoding: AmountEncoding,
}

/// Errors from amount decoding
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount is missing or empty")]
    Missing,
    #[error("Amount is negative: {0}")]
    Negative(String),
    #[error("Amount has more precision than the minor unit: {0}")]
    ExcessPrecision(String),
    #[error("Unrecognised amount encoding: {0}")]
    Unrecognised(String),
}

/// Decode a raw JSON amount, trying each rule in priority order
pub fn parse_amount(raw: Option<&Value>) -> Result<ParsedAmount, AmountError> {
    match raw {
        None | Some(Value::Null) => Err(AmountError::Missing),
        Some(Value::Number(number)) => parse_minor_units(number),
        Some(Value::String(text)) => parse_amount_str(text),
        Some(other) => Err(AmountError::Unrecognised(other.to_string())),
    }
}

/// Decode a textual amount (symbol-prefixed or plain)
pub fn parse_amount_str(text: &str) -> Result<ParsedAmount, AmountError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Missing);
    }

    let (body, encoding) = match strip_currency_prefix(trimmed) {
        Some(rest) => (rest.trim_start(), AmountEncoding::SymbolString),
        None => (trimmed, AmountEncoding::PlainString),
    };

    if body.starts_with('-') {
        return Err(AmountError::Negative(text.to_string()));
    }
    if !is_decimal_literal(body) {
        return Err(AmountError::Unrecognised(text.to_string()));
    }

    let digits: String = body.chars().filter(|c| *c != ',').collect();
    let value =
        BigDecimal::from_str(&digits).map_err(|_| AmountError::Unrecognised(text.to_string()))?;

    Ok(ParsedAmount {
        value: to_minor_unit_scale(value, text)?,
        encoding,
    })
}

fn parse_minor_units(number: &serde_json::Number) -> Result<ParsedAmount, AmountError> {
    // Floats and out-of-range integers are not a minor-unit encoding
    let Some(cents) = number.as_i64() else {
        return Err(AmountError::Unrecognised(number.to_string()));
    };

    if cents < 0 {
        return Err(AmountError::Negative(number.to_string()));
    }

    Ok(ParsedAmount {
        value: BigDecimal::new(cents.into(), MINOR_UNIT_SCALE),
        encoding: AmountEncoding::MinorUnits,
    })
}

/// Strip a leading currency symbol or three-letter ISO code
fn strip_currency_prefix(text: &str) -> Option<&str> {
    let mut chars = text.chars();
    let first = chars.next()?;
    if CURRENCY_SYMBOLS.contains(&first) {
        return Some(&text[first.len_utf8()..]);
    }

    let code: String = text.chars().take(3).collect();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        return Some(&text[3..]);
    }

    None
}

/// Digits with optional thousands separators and at most one decimal point
fn is_decimal_literal(body: &str) -> bool {
    let (integer_part, fraction_part) = match body.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (body, None),
    };

    if integer_part.is_empty() || !integer_part.starts_with(|c: char| c.is_ascii_digit()) {
        return false;
    }

    let groups: Vec<&str> = integer_part.split(',').collect();
    let grouping_ok = if groups.len() == 1 {
        groups[0].chars().all(|c| c.is_ascii_digit())
    } else {
        groups[0].len() <= 3
            && groups
                .iter()
                .all(|g| !g.is_empty() && g.chars().all(|c| c.is_ascii_digit()))
            && groups[1..].iter().all(|g| g.len() == 3)
    };

    let fraction_ok = match fraction_part {
        Some(fraction) => !fraction.is_empty() && fraction.chars().all(|c| c.is_ascii_digit()),
        None => true,
    };

    grouping_ok && fraction_ok
}

fn to_minor_unit_scale(value: BigDecimal, original: &str) -> Result<BigDecimal, AmountError> {
    let scaled = value.with_scale(MINOR_UNIT_SCALE);
    if scaled != value {
        return Err(AmountError::ExcessPrecision(original.to_string()));
    }
    Ok(scaled)
}
