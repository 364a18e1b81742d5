//! Kubernetes resource quantities
//!
//! Parses the quantity grammar used by resource requests and the metrics
//! API (`500m`, `128Mi`, `1.5`, `2e3`) into an exact nano-unit count so that
//! sums, averages and comparisons never go through floating point.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity as K8sQuantity;

/// Nano-units per whole unit
const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// Decimal SI suffixes ordered by exponent, largest first
const DECIMAL_SUFFIXES: &[(i32, &str)] = &[
    (18, "E"),
    (15, "P"),
    (12, "T"),
    (9, "G"),
    (6, "M"),
    (3, "k"),
    (0, ""),
    (-3, "m"),
    (-6, "u"),
    (-9, "n"),
];

/// Binary SI suffixes ordered by power of 1024, largest first
const BINARY_SUFFIXES: &[(u32, &str)] = &[
    (6, "Ei"),
    (5, "Pi"),
    (4, "Ti"),
    (3, "Gi"),
    (2, "Mi"),
    (1, "Ki"),
];

/// Errors produced while parsing a quantity string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,

    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),

    #[error("unknown suffix in quantity {0:?}")]
    UnknownSuffix(String),

    #[error("quantity {0:?} is out of range")]
    OutOfRange(String),
}

/// Notation a quantity was written in, kept for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    DecimalSI,
    BinarySI,
    DecimalExponent,
}

/// Power-of-ten scale used by [`Quantity::scaled_value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Nano,
    Micro,
    Milli,
    Unit,
    Kilo,
    Mega,
    Giga,
}

impl Scale {
    fn exponent(self) -> u32 {
        // Offset from nano-units
        match self {
            Scale::Nano => 0,
            Scale::Micro => 3,
            Scale::Milli => 6,
            Scale::Unit => 9,
            Scale::Kilo => 12,
            Scale::Mega => 15,
            Scale::Giga => 18,
        }
    }
}

/// An exact resource quantity
#[derive(Debug, Clone, Copy, Default)]
pub struct Quantity {
    nanos: i128,
    format: Format,
}

impl Quantity {
    /// The zero quantity
    pub const ZERO: Quantity = Quantity {
        nanos: 0,
        format: Format::DecimalSI,
    };

    /// Parse a quantity string such as `250m`, `1Gi` or `1.5e3`
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        if input.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, unsigned) = match input.as_bytes()[0] {
            b'-' => (true, &input[1..]),
            b'+' => (false, &input[1..]),
            _ => (false, input),
        };

        let number_len = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_len);

        let (int_part, frac_part) = match number.split_once('.') {
            Some((i, f)) => (i, f),
            None => (number, ""),
        };
        if (int_part.is_empty() && frac_part.is_empty()) || frac_part.contains('.') {
            return Err(QuantityError::InvalidNumber(input.to_string()));
        }

        let digits = format!("{}{}", int_part, frac_part);
        let mantissa: i128 = digits
            .parse()
            .map_err(|_| QuantityError::OutOfRange(input.to_string()))?;
        let out_of_range = || QuantityError::OutOfRange(input.to_string());
        let frac_len = i32::try_from(frac_part.len()).map_err(|_| out_of_range())?;

        let (nanos, format) = match parse_suffix(suffix) {
            Some(Suffix::Decimal(_, format)) if mantissa == 0 => (0, format),
            Some(Suffix::Decimal(exp, format)) => {
                let shift = exp
                    .checked_add(9)
                    .and_then(|v| v.checked_sub(frac_len))
                    .ok_or_else(out_of_range)?;
                let nanos = if shift >= 0 {
                    pow10(shift.unsigned_abs())
                        .and_then(|p| mantissa.checked_mul(p))
                        .ok_or_else(out_of_range)?
                } else {
                    div_ceil_pow10(mantissa, shift.unsigned_abs())
                };
                (nanos, format)
            }
            Some(Suffix::Binary(power)) => {
                let numerator = 1024i128
                    .checked_pow(power)
                    .and_then(|m| mantissa.checked_mul(m))
                    .and_then(|v| v.checked_mul(NANOS_PER_UNIT))
                    .ok_or_else(out_of_range)?;
                (
                    div_ceil_pow10(numerator, frac_len.unsigned_abs()),
                    Format::BinarySI,
                )
            }
            None => return Err(QuantityError::UnknownSuffix(input.to_string())),
        };

        Ok(Self {
            nanos: if negative { -nanos } else { nanos },
            format,
        })
    }

    /// Build a quantity from an integer at the given scale
    pub fn new_scaled(value: i64, scale: Scale) -> Self {
        Self {
            nanos: i128::from(value) * 10i128.pow(scale.exponent()),
            format: Format::DecimalSI,
        }
    }

    /// Build a quantity from an exact nano-unit count
    pub fn from_nano_value(nanos: i128) -> Self {
        Self {
            nanos,
            format: Format::DecimalSI,
        }
    }

    /// Exact nano-unit count, without the `i64` saturation of
    /// [`Quantity::scaled_value`]
    pub fn nano_value(&self) -> i128 {
        self.nanos
    }

    /// Value in milli-units, rounded up
    pub fn milli_value(&self) -> i64 {
        self.scaled_value(Scale::Milli)
    }

    /// Value in whole units, rounded up
    pub fn value(&self) -> i64 {
        self.scaled_value(Scale::Unit)
    }

    /// Value at the given scale, rounded up and saturated to `i64`
    pub fn scaled_value(&self, scale: Scale) -> i64 {
        let scaled = div_ceil(self.nanos, 10i128.pow(scale.exponent()));
        i64::try_from(scaled).unwrap_or(if scaled > 0 { i64::MAX } else { i64::MIN })
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Sum of two quantities, saturating at the representable range
    pub fn saturating_add(&self, other: &Quantity) -> Quantity {
        Quantity {
            nanos: self.nanos.saturating_add(other.nanos),
            format: if self.nanos == 0 {
                other.format
            } else {
                self.format
            },
        }
    }
}

enum Suffix {
    Decimal(i32, Format),
    Binary(u32),
}

fn parse_suffix(suffix: &str) -> Option<Suffix> {
    if let Some(&(power, _)) = BINARY_SUFFIXES.iter().find(|(_, s)| *s == suffix) {
        return Some(Suffix::Binary(power));
    }
    if let Some(&(exp, _)) = DECIMAL_SUFFIXES.iter().find(|(_, s)| *s == suffix) {
        return Some(Suffix::Decimal(exp, Format::DecimalSI));
    }

    // Decimal exponent: e3, E-2, e+6
    let exponent = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))?;
    let digits = exponent
        .strip_prefix('-')
        .or_else(|| exponent.strip_prefix('+'))
        .unwrap_or(exponent);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let exp: i32 = exponent.parse().ok()?;
    Some(Suffix::Decimal(exp, Format::DecimalExponent))
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

/// `numerator / 10^exp` rounded up
///
/// A divisor past the `i128` range exceeds any non-negative numerator,
/// which leaves a single nano-unit of any non-zero amount.
fn div_ceil_pow10(numerator: i128, exp: u32) -> i128 {
    match pow10(exp) {
        Some(divisor) => div_ceil(numerator, divisor),
        None if numerator > 0 => 1,
        None => 0,
    }
}

/// Division rounding towards positive infinity
fn div_ceil(numerator: i128, divisor: i128) -> i128 {
    let quotient = numerator / divisor;
    if numerator % divisor != 0 && numerator > 0 {
        quotient + 1
    } else {
        quotient
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::parse(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            return write!(f, "0");
        }

        if self.format == Format::BinarySI && self.nanos % NANOS_PER_UNIT == 0 {
            let whole = self.nanos / NANOS_PER_UNIT;
            for (power, suffix) in BINARY_SUFFIXES {
                let unit = 1024i128.pow(*power);
                if whole.abs() >= unit && whole % unit == 0 {
                    return write!(f, "{}{}", whole / unit, suffix);
                }
            }
            if whole.abs() >= 1024 {
                return write!(f, "{}", whole);
            }
        }

        for (exp, suffix) in DECIMAL_SUFFIXES {
            let unit = 10i128.pow((exp + 9) as u32);
            if self.nanos % unit == 0 {
                let scaled = self.nanos / unit;
                return match self.format {
                    Format::DecimalExponent if *exp != 0 => write!(f, "{}e{}", scaled, exp),
                    Format::DecimalExponent => write!(f, "{}", scaled),
                    _ => write!(f, "{}{}", scaled, suffix),
                };
            }
        }

        unreachable!("every nano count is divisible by one")
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos
    }
}

impl Eq for Quantity {}

impl Hash for Quantity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nanos.hash(state);
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

impl TryFrom<&K8sQuantity> for Quantity {
    type Error = QuantityError;

    fn try_from(value: &K8sQuantity) -> Result<Self, Self::Error> {
        Quantity::parse(&value.0)
    }
}

impl From<&Quantity> for K8sQuantity {
    fn from(value: &Quantity) -> Self {
        K8sQuantity(value.to_string())
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Quantity::parse(&raw).map_err(serde::de::Error::custom)
    }
}
