//! Fixed-precision token amounts and input sanitization
//!
//! Amounts are held as integer base units at `TOKEN_DECIMALS` (1e9 scale),
//! so no conversion ever goes through binary floating point.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// On-chain decimal exponent of both tokens
pub const TOKEN_DECIMALS: u32 = 9;

/// Base units per whole token
pub const SCALE: u64 = 1_000_000_000;

/// Maximum representable base-token supply, in whole tokens
pub const MAX_BASE_SUPPLY: u64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("empty amount")]
    Empty,
    #[error("malformed amount: {0}")]
    Malformed(String),
    #[error("amount out of range: {0}")]
    Overflow(String),
}

/// Non-negative token amount with nine fractional digits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u64);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    /// Wrap a raw base-unit value (what the token program stores)
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn from_whole(tokens: u64) -> Option<Self> {
        match tokens.checked_mul(SCALE) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Raw base units, the integer sent to the protocol layer
    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Floor the amount to `digits` fractional digits
    pub fn round_down(self, digits: u32) -> Self {
        if digits >= TOKEN_DECIMALS {
            return self;
        }
        let step = 10u64.pow(TOKEN_DECIMALS - digits);
        Self(self.0 - self.0 % step)
    }

    /// Parse a normalized decimal string.
    ///
    /// Accepts `"12"`, `"12."`, `".5"` and `"12.34"`. Fractional digits past
    /// the ninth are truncated.
    pub fn parse(text: &str) -> Result<Self, AmountParseError> {
        if text.is_empty() {
            return Err(AmountParseError::Empty);
        }

        let (whole, fraction) = match text.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (text, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(AmountParseError::Malformed(text.to_string()));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountParseError::Malformed(text.to_string()));
        }

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u64>()
                .map_err(|_| AmountParseError::Overflow(text.to_string()))?
        };

        let fraction = clamp_fraction(fraction, TOKEN_DECIMALS as usize);
        let mut fraction_units: u64 = 0;
        for digit in fraction.bytes() {
            fraction_units = fraction_units * 10 + u64::from(digit - b'0');
        }
        fraction_units *= 10u64.pow(TOKEN_DECIMALS - fraction.len() as u32);

        whole_units
            .checked_mul(SCALE)
            .and_then(|units| units.checked_add(fraction_units))
            .map(Self)
            .ok_or_else(|| AmountParseError::Overflow(text.to_string()))
    }

    /// USD value of this amount at `price`, floored to cents.
    ///
    /// Display only; an unknown price renders as zero.
    pub fn usd_value(self, price: Option<f64>) -> f64 {
        let tokens = self.0 as f64 / SCALE as f64;
        round_down(price.unwrap_or(0.0) * tokens, 2)
    }
}

impl FromStr for TokenAmount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TokenAmount {
    /// Shortest form: `5`, `0.5`, `1.000000001`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let fraction = self.0 % SCALE;
        if fraction == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:09}", fraction);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

/// Strip everything but digits and decimal points, keeping only the first
/// point. `"-12a.3.4"` becomes `"12.34"`.
pub fn sanitize(raw: &str) -> String {
    let kept: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();

    match kept.split_once('.') {
        Some((whole, rest)) => {
            let rest: String = rest.chars().filter(|c| *c != '.').collect();
            format!("{}.{}", whole, rest)
        }
        None => kept,
    }
}

/// Truncate (never round) fractional digits beyond `max_digits`
pub fn clamp_precision(value: &str, max_digits: usize) -> String {
    match value.split_once('.') {
        Some((whole, fraction)) => format!("{}.{}", whole, clamp_fraction(fraction, max_digits)),
        None => value.to_string(),
    }
}

/// `floor(value * 10^n) / 10^n`
pub fn round_down(value: f64, n: i32) -> f64 {
    let factor = 10f64.powi(n);
    (value * factor).floor() / factor
}

fn clamp_fraction(fraction: &str, max_digits: usize) -> &str {
    // Sanitized input is ASCII, so byte offsets are char offsets
    match fraction.char_indices().nth(max_digits) {
        Some((cut, _)) => &fraction[..cut],
        None => fraction,
    }
}
