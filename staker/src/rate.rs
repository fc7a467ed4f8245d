//! Exchange rate between the base token and its staked derivative

use std::fmt;

use crate::amount::{AmountParseError, TokenAmount, MAX_BASE_SUPPLY, SCALE};

/// Base units per one derivative unit, at 1e9 scale.
///
/// Never zero: an undiscovered rate is `Option::None`, not a zero rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExchangeRate(u64);

impl ExchangeRate {
    /// Rate from its 1e9-scaled integer form (`step_per_xstep_e9` on chain)
    pub const fn from_e9(raw: u64) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Rate from a decimal string such as `"1.254872013"`
    pub fn parse(text: &str) -> Result<Option<Self>, AmountParseError> {
        TokenAmount::parse(text).map(|amount| Self::from_e9(amount.raw()))
    }

    pub const fn e9(self) -> u64 {
        self.0
    }

    /// `roundDown(base / rate, 9)`
    pub fn to_derivative(self, base: TokenAmount) -> TokenAmount {
        mul_div_floor(base.raw(), SCALE, self.0)
    }

    /// `roundDown(derivative * rate, 9)`
    pub fn to_base(self, derivative: TokenAmount) -> TokenAmount {
        mul_div_floor(derivative.raw(), self.0, SCALE)
    }

    /// Largest derivative amount whose base value fits under `max_supply`
    pub fn max_derivative(self, max_supply: TokenAmount) -> TokenAmount {
        self.to_derivative(max_supply)
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        TokenAmount::from_raw(self.0).fmt(f)
    }
}

/// Bounds applied before converting an edited field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionBounds {
    pub max_supply: TokenAmount,
}

impl Default for ConversionBounds {
    fn default() -> Self {
        Self::new(TokenAmount::from_raw(MAX_BASE_SUPPLY * SCALE))
    }
}

impl ConversionBounds {
    pub const fn new(max_supply: TokenAmount) -> Self {
        Self { max_supply }
    }

    /// Clamp a base amount to the supply ceiling. Returns whether it clamped.
    pub fn clamp_base(&self, base: TokenAmount) -> (TokenAmount, bool) {
        if base > self.max_supply {
            (self.max_supply, true)
        } else {
            (base, false)
        }
    }

    /// Clamp a derivative amount to `max_supply / rate`
    pub fn clamp_derivative(&self, derivative: TokenAmount, rate: ExchangeRate) -> (TokenAmount, bool) {
        let ceiling = rate.max_derivative(self.max_supply);
        if derivative > ceiling {
            (ceiling, true)
        } else {
            (derivative, false)
        }
    }
}

fn mul_div_floor(value: u64, mul: u64, div: u64) -> TokenAmount {
    let wide = u128::from(value) * u128::from(mul) / u128::from(div);
    TokenAmount::from_raw(u64::try_from(wide).unwrap_or(u64::MAX))
}
