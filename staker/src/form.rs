//! Per-direction stake/unstake form: two mirrored amount fields and the
//! submit state derived from them.

use std::fmt;

use crate::amount::{clamp_precision, sanitize, AmountParseError, TokenAmount, TOKEN_DECIMALS};
use crate::rate::{ConversionBounds, ExchangeRate};
use crate::sync::MarketSnapshot;

pub const YOU_STAKE_CAPTION: &str = "You stake";
pub const YOU_RECEIVE_CAPTION: &str = "You receive";

/// Which way the conversion goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StakeDirection {
    /// Base token in, derivative out
    Stake,
    /// Derivative in, base token out
    Unstake,
}

impl StakeDirection {
    /// The field whose amount the user sends and whose balance gates submit
    pub const fn input_side(self) -> Side {
        match self {
            Self::Stake => Side::Base,
            Self::Unstake => Side::Derivative,
        }
    }

    pub const fn output_side(self) -> Side {
        match self {
            Self::Stake => Side::Derivative,
            Self::Unstake => Side::Base,
        }
    }

    pub const fn caption(self, side: Side) -> &'static str {
        if matches!((self, side), (Self::Stake, Side::Base) | (Self::Unstake, Side::Derivative)) {
            YOU_STAKE_CAPTION
        } else {
            YOU_RECEIVE_CAPTION
        }
    }
}

impl fmt::Display for StakeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stake => write!(f, "Stake"),
            Self::Unstake => write!(f, "Unstake"),
        }
    }
}

/// One of the two token fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Base,
    Derivative,
}

/// Token symbols used in labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLabels {
    pub base_symbol: String,
    pub derivative_symbol: String,
}

impl TokenLabels {
    pub fn symbol(&self, side: Side) -> &str {
        match side {
            Side::Base => &self.base_symbol,
            Side::Derivative => &self.derivative_symbol,
        }
    }
}

/// Enable state of the submit action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitState {
    Empty,
    InvalidOrZero,
    InsufficientBalance,
    Ready,
}

impl SubmitState {
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// What a submit hands to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub direction: StakeDirection,
    pub base_amount_text: String,
    pub derivative_amount_text: String,
}

impl SubmitRequest {
    /// Amount text of the side the user sends
    pub fn input_text(&self) -> &str {
        match self.direction.input_side() {
            Side::Base => &self.base_amount_text,
            Side::Derivative => &self.derivative_amount_text,
        }
    }
}

/// Form for one direction
#[derive(Debug, Clone)]
pub struct FormState {
    direction: StakeDirection,
    labels: TokenLabels,
    bounds: ConversionBounds,
    base_text: String,
    derivative_text: String,
    driving: Option<Side>,
    market: MarketSnapshot,
    submit_state: SubmitState,
}

impl FormState {
    pub fn new(direction: StakeDirection, labels: TokenLabels, bounds: ConversionBounds) -> Self {
        Self {
            direction,
            labels,
            bounds,
            base_text: String::new(),
            derivative_text: String::new(),
            driving: None,
            market: MarketSnapshot::default(),
            submit_state: SubmitState::Empty,
        }
    }

    pub fn direction(&self) -> StakeDirection {
        self.direction
    }

    pub fn base_text(&self) -> &str {
        &self.base_text
    }

    pub fn derivative_text(&self) -> &str {
        &self.derivative_text
    }

    pub fn text(&self, side: Side) -> &str {
        match side {
            Side::Base => &self.base_text,
            Side::Derivative => &self.derivative_text,
        }
    }

    /// The field the user last typed into
    pub fn driving_side(&self) -> Option<Side> {
        self.driving
    }

    pub fn submit_state(&self) -> SubmitState {
        self.submit_state
    }

    pub fn market(&self) -> &MarketSnapshot {
        &self.market
    }

    /// Label of the submit action
    pub fn submit_label(&self) -> String {
        match self.submit_state {
            SubmitState::Empty | SubmitState::InvalidOrZero => "Enter an amount".to_string(),
            SubmitState::InsufficientBalance => format!(
                "Insufficient {} balance",
                self.labels.symbol(self.direction.input_side())
            ),
            SubmitState::Ready => self.direction.to_string(),
        }
    }

    /// USD value of a field at the last known spot price
    pub fn usd_value(&self, side: Side) -> f64 {
        let amount = TokenAmount::parse(self.text(side)).unwrap_or_default();
        let price = match side {
            Side::Base => self.market.usd_price_base,
            Side::Derivative => self.market.usd_price_derivative,
        };
        amount.usd_value(price)
    }

    /// Raw keystrokes in a field: sanitize, clamp, recompute the mirror,
    /// re-validate
    pub fn edit(&mut self, side: Side, raw: &str) {
        let text = sanitize(raw);
        if text.is_empty() {
            self.base_text.clear();
            self.derivative_text.clear();
            self.driving = None;
            self.validate();
            return;
        }

        let mut text = clamp_precision(&text, TOKEN_DECIMALS as usize);
        let rate = self.market.rate;
        // Too large for u64 is above any ceiling, so it clamps too
        let parsed = match TokenAmount::parse(&text) {
            Err(AmountParseError::Overflow(_)) => Ok(TokenAmount::from_raw(u64::MAX)),
            other => other,
        };
        let mirror = match parsed {
            Ok(amount) => {
                let amount = match (side, rate) {
                    (Side::Base, _) => self.bounds.clamp_base(amount),
                    (Side::Derivative, Some(rate)) => self.bounds.clamp_derivative(amount, rate),
                    (Side::Derivative, None) => (amount, false),
                };
                if let (clamped, true) = amount {
                    text = clamped.to_string();
                }
                rate.map(|rate| convert(side, amount.0, rate).to_string())
            }
            Err(_) => None,
        };

        let mirror = mirror.unwrap_or_default();
        match side {
            Side::Base => {
                self.base_text = text;
                self.derivative_text = mirror;
            }
            Side::Derivative => {
                self.derivative_text = text;
                self.base_text = mirror;
            }
        }
        self.driving = Some(side);
        self.validate();
    }

    pub fn edit_base(&mut self, raw: &str) {
        self.edit(Side::Base, raw);
    }

    pub fn edit_derivative(&mut self, raw: &str) {
        self.edit(Side::Derivative, raw);
    }

    /// New balances, prices or rate. Re-validates without re-converting.
    pub fn apply_market(&mut self, market: &MarketSnapshot) {
        self.market = market.clone();
        self.validate();
    }

    /// Package the current amounts if submit is enabled
    pub fn submit(&self) -> Option<SubmitRequest> {
        if !self.submit_state.is_enabled() {
            return None;
        }
        Some(SubmitRequest {
            direction: self.direction,
            base_amount_text: self.base_text.clone(),
            derivative_amount_text: self.derivative_text.clone(),
        })
    }

    fn validate(&mut self) {
        let side = self.direction.input_side();
        let text = self.text(side);

        self.submit_state = if text.is_empty() {
            SubmitState::Empty
        } else {
            match TokenAmount::parse(text) {
                Ok(amount) if !amount.is_zero() => {
                    let balance = self.market.balance(side).unwrap_or_default();
                    if amount > balance {
                        SubmitState::InsufficientBalance
                    } else {
                        SubmitState::Ready
                    }
                }
                _ => SubmitState::InvalidOrZero,
            }
        };
    }
}

fn convert(from: Side, amount: TokenAmount, rate: ExchangeRate) -> TokenAmount {
    match from {
        Side::Base => rate.to_derivative(amount),
        Side::Derivative => rate.to_base(amount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::MAX_BASE_SUPPLY;

    fn labels() -> TokenLabels {
        TokenLabels {
            base_symbol: "STEP".to_string(),
            derivative_symbol: "xSTEP".to_string(),
        }
    }

    fn form(direction: StakeDirection) -> FormState {
        let bounds = ConversionBounds::new(TokenAmount::from_whole(MAX_BASE_SUPPLY).unwrap());
        FormState::new(direction, labels(), bounds)
    }

    fn market(rate: &str, base: &str, derivative: &str) -> MarketSnapshot {
        MarketSnapshot {
            rate: ExchangeRate::parse(rate).unwrap(),
            balance_base: Some(TokenAmount::parse(base).unwrap()),
            balance_derivative: Some(TokenAmount::parse(derivative).unwrap()),
            ..MarketSnapshot::default()
        }
    }

    #[test]
    fn test_base_edit_mirrors_derivative() {
        let mut form = form(StakeDirection::Stake);
        form.apply_market(&market("2", "100", "0"));

        form.edit_base("10");
        assert_eq!(form.derivative_text(), "5");
        assert_eq!(form.driving_side(), Some(Side::Base));

        form.edit_derivative("5");
        assert_eq!(form.base_text(), "10");
        assert_eq!(form.driving_side(), Some(Side::Derivative));
    }

    #[test]
    fn test_unknown_rate_leaves_mirror_blank() {
        let mut form = form(StakeDirection::Stake);
        form.edit_base("10");
        assert_eq!(form.base_text(), "10");
        assert_eq!(form.derivative_text(), "");
    }

    #[test]
    fn test_edit_sanitizes_and_truncates() {
        let mut form = form(StakeDirection::Stake);
        form.apply_market(&market("1", "100", "0"));

        form.edit_base("-12a.3.4");
        assert_eq!(form.base_text(), "12.34");

        form.edit_base("1.1234567891");
        assert_eq!(form.base_text(), "1.123456789");
        assert_eq!(form.derivative_text(), "1.123456789");
    }

    #[test]
    fn test_clamps_to_max_supply() {
        let mut form = form(StakeDirection::Stake);
        form.apply_market(&market("2", "0", "0"));

        form.edit_base("5000000000");
        assert_eq!(form.base_text(), "1000000000");
        assert_eq!(form.derivative_text(), "500000000");

        form.edit_derivative("900000000");
        assert_eq!(form.derivative_text(), "500000000");
        assert_eq!(form.base_text(), "1000000000");
    }

    #[test]
    fn test_clamps_amounts_beyond_u64() {
        let mut form = form(StakeDirection::Stake);
        form.apply_market(&market("2", "1000000000", "0"));

        form.edit_base("20000000000");
        assert_eq!(form.base_text(), "1000000000");
        assert_eq!(form.derivative_text(), "500000000");
        assert_eq!(form.submit_state(), SubmitState::Ready);

        form.edit_derivative("99999999999999999999");
        assert_eq!(form.derivative_text(), "500000000");
        assert_eq!(form.base_text(), "1000000000");
    }

    #[test]
    fn test_submit_state_transitions() {
        let mut form = form(StakeDirection::Stake);
        form.apply_market(&market("2", "10", "0"));
        assert_eq!(form.submit_state(), SubmitState::Empty);
        assert_eq!(form.submit_label(), "Enter an amount");

        form.edit_base("0");
        assert_eq!(form.submit_state(), SubmitState::InvalidOrZero);
        assert_eq!(form.submit_label(), "Enter an amount");

        form.edit_base(".");
        assert_eq!(form.submit_state(), SubmitState::InvalidOrZero);
        assert_eq!(form.derivative_text(), "");

        form.edit_base("abc");
        assert_eq!(form.submit_state(), SubmitState::Empty);

        form.edit_base("11");
        assert_eq!(form.submit_state(), SubmitState::InsufficientBalance);
        assert_eq!(form.submit_label(), "Insufficient STEP balance");
        assert!(form.submit().is_none());

        form.edit_base("10");
        assert_eq!(form.submit_state(), SubmitState::Ready);
        assert_eq!(form.submit_label(), "Stake");
    }

    #[test]
    fn test_unstake_gates_on_derivative_balance() {
        let mut form = form(StakeDirection::Unstake);
        form.apply_market(&market("2", "1000", "3"));

        // Typing into the base field still validates the derivative side
        form.edit_base("10");
        assert_eq!(form.derivative_text(), "5");
        assert_eq!(form.submit_state(), SubmitState::InsufficientBalance);
        assert_eq!(form.submit_label(), "Insufficient xSTEP balance");

        form.edit_derivative("3");
        assert_eq!(form.submit_state(), SubmitState::Ready);
        assert_eq!(form.submit_label(), "Unstake");

        let request = form.submit().unwrap();
        assert_eq!(request.direction, StakeDirection::Unstake);
        assert_eq!(request.input_text(), "3");
        assert_eq!(request.base_amount_text, "6");
    }

    #[test]
    fn test_market_update_revalidates_without_reconverting() {
        let mut form = form(StakeDirection::Stake);
        form.apply_market(&market("2", "0", "0"));
        form.edit_base("10");
        assert_eq!(form.submit_state(), SubmitState::InsufficientBalance);

        form.apply_market(&market("4", "50", "0"));
        assert_eq!(form.submit_state(), SubmitState::Ready);
        assert_eq!(form.derivative_text(), "5");
    }

    #[test]
    fn test_unknown_balance_counts_as_zero() {
        let mut form = form(StakeDirection::Stake);
        form.apply_market(&MarketSnapshot {
            rate: ExchangeRate::from_e9(1_000_000_000),
            ..MarketSnapshot::default()
        });
        form.edit_base("1");
        assert_eq!(form.submit_state(), SubmitState::InsufficientBalance);
    }

    #[test]
    fn test_captions_swap_with_direction() {
        assert_eq!(StakeDirection::Stake.caption(Side::Base), YOU_STAKE_CAPTION);
        assert_eq!(StakeDirection::Stake.caption(Side::Derivative), YOU_RECEIVE_CAPTION);
        assert_eq!(StakeDirection::Unstake.caption(Side::Base), YOU_RECEIVE_CAPTION);
        assert_eq!(StakeDirection::Unstake.caption(Side::Derivative), YOU_STAKE_CAPTION);
    }

    #[test]
    fn test_usd_value_uses_market_price() {
        let mut form = form(StakeDirection::Stake);
        let mut snapshot = market("2", "100", "0");
        snapshot.usd_price_base = Some(0.05);
        form.apply_market(&snapshot);
        form.edit_base("10");
        assert_eq!(form.usd_value(Side::Base), 0.5);
        assert_eq!(form.usd_value(Side::Derivative), 0.0);
    }
}
