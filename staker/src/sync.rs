//! Balance, price and rate refresh after state-changing events

use solana_sdk::pubkey::Pubkey;

use crate::amount::TokenAmount;
use crate::discovery::PriceDiscovery;
use crate::error::Result;
use crate::form::Side;
use crate::oracle::{PriceOracle, SpotPrices};
use crate::program::StakingProgram;
use crate::rate::ExchangeRate;
use crate::rpc::ChainRpc;

/// Everything the forms display besides their own input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketSnapshot {
    pub rate: Option<ExchangeRate>,
    pub usd_price_base: Option<f64>,
    pub usd_price_derivative: Option<f64>,
    pub balance_base: Option<TokenAmount>,
    pub balance_derivative: Option<TokenAmount>,
}

impl MarketSnapshot {
    pub fn balance(&self, side: Side) -> Option<TokenAmount> {
        match side {
            Side::Base => self.balance_base,
            Side::Derivative => self.balance_derivative,
        }
    }

    pub fn set_balance(&mut self, side: Side, balance: Option<TokenAmount>) {
        match side {
            Side::Base => self.balance_base = balance,
            Side::Derivative => self.balance_derivative = balance,
        }
    }
}

/// The user's token accounts, where known
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenAccounts {
    pub base: Option<Pubkey>,
    pub derivative: Option<Pubkey>,
}

impl TokenAccounts {
    pub fn get(&self, side: Side) -> Option<Pubkey> {
        match side {
            Side::Base => self.base,
            Side::Derivative => self.derivative,
        }
    }

    pub fn set(&mut self, side: Side, account: Pubkey) {
        match side {
            Side::Base => self.base = Some(account),
            Side::Derivative => self.derivative = Some(account),
        }
    }
}

pub struct BalanceSync<'a, R, O> {
    rpc: &'a R,
    oracle: &'a O,
    program: &'a StakingProgram,
    owner: Pubkey,
}

impl<'a, R: ChainRpc, O: PriceOracle> BalanceSync<'a, R, O> {
    pub fn new(rpc: &'a R, oracle: &'a O, program: &'a StakingProgram, owner: Pubkey) -> Self {
        Self {
            rpc,
            oracle,
            program,
            owner,
        }
    }

    /// Refresh rate, USD prices and balances.
    ///
    /// `known_rate` skips discovery. A failed discovery, oracle call or
    /// balance query leaves that field unknown; absent accounts are never
    /// queried.
    pub async fn refresh(&self, known_rate: Option<ExchangeRate>, accounts: TokenAccounts) -> Result<MarketSnapshot> {
        let discovery = PriceDiscovery::new(self.rpc, self.program, self.owner);
        let rate = match discovery.discover_rate(false, known_rate).await {
            Ok(rate) => rate,
            Err(err) => {
                log::warn!("Rate discovery failed: {}", err);
                None
            }
        };

        let (prices, balance_base, balance_derivative) = futures::join!(
            self.oracle
                .spot_prices(&self.program.base_mint, &self.program.derivative_mint),
            self.balance_of(accounts.base),
            self.balance_of(accounts.derivative),
        );

        let prices = prices.unwrap_or_else(|err| {
            log::warn!("USD prices unavailable: {}", err);
            SpotPrices::default()
        });

        Ok(MarketSnapshot {
            rate,
            usd_price_base: prices.price_a,
            usd_price_derivative: prices.price_b,
            balance_base,
            balance_derivative,
        })
    }

    /// Balance of a known account; unknown if absent or the query fails
    async fn balance_of(&self, account: Option<Pubkey>) -> Option<TokenAmount> {
        let account = account?;
        match self.rpc.token_account_balance(&account).await {
            Ok(balance) => Some(balance),
            Err(err) => {
                log::warn!("Balance of {} unavailable: {}", account, err);
                None
            }
        }
    }
}
