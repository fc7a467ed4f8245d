//! USD spot prices for the two mints

use std::collections::HashMap;
use std::future::Future;

use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;

use crate::error::{Result, StakeError};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpotPrices {
    pub price_a: Option<f64>,
    pub price_b: Option<f64>,
}

pub trait PriceOracle: Send + Sync {
    fn spot_prices(&self, mint_a: &Pubkey, mint_b: &Pubkey) -> impl Future<Output = Result<SpotPrices>> + Send;
}

/// GeckoTerminal simple token price endpoint
pub struct GeckoTerminalOracle {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    data: PriceData,
}

#[derive(Debug, Deserialize)]
struct PriceData {
    attributes: PriceAttributes,
}

#[derive(Debug, Deserialize)]
struct PriceAttributes {
    #[serde(default)]
    token_prices: HashMap<String, Option<String>>,
}

impl GeckoTerminalOracle {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, mint_a: &Pubkey, mint_b: &Pubkey) -> String {
        format!(
            "{}/simple/networks/solana/token_price/{}%2C{}",
            self.base_url.trim_end_matches('/'),
            mint_a,
            mint_b
        )
    }
}

impl PriceOracle for GeckoTerminalOracle {
    async fn spot_prices(&self, mint_a: &Pubkey, mint_b: &Pubkey) -> Result<SpotPrices> {
        let response = self
            .http
            .get(self.url(mint_a, mint_b))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| StakeError::PriceOracleUnavailable(err.to_string()))?;

        let body: PriceResponse = response
            .json()
            .await
            .map_err(|err| StakeError::PriceOracleUnavailable(err.to_string()))?;

        Ok(extract_prices(&body, mint_a, mint_b))
    }
}

fn extract_prices(body: &PriceResponse, mint_a: &Pubkey, mint_b: &Pubkey) -> SpotPrices {
    let prices = &body.data.attributes.token_prices;
    let lookup = |mint: &Pubkey| {
        prices
            .get(&mint.to_string())
            .and_then(Option::as_deref)
            .and_then(|price| price.parse::<f64>().ok())
            .filter(|price| price.is_finite())
    };

    SpotPrices {
        price_a: lookup(mint_a),
        price_b: lookup(mint_b),
    }
}
