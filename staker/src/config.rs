//! Staker configuration

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    pubkey::Pubkey,
};

use crate::amount::{TokenAmount, MAX_BASE_SUPPLY};
use crate::form::TokenLabels;
use crate::program::StakingProgram;
use crate::rate::ConversionBounds;
use crate::session::SessionSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// RPC URL for Solana cluster
    pub rpc_url: String,

    /// Wallet keypair path
    pub keypair_path: String,

    /// Staking program ID
    #[serde(with = "pubkey_string")]
    pub program_id: Pubkey,

    /// Mint of the token being staked
    #[serde(with = "pubkey_string")]
    pub base_mint: Pubkey,

    /// Mint of the staked derivative
    #[serde(with = "pubkey_string")]
    pub derivative_mint: Pubkey,

    pub base_symbol: String,

    pub derivative_symbol: String,

    /// Base URL of the USD price API
    pub price_oracle_url: String,

    /// processed | confirmed | finalized
    pub commitment: String,

    /// Base-token supply ceiling, in whole tokens
    pub max_supply: String,

    /// Upper bound on waiting for confirmation, in seconds
    pub confirm_timeout_secs: u64,
}

impl Config {
    /// Load configuration from TOML file
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("STAKER_CONFIG")
            .unwrap_or_else(|_| "staker-config.toml".to_string());

        let config_str = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config file: {}", config_path))?;

        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str)
            .context("Failed to parse config TOML")?;

        // Fail at load time rather than on first use
        config.commitment_config()?;
        config.max_supply_amount()?;

        Ok(config)
    }

    /// Mainnet STEP / xSTEP staking
    pub fn default_mainnet() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            keypair_path: "~/.config/solana/id.json".to_string(),
            program_id: solana_sdk::pubkey!("Stk5NCWomVN3itaFjLu382u9ibb5jMSHEsh6CuhaGjB"),
            base_mint: solana_sdk::pubkey!("StepAscQoEioFxxWGnh2sLBDFp9d8rvKz2Yp39iDpyT"),
            derivative_mint: solana_sdk::pubkey!("xStpgUCss9piqeFUk2iLVcvJEGhAdJxJQuwLkXP555G"),
            base_symbol: "STEP".to_string(),
            derivative_symbol: "xSTEP".to_string(),
            price_oracle_url: "https://api.geckoterminal.com/api/v2".to_string(),
            commitment: "confirmed".to_string(),
            max_supply: MAX_BASE_SUPPLY.to_string(),
            confirm_timeout_secs: 90,
        }
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let config = Self::default_mainnet();
        let toml_str = toml::to_string_pretty(&config)
            .context("Failed to serialize config")?;

        std::fs::write(path, toml_str)
            .context(format!("Failed to write config to {}", path))?;

        log::info!("Created default config at {}", path);
        Ok(())
    }

    pub fn commitment_config(&self) -> Result<CommitmentConfig> {
        let commitment = CommitmentLevel::from_str(&self.commitment)
            .map_err(|_| anyhow::anyhow!("Unknown commitment level: {}", self.commitment))?;
        Ok(CommitmentConfig { commitment })
    }

    pub fn max_supply_amount(&self) -> Result<TokenAmount> {
        TokenAmount::parse(&self.max_supply)
            .context(format!("Invalid max_supply: {}", self.max_supply))
    }

    pub fn program(&self) -> StakingProgram {
        StakingProgram::new(self.program_id, self.base_mint, self.derivative_mint)
    }

    pub fn labels(&self) -> TokenLabels {
        TokenLabels {
            base_symbol: self.base_symbol.clone(),
            derivative_symbol: self.derivative_symbol.clone(),
        }
    }

    pub fn bounds(&self) -> Result<ConversionBounds> {
        Ok(ConversionBounds::new(self.max_supply_amount()?))
    }

    pub fn session_settings(&self) -> Result<SessionSettings> {
        Ok(SessionSettings {
            commitment: self.commitment_config()?,
            confirm_timeout: Duration::from_secs(self.confirm_timeout_secs),
        })
    }
}

/// Pubkeys as base58 strings
mod pubkey_string {
    use std::str::FromStr;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;

    pub fn serialize<S: Serializer>(pubkey: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&pubkey.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let text = String::deserialize(deserializer)?;
        Pubkey::from_str(&text).map_err(|err| D::Error::custom(format!("invalid pubkey {}: {}", text, err)))
    }
}
