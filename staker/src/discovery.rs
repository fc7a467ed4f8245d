//! Exchange rate discovery by simulating the program's read-only
//! `emit_price` call

use solana_sdk::{pubkey::Pubkey, transaction::Transaction};

use crate::error::{Result, StakeError};
use crate::program::{first_rate, StakingProgram, PRICE_EVENT};
use crate::rate::ExchangeRate;
use crate::rpc::ChainRpc;

pub struct PriceDiscovery<'a, R> {
    rpc: &'a R,
    program: &'a StakingProgram,
    fee_payer: Pubkey,
}

impl<'a, R: ChainRpc> PriceDiscovery<'a, R> {
    pub fn new(rpc: &'a R, program: &'a StakingProgram, fee_payer: Pubkey) -> Self {
        Self {
            rpc,
            program,
            fee_payer,
        }
    }

    /// Current rate.
    ///
    /// A rate from a just-confirmed transaction's event is used as-is unless
    /// `force_query` is set. Otherwise `emit_price` is simulated and the first
    /// `Price` event read; `Ok(None)` when no such event was logged.
    pub async fn discover_rate(
        &self,
        force_query: bool,
        prior_event: Option<ExchangeRate>,
    ) -> Result<Option<ExchangeRate>> {
        if let (false, Some(rate)) = (force_query, prior_event) {
            log::debug!("Using rate {} from confirmed transaction", rate);
            return Ok(Some(rate));
        }

        let instruction = self.program.build_emit_price_instruction();
        let transaction = Transaction::new_with_payer(&[instruction], Some(&self.fee_payer));

        let outcome = self
            .rpc
            .simulate(&transaction)
            .await
            .map_err(|err| StakeError::SimulationFailed(err.to_string()))?;

        if let Some(err) = outcome.error {
            return Err(StakeError::SimulationFailed(err));
        }

        let events = self.program.decode_log_events(&outcome.logs);
        let rate = first_rate(&events, PRICE_EVENT);
        match rate {
            Some(rate) => log::debug!("Discovered rate {}", rate),
            None => log::warn!("emit_price simulation logged no {} event", PRICE_EVENT),
        }

        Ok(rate)
    }
}
