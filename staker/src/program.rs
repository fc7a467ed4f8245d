//! Staking program interface: instruction builders and log event decoding
//!
//! The program is Anchor-encoded. Instructions start with
//! `sha256("global:<name>")[..8]`, events with `sha256("event:<Name>")[..8]`,
//! followed by Borsh fields.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::{
    hash::hashv,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use crate::amount::TokenAmount;
use crate::rate::ExchangeRate;

const PROGRAM_DATA_PREFIX: &str = "Program data: ";

pub const PRICE_EVENT: &str = "Price";
pub const PRICE_CHANGE_EVENT: &str = "PriceChange";

/// Accounts for a stake (base in, derivative out)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeParams {
    pub owner: Pubkey,
    pub base_from: Pubkey,
    pub derivative_to: Pubkey,
    pub amount: TokenAmount,
}

/// Accounts for an unstake (derivative in, base out)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnstakeParams {
    pub owner: Pubkey,
    pub derivative_from: Pubkey,
    pub base_to: Pubkey,
    pub amount: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeParams {
    Stake(StakeParams),
    Unstake(UnstakeParams),
}

/// `Price` event, emitted by `emit_price`
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PriceEvent {
    pub step_per_xstep_e9: u64,
    pub step_per_xstep: String,
}

/// `PriceChange` event, emitted by stake and unstake
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PriceChangeEvent {
    pub old_step_per_xstep_e9: u64,
    pub old_step_per_xstep: String,
    pub new_step_per_xstep_e9: u64,
    pub new_step_per_xstep: String,
}

/// Decoded program event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramEvent {
    Price(PriceEvent),
    PriceChange(PriceChangeEvent),
}

impl ProgramEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Price(_) => PRICE_EVENT,
            Self::PriceChange(_) => PRICE_CHANGE_EVENT,
        }
    }

    /// Rate carried by the event; the post-change rate for `PriceChange`
    pub fn rate(&self) -> Option<ExchangeRate> {
        match self {
            Self::Price(event) => ExchangeRate::from_e9(event.step_per_xstep_e9),
            Self::PriceChange(event) => ExchangeRate::from_e9(event.new_step_per_xstep_e9),
        }
    }

    /// Encode as the `Program data:` payload the program would log
    pub fn to_log_payload(&self) -> String {
        let (name, body) = match self {
            Self::Price(event) => (PRICE_EVENT, borsh::to_vec(event)),
            Self::PriceChange(event) => (PRICE_CHANGE_EVENT, borsh::to_vec(event)),
        };
        let mut bytes = discriminator("event", name).to_vec();
        bytes.extend(body.unwrap_or_default());
        STANDARD.encode(bytes)
    }
}

/// Rate from the first event named `name`
pub fn first_rate(events: &[ProgramEvent], name: &str) -> Option<ExchangeRate> {
    events.iter().find(|event| event.name() == name).and_then(ProgramEvent::rate)
}

/// Anchor discriminator for `<namespace>:<name>`
pub fn discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let hash = hashv(&[namespace.as_bytes(), b":", name.as_bytes()]);
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash.to_bytes()[..8]);
    out
}

/// The deployed staking program and the mint pair it exchanges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingProgram {
    pub program_id: Pubkey,
    pub base_mint: Pubkey,
    pub derivative_mint: Pubkey,
}

impl StakingProgram {
    pub fn new(program_id: Pubkey, base_mint: Pubkey, derivative_mint: Pubkey) -> Self {
        Self {
            program_id,
            base_mint,
            derivative_mint,
        }
    }

    /// Vault holding escrowed base tokens, and its bump (the `nonce` argument)
    ///
    /// Derived from the base mint on every call.
    pub fn vault_address(&self) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[self.base_mint.as_ref()], &self.program_id)
    }

    pub fn build_exchange_instruction(&self, params: &ExchangeParams) -> Instruction {
        match params {
            ExchangeParams::Stake(params) => self.build_stake_instruction(params),
            ExchangeParams::Unstake(params) => self.build_unstake_instruction(params),
        }
    }

    /// Build stake instruction
    pub fn build_stake_instruction(&self, params: &StakeParams) -> Instruction {
        let (vault, nonce) = self.vault_address();

        let accounts = vec![
            AccountMeta::new_readonly(self.base_mint, false),
            AccountMeta::new(self.derivative_mint, false),
            AccountMeta::new(params.base_from, false),
            AccountMeta::new_readonly(params.owner, true),
            AccountMeta::new(vault, false),
            AccountMeta::new(params.derivative_to, false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ];

        Instruction {
            program_id: self.program_id,
            accounts,
            data: exchange_data("stake", nonce, params.amount),
        }
    }

    /// Build unstake instruction
    pub fn build_unstake_instruction(&self, params: &UnstakeParams) -> Instruction {
        let (vault, nonce) = self.vault_address();

        let accounts = vec![
            AccountMeta::new_readonly(self.base_mint, false),
            AccountMeta::new(self.derivative_mint, false),
            AccountMeta::new(params.derivative_from, false),
            AccountMeta::new_readonly(params.owner, true),
            AccountMeta::new(vault, false),
            AccountMeta::new(params.base_to, false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ];

        Instruction {
            program_id: self.program_id,
            accounts,
            data: exchange_data("unstake", nonce, params.amount),
        }
    }

    /// Read-only instruction that logs a `Price` event
    pub fn build_emit_price_instruction(&self) -> Instruction {
        let (vault, _) = self.vault_address();

        Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new_readonly(self.base_mint, false),
                AccountMeta::new_readonly(self.derivative_mint, false),
                AccountMeta::new_readonly(vault, false),
            ],
            data: discriminator("global", "emit_price").to_vec(),
        }
    }

    /// Decode events this program logged.
    ///
    /// `Program data:` lines are attributed to the innermost program on the
    /// invocation stack; data logged by other programs and unknown event
    /// kinds are skipped.
    pub fn decode_log_events(&self, logs: &[String]) -> Vec<ProgramEvent> {
        let program_id = self.program_id.to_string();
        let mut stack: Vec<&str> = Vec::new();
        let mut events = Vec::new();

        for line in logs {
            if let Some(payload) = line.strip_prefix(PROGRAM_DATA_PREFIX) {
                if stack.last() == Some(&program_id.as_str()) {
                    if let Some(event) = decode_event(payload) {
                        events.push(event);
                    }
                }
                continue;
            }

            let Some(rest) = line.strip_prefix("Program ") else {
                continue;
            };
            let Some((id, tail)) = rest.split_once(' ') else {
                continue;
            };
            if tail.starts_with("invoke [") {
                stack.push(id);
            } else if tail == "success" || tail.starts_with("failed") {
                stack.pop();
            }
        }

        events
    }
}

fn exchange_data(name: &str, nonce: u8, amount: TokenAmount) -> Vec<u8> {
    let mut data = discriminator("global", name).to_vec();
    data.push(nonce);
    data.extend_from_slice(&amount.raw().to_le_bytes());
    data
}

fn decode_event(payload: &str) -> Option<ProgramEvent> {
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    if bytes.len() < 8 {
        return None;
    }
    let (tag, mut body) = bytes.split_at(8);

    if tag == discriminator("event", PRICE_EVENT) {
        PriceEvent::deserialize(&mut body).ok().map(ProgramEvent::Price)
    } else if tag == discriminator("event", PRICE_CHANGE_EVENT) {
        PriceChangeEvent::deserialize(&mut body)
            .ok()
            .map(ProgramEvent::PriceChange)
    } else {
        log::debug!("Skipping unknown program event");
        None
    }
}
