//! Destination token account provisioning
//!
//! A missing destination account is created inside the same transaction:
//! a system allocation owned by the token program, then an SPL
//! `InitializeAccount`. The account address is a fresh keypair, so it must
//! co-sign.

use solana_sdk::{
    instruction::Instruction,
    program_pack::Pack,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
};

use crate::error::{Result, StakeError};
use crate::rpc::ChainRpc;

/// Byte size of an SPL token account
pub const TOKEN_ACCOUNT_SIZE: usize = spl_token::state::Account::LEN;

/// Outcome of `ensure_destination_account`
#[derive(Debug)]
pub enum DestinationAccount {
    Existing(Pubkey),
    Create(NewTokenAccount),
}

impl DestinationAccount {
    pub fn address(&self) -> Pubkey {
        match self {
            Self::Existing(address) => *address,
            Self::Create(new) => new.keypair.pubkey(),
        }
    }
}

/// A token account to be created, with the identity that must co-sign
#[derive(Debug)]
pub struct NewTokenAccount {
    pub keypair: Keypair,
    pub instructions: Vec<Instruction>,
}

/// Build the allocate + initialize pair for a new token account
pub fn create_token_account_instructions(
    payer: &Pubkey,
    account: &Pubkey,
    mint: &Pubkey,
    owner: &Pubkey,
    rent_lamports: u64,
) -> Result<Vec<Instruction>> {
    let allocate = system_instruction::create_account(
        payer,
        account,
        rent_lamports,
        TOKEN_ACCOUNT_SIZE as u64,
        &spl_token::id(),
    );
    let initialize = spl_token::instruction::initialize_account(&spl_token::id(), account, mint, owner)
        .map_err(|err| StakeError::Decode(format!("initialize account instruction: {}", err)))?;

    Ok(vec![allocate, initialize])
}

/// Return `existing`, or the instructions to create a token account for
/// `mint` owned (and paid for) by `owner`.
///
/// `existing` comes from an earlier lookup; nothing is re-queried here
/// except the rent-exempt minimum.
pub async fn ensure_destination_account<R: ChainRpc>(
    rpc: &R,
    mint: &Pubkey,
    owner: &Pubkey,
    existing: Option<Pubkey>,
) -> Result<DestinationAccount> {
    if let Some(address) = existing {
        return Ok(DestinationAccount::Existing(address));
    }

    let keypair = Keypair::new();
    let rent = rpc.minimum_balance_for_rent_exemption(TOKEN_ACCOUNT_SIZE).await?;
    let instructions = create_token_account_instructions(owner, &keypair.pubkey(), mint, owner, rent)?;

    log::debug!("Provisioning token account {} for mint {}", keypair.pubkey(), mint);

    Ok(DestinationAccount::Create(NewTokenAccount { keypair, instructions }))
}
