//! Chain access: the RPC calls the engine needs, and their Solana JSON-RPC
//! implementation

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use solana_account_decoder::UiAccountData;
use solana_client::{
    nonblocking::rpc_client::RpcClient, rpc_config::RpcSimulateTransactionConfig,
    rpc_request::TokenAccountsFilter,
};
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};
use tokio::time;

use crate::amount::TokenAmount;
use crate::error::{Result, StakeError};

const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Recent blockhash plus the height after which it expires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReference {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
    /// Slot the reference was observed at
    pub context_slot: u64,
}

/// Result of a dry run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub logs: Vec<String>,
    pub error: Option<String>,
}

/// A token account owned by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedTokenAccount {
    pub address: Pubkey,
    pub balance: TokenAmount,
}

pub trait ChainRpc: Send + Sync {
    fn latest_block_reference(&self) -> impl Future<Output = Result<BlockReference>> + Send;

    fn simulate(&self, transaction: &Transaction) -> impl Future<Output = Result<SimulationOutcome>> + Send;

    /// Wait until `signature` reaches the configured commitment, failing
    /// once `reference` expires
    fn confirm(
        &self,
        signature: &Signature,
        reference: &BlockReference,
    ) -> impl Future<Output = Result<()>> + Send;

    fn token_account_balance(&self, account: &Pubkey) -> impl Future<Output = Result<TokenAmount>> + Send;

    /// First token account `owner` holds for `mint`, if any
    fn find_owned_token_account(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> impl Future<Output = Result<Option<OwnedTokenAccount>>> + Send;

    fn minimum_balance_for_rent_exemption(&self, size: usize) -> impl Future<Output = Result<u64>> + Send;
}

/// `ChainRpc` over a Solana JSON-RPC endpoint
pub struct SolanaRpc {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl SolanaRpc {
    pub fn new(client: Arc<RpcClient>, commitment: CommitmentConfig) -> Self {
        Self { client, commitment }
    }

    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }
}

impl ChainRpc for SolanaRpc {
    async fn latest_block_reference(&self) -> Result<BlockReference> {
        let ((blockhash, last_valid_block_height), context_slot) = futures::try_join!(
            self.client.get_latest_blockhash_with_commitment(self.commitment),
            self.client.get_slot_with_commitment(self.commitment),
        )?;

        Ok(BlockReference {
            blockhash,
            last_valid_block_height,
            context_slot,
        })
    }

    async fn simulate(&self, transaction: &Transaction) -> Result<SimulationOutcome> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(self.commitment),
            ..RpcSimulateTransactionConfig::default()
        };

        let response = self
            .client
            .simulate_transaction_with_config(transaction, config)
            .await?;

        Ok(SimulationOutcome {
            logs: response.value.logs.unwrap_or_default(),
            error: response.value.err.map(|err| err.to_string()),
        })
    }

    async fn confirm(&self, signature: &Signature, reference: &BlockReference) -> Result<()> {
        loop {
            let status = self
                .client
                .get_signature_status_with_commitment(signature, self.commitment)
                .await?;

            if let Some(status) = status {
                return status.map_err(|err| StakeError::SubmissionFailed(err.to_string()));
            }

            let height = self
                .client
                .get_block_height_with_commitment(self.commitment)
                .await?;
            if height > reference.last_valid_block_height {
                return Err(StakeError::ConfirmationTimeout(signature.to_string()));
            }

            time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }

    async fn token_account_balance(&self, account: &Pubkey) -> Result<TokenAmount> {
        let balance = self
            .client
            .get_token_account_balance_with_commitment(account, self.commitment)
            .await?
            .value;

        TokenAmount::parse(&balance.ui_amount_string)
            .map_err(|err| StakeError::Decode(format!("balance of {}: {}", account, err)))
    }

    async fn find_owned_token_account(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<Option<OwnedTokenAccount>> {
        let accounts = self
            .client
            .get_token_accounts_by_owner_with_commitment(
                owner,
                TokenAccountsFilter::Mint(*mint),
                self.commitment,
            )
            .await?
            .value;

        for keyed in accounts {
            let UiAccountData::Json(parsed) = keyed.account.data else {
                continue;
            };
            let info = &parsed.parsed["info"];
            if info["mint"].as_str() != Some(mint.to_string().as_str()) {
                continue;
            }

            let address: Pubkey = keyed
                .pubkey
                .parse()
                .map_err(|_| StakeError::Decode(format!("token account address {}", keyed.pubkey)))?;
            let balance = info["tokenAmount"]["uiAmountString"]
                .as_str()
                .map(TokenAmount::parse)
                .transpose()
                .map_err(|err| StakeError::Decode(format!("balance of {}: {}", address, err)))?
                .unwrap_or_default();

            return Ok(Some(OwnedTokenAccount { address, balance }));
        }

        Ok(None)
    }

    async fn minimum_balance_for_rent_exemption(&self, size: usize) -> Result<u64> {
        Ok(self.client.get_minimum_balance_for_rent_exemption(size).await?)
    }
}
