//! Signer collaborator and the local keypair wallet

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use solana_client::{nonblocking::rpc_client::RpcClient, rpc_config::RpcSendTransactionConfig};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("signer rejected the transaction: {0}")]
    Rejected(String),
    #[error("{0}")]
    Network(String),
}

/// Submission hints passed through to the signer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    pub commitment: CommitmentConfig,
    /// Slot the transaction's blockhash was observed at
    pub min_context_slot: Option<u64>,
}

pub trait WalletSigner: Send + Sync {
    /// Public identity, absent while the wallet is disconnected
    fn identity(&self) -> Option<Pubkey>;

    /// Add the primary signature and submit. Any co-signatures are already
    /// present on `transaction`.
    fn sign_and_submit(
        &self,
        transaction: Transaction,
        options: SubmitOptions,
    ) -> impl Future<Output = Result<Signature, SignerError>> + Send;
}

/// Wallet backed by a local keypair file
pub struct KeypairWallet {
    keypair: Keypair,
    client: Arc<RpcClient>,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair, client: Arc<RpcClient>) -> Self {
        Self { keypair, client }
    }
}

impl WalletSigner for KeypairWallet {
    fn identity(&self) -> Option<Pubkey> {
        Some(self.keypair.pubkey())
    }

    async fn sign_and_submit(
        &self,
        mut transaction: Transaction,
        options: SubmitOptions,
    ) -> Result<Signature, SignerError> {
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|err| SignerError::Rejected(err.to_string()))?;

        let config = RpcSendTransactionConfig {
            preflight_commitment: Some(options.commitment.commitment),
            min_context_slot: options.min_context_slot,
            ..RpcSendTransactionConfig::default()
        };

        self.client
            .send_transaction_with_config(&transaction, config)
            .await
            .map_err(|err| SignerError::Network(err.to_string()))
    }
}

/// Load a keypair from a file.
///
/// Accepts the Solana CLI JSON byte array, a base58 secret key string, or
/// the raw 64 bytes.
pub fn load_keypair(path: &str) -> Result<Keypair> {
    let expanded_path = shellexpand::tilde(path);
    let bytes = std::fs::read(expanded_path.as_ref())
        .context(format!("Failed to read keypair from {}", path))?;

    parse_keypair(&bytes)
}

fn parse_keypair(bytes: &[u8]) -> Result<Keypair> {
    let text = std::str::from_utf8(bytes).map(str::trim).unwrap_or_default();

    let secret = if text.starts_with('[') {
        serde_json::from_str::<Vec<u8>>(text).context("Failed to parse keypair JSON")?
    } else if !text.is_empty() && bytes.len() != 64 {
        bs58::decode(text)
            .into_vec()
            .context("Failed to decode base58 keypair")?
    } else {
        bytes.to_vec()
    };

    Keypair::try_from(&secret[..]).context("Failed to create keypair from bytes")
}
