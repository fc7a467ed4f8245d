//! Error taxonomy for the staking engine

use thiserror::Error;

use crate::wallet::SignerError;

pub type Result<T> = std::result::Result<T, StakeError>;

#[derive(Debug, Error)]
pub enum StakeError {
    /// Wallet, program or account not ready. Raised before any instruction
    /// is built.
    #[error("{0} is not ready or available")]
    PreconditionMissing(&'static str),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A submit is already in flight
    #[error("a transaction is already in progress")]
    Busy,

    #[error("transaction simulation failed: {0}")]
    SimulationFailed(String),

    #[error("{0}")]
    SignerRejected(String),

    #[error("{0}")]
    SubmissionFailed(String),

    #[error("transaction {0} was not confirmed before its blockhash expired")]
    ConfirmationTimeout(String),

    #[error("price oracle unavailable: {0}")]
    PriceOracleUnavailable(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl From<SignerError> for StakeError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::Rejected(msg) => Self::SignerRejected(msg),
            SignerError::Network(msg) => Self::SubmissionFailed(msg),
        }
    }
}

impl From<solana_client::client_error::ClientError> for StakeError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        Self::Rpc(err.to_string())
    }
}
