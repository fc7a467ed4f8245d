//! STEP Staker
//!
//! Client engine for converting a token into its staked derivative and
//! back through the on-chain staking program: input conversion under the
//! live exchange rate, rate discovery by simulation, transaction assembly
//! and submission, and balance reconciliation afterwards.

pub mod amount;
pub mod config;
pub mod discovery;
pub mod error;
pub mod form;
pub mod notify;
pub mod oracle;
pub mod orchestrator;
pub mod program;
pub mod provision;
pub mod rate;
pub mod rpc;
pub mod session;
pub mod sync;
pub mod wallet;

pub use amount::TokenAmount;
pub use error::{Result, StakeError};
pub use form::{FormState, Side, StakeDirection, SubmitRequest, SubmitState};
pub use rate::ExchangeRate;
pub use session::{SessionSettings, StakeSession};
