//! Stake/unstake submission: build, simulate, sign, submit, confirm, settle
//!
//! One submit at a time per session. Nothing from a failed attempt is kept;
//! the next submit builds from scratch.

use std::sync::atomic::{AtomicBool, Ordering};

use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use tokio::time;

use crate::amount::TokenAmount;
use crate::error::{Result, StakeError};
use crate::form::{Side, StakeDirection, SubmitRequest};
use crate::notify::{explorer_url, Notifier};
use crate::oracle::PriceOracle;
use crate::program::{first_rate, ExchangeParams, StakeParams, UnstakeParams, PRICE_CHANGE_EVENT};
use crate::provision::{ensure_destination_account, DestinationAccount};
use crate::rate::ExchangeRate;
use crate::rpc::{BlockReference, ChainRpc};
use crate::session::StakeSession;
use crate::wallet::{SubmitOptions, WalletSigner};

/// Where the current (or last) submit is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubmitPhase {
    #[default]
    Idle,
    Building,
    Simulating,
    AwaitingSignature,
    Submitted,
    Confirming,
    Settled,
    Failed,
}

/// A transaction between building and confirmation
#[derive(Debug)]
pub struct PendingTransaction {
    /// Account creation (if any) followed by the exchange instruction
    pub instructions: Vec<Instruction>,
    /// Token account created by this transaction; it must co-sign
    pub new_account: Option<(Side, Keypair)>,
    pub block_reference: BlockReference,
    pub fee_payer: Pubkey,
}

impl PendingTransaction {
    /// Transaction paid by `fee_payer` on the fetched blockhash, carrying the
    /// new account's signature. The fee payer's signature is left to the
    /// wallet.
    pub fn envelope(&self) -> Result<Transaction> {
        let blockhash = self.block_reference.blockhash;
        let mut transaction = Transaction::new_with_payer(&self.instructions, Some(&self.fee_payer));
        transaction.message.recent_blockhash = blockhash;

        if let Some((_, keypair)) = &self.new_account {
            transaction
                .try_partial_sign(&[keypair], blockhash)
                .map_err(|err| StakeError::SignerRejected(err.to_string()))?;
        }
        Ok(transaction)
    }
}

/// Holds the single-flight flag for the duration of a submit
struct SubmitGuard<'a>(&'a AtomicBool);

impl<'a> SubmitGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<R, W, O, N> StakeSession<R, W, O, N>
where
    R: ChainRpc,
    W: WalletSigner,
    O: PriceOracle,
    N: Notifier,
{
    /// Submit and report the outcome once through the notifier
    pub async fn handle_submit(&self, request: &SubmitRequest) -> Result<Signature> {
        let result = self.submit(request).await;
        match &result {
            Ok(signature) => self.notifier.success(
                &format!("{} Transaction was successful", request.direction),
                &format!("Open in explorer: {}", explorer_url(&signature.to_string())),
            ),
            Err(err) => self.notifier.failure("Transaction failed", &err.to_string()),
        }
        result
    }

    /// Run one stake/unstake to settlement.
    ///
    /// Returns `StakeError::Busy` if another submit is in flight. Errors are
    /// never retried.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<Signature> {
        let _guard = SubmitGuard::acquire(&self.in_flight).ok_or(StakeError::Busy)?;

        let result = self.run_submit(request).await;
        match &result {
            Ok(signature) => {
                log::info!("{} settled: {}", request.direction, signature);
                self.set_phase(SubmitPhase::Settled);
            }
            Err(err) => {
                log::error!("{} failed: {}", request.direction, err);
                self.set_phase(SubmitPhase::Failed);
            }
        }
        result
    }

    async fn run_submit(&self, request: &SubmitRequest) -> Result<Signature> {
        self.set_phase(SubmitPhase::Building);
        let pending = self.build_transaction(request).await?;
        let transaction = pending.envelope()?;

        self.set_phase(SubmitPhase::Simulating);
        let event_rate = self.simulate_for_rate(&transaction).await;

        self.set_phase(SubmitPhase::AwaitingSignature);
        let options = SubmitOptions {
            commitment: self.settings.commitment,
            min_context_slot: Some(pending.block_reference.context_slot),
        };
        let signature = self
            .wallet
            .sign_and_submit(transaction, options)
            .await?;
        self.set_phase(SubmitPhase::Submitted);
        log::info!("Submitted {}", signature);

        self.set_phase(SubmitPhase::Confirming);
        time::timeout(
            self.settings.confirm_timeout,
            self.rpc.confirm(&signature, &pending.block_reference),
        )
        .await
        .map_err(|_| StakeError::ConfirmationTimeout(signature.to_string()))??;

        let new_account = pending
            .new_account
            .map(|(side, keypair)| (side, keypair.pubkey()));
        self.settle(new_account, event_rate).await;

        Ok(signature)
    }

    /// Resolve accounts, provision the destination if needed and collect
    /// the instructions against a fresh block reference.
    pub async fn build_transaction(&self, request: &SubmitRequest) -> Result<PendingTransaction> {
        let owner = self
            .wallet
            .identity()
            .ok_or(StakeError::PreconditionMissing("wallet"))?;
        if !self.is_alive() {
            return Err(StakeError::PreconditionMissing("session"));
        }

        let amount = TokenAmount::parse(request.input_text())
            .map_err(|err| StakeError::InvalidAmount(err.to_string()))?;
        if amount.is_zero() {
            return Err(StakeError::InvalidAmount("amount must be greater than zero".to_string()));
        }

        let direction = request.direction;
        let accounts = self.accounts();
        let source = accounts
            .get(direction.input_side())
            .ok_or(StakeError::PreconditionMissing("source token account"))?;

        let destination_side = direction.output_side();
        let destination = ensure_destination_account(
            &self.rpc,
            &self.mint(destination_side),
            &owner,
            accounts.get(destination_side),
        )
        .await?;

        let params = match direction {
            StakeDirection::Stake => ExchangeParams::Stake(StakeParams {
                owner,
                base_from: source,
                derivative_to: destination.address(),
                amount,
            }),
            StakeDirection::Unstake => ExchangeParams::Unstake(UnstakeParams {
                owner,
                derivative_from: source,
                base_to: destination.address(),
                amount,
            }),
        };
        let exchange = self.program.build_exchange_instruction(&params);

        let (mut instructions, new_account) = match destination {
            DestinationAccount::Existing(_) => (Vec::with_capacity(1), None),
            DestinationAccount::Create(new) => (new.instructions, Some((destination_side, new.keypair))),
        };
        instructions.push(exchange);

        let block_reference = self.rpc.latest_block_reference().await?;

        log::debug!(
            "Built {} of {} with {} instruction(s)",
            direction,
            amount,
            instructions.len()
        );

        Ok(PendingTransaction {
            instructions,
            new_account,
            block_reference,
            fee_payer: owner,
        })
    }

    /// Dry run for the `PriceChange` event. Never blocks submission.
    async fn simulate_for_rate(&self, transaction: &Transaction) -> Option<ExchangeRate> {
        match self.rpc.simulate(transaction).await {
            Ok(outcome) => {
                if let Some(err) = outcome.error {
                    log::warn!("Transaction simulation failed: {}", err);
                    return None;
                }
                let events = self.program.decode_log_events(&outcome.logs);
                first_rate(&events, PRICE_CHANGE_EVENT)
            }
            Err(err) => {
                log::warn!("Transaction simulation failed: {}", err);
                None
            }
        }
    }

    /// Cache a newly created account, then refresh balances with the rate
    /// from simulation when there is one
    async fn settle(&self, new_account: Option<(Side, Pubkey)>, event_rate: Option<ExchangeRate>) {
        if let Some((side, address)) = new_account {
            self.notifier.info(
                "Token account created",
                &format!("{} account {}", self.mint(side), address),
            );
            self.update(|state| state.accounts.set(side, address));
        }

        if let Err(err) = self.refresh(event_rate).await {
            log::warn!("Refresh after settlement failed: {}", err);
        }
    }

    fn set_phase(&self, phase: SubmitPhase) {
        log::debug!("Submit phase: {:?}", phase);
        self.update(|state| state.phase = phase);
    }
}
