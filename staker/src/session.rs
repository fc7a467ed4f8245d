//! Session context: the collaborators plus everything cached for one
//! connected wallet
//!
//! Created once the signer has an identity, torn down on disconnect. State
//! writes that land after `teardown` are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};

use crate::error::{Result, StakeError};
use crate::form::Side;
use crate::notify::Notifier;
use crate::oracle::PriceOracle;
use crate::orchestrator::SubmitPhase;
use crate::program::StakingProgram;
use crate::rate::ExchangeRate;
use crate::rpc::{ChainRpc, OwnedTokenAccount};
use crate::sync::{BalanceSync, MarketSnapshot, TokenAccounts};
use crate::wallet::WalletSigner;

/// Submission settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub commitment: CommitmentConfig,
    pub confirm_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            commitment: CommitmentConfig::confirmed(),
            confirm_timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) accounts: TokenAccounts,
    pub(crate) market: MarketSnapshot,
    pub(crate) phase: SubmitPhase,
}

pub struct StakeSession<R, W, O, N> {
    pub(crate) program: StakingProgram,
    pub(crate) rpc: R,
    pub(crate) wallet: W,
    pub(crate) oracle: O,
    pub(crate) notifier: N,
    pub(crate) settings: SessionSettings,
    owner: Pubkey,
    alive: AtomicBool,
    pub(crate) in_flight: AtomicBool,
    state: Mutex<SessionState>,
}

impl<R, W, O, N> StakeSession<R, W, O, N>
where
    R: ChainRpc,
    W: WalletSigner,
    O: PriceOracle,
    N: Notifier,
{
    /// Start a session for the wallet's current identity
    pub fn new(
        program: StakingProgram,
        rpc: R,
        wallet: W,
        oracle: O,
        notifier: N,
        settings: SessionSettings,
    ) -> Result<Self> {
        let owner = wallet.identity().ok_or(StakeError::PreconditionMissing("wallet"))?;

        Ok(Self {
            program,
            rpc,
            wallet,
            oracle,
            notifier,
            settings,
            owner,
            alive: AtomicBool::new(true),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(SessionState::default()),
        })
    }

    /// Look up the user's token accounts, then load rate, prices and balances.
    /// Failures are logged and leave the affected fields unknown.
    pub async fn initialize(&self) {
        self.discover_accounts().await;
        if let Err(err) = self.refresh(None).await {
            log::error!("Initial refresh failed: {}", err);
        }
    }

    pub fn owner(&self) -> Pubkey {
        self.owner
    }

    pub fn program(&self) -> &StakingProgram {
        &self.program
    }

    pub fn mint(&self, side: Side) -> Pubkey {
        match side {
            Side::Base => self.program.base_mint,
            Side::Derivative => self.program.derivative_mint,
        }
    }

    pub fn market(&self) -> MarketSnapshot {
        self.lock().market.clone()
    }

    pub fn accounts(&self) -> TokenAccounts {
        self.lock().accounts
    }

    pub fn phase(&self) -> SubmitPhase {
        self.lock().phase
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Whether a submit is between `Building` and its final phase
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wallet disconnected. Work in flight may finish but no longer touches
    /// session state.
    pub fn teardown(&self) {
        self.alive.store(false, Ordering::Release);
        log::info!("Session for {} torn down", self.owner);
    }

    /// Find both token accounts concurrently and cache what exists
    pub async fn discover_accounts(&self) {
        let (base, derivative) = futures::join!(
            self.rpc.find_owned_token_account(&self.owner, &self.program.base_mint),
            self.rpc.find_owned_token_account(&self.owner, &self.program.derivative_mint),
        );

        for (side, found) in [(Side::Base, base), (Side::Derivative, derivative)] {
            match found {
                Ok(Some(OwnedTokenAccount { address, balance })) => {
                    log::debug!("Found {:?} token account {}", side, address);
                    self.update(|state| {
                        state.accounts.set(side, address);
                        state.market.set_balance(side, Some(balance));
                    });
                }
                Ok(None) => log::info!("No {:?} token account for {}", side, self.owner),
                Err(err) => log::error!("Error fetching token accounts: {}", err),
            }
        }
    }

    /// Run a balance sync and cache its result
    pub async fn refresh(&self, known_rate: Option<ExchangeRate>) -> Result<MarketSnapshot> {
        let sync = BalanceSync::new(&self.rpc, &self.oracle, &self.program, self.owner);
        let snapshot = sync.refresh(known_rate, self.accounts()).await?;

        self.update(|state| state.market = snapshot.clone());
        Ok(snapshot)
    }

    /// Apply `f` to the session state unless the session was torn down
    pub(crate) fn update<F: FnOnce(&mut SessionState)>(&self, f: F) -> bool {
        if !self.is_alive() {
            log::debug!("Dropping state update for torn down session");
            return false;
        }
        f(&mut *self.lock());
        true
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
