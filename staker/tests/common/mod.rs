//! In-memory collaborators for driving a full session

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use step_staker::{
    error::{Result, StakeError},
    notify::Notifier,
    oracle::{PriceOracle, SpotPrices},
    program::{discriminator, PriceChangeEvent, PriceEvent, ProgramEvent, StakingProgram},
    rpc::{BlockReference, ChainRpc, OwnedTokenAccount, SimulationOutcome},
    wallet::{SignerError, SubmitOptions, WalletSigner},
    SessionSettings, StakeSession, TokenAmount,
};
use tokio::sync::Notify;

pub const RENT: u64 = 2_039_280;
pub const LAST_VALID_BLOCK_HEIGHT: u64 = 1_000;
pub const CONTEXT_SLOT: u64 = 4_242;

pub fn amount(text: &str) -> TokenAmount {
    TokenAmount::parse(text).unwrap()
}

/// Logs of one successful invocation of `program_id` emitting `events`
pub fn program_logs(program_id: &Pubkey, events: &[ProgramEvent]) -> Vec<String> {
    let mut logs = vec![format!("Program {} invoke [1]", program_id)];
    for event in events {
        logs.push(format!("Program data: {}", event.to_log_payload()));
    }
    logs.push(format!("Program {} success", program_id));
    logs
}

pub fn price_event(e9: u64) -> ProgramEvent {
    ProgramEvent::Price(PriceEvent {
        step_per_xstep_e9: e9,
        step_per_xstep: TokenAmount::from_raw(e9).to_string(),
    })
}

pub fn price_change_event(old: u64, new: u64) -> ProgramEvent {
    ProgramEvent::PriceChange(PriceChangeEvent {
        old_step_per_xstep_e9: old,
        old_step_per_xstep: TokenAmount::from_raw(old).to_string(),
        new_step_per_xstep_e9: new,
        new_step_per_xstep: TokenAmount::from_raw(new).to_string(),
    })
}

pub fn is_emit_price(transaction: &Transaction) -> bool {
    transaction
        .message
        .instructions
        .last()
        .is_some_and(|ix| ix.data.starts_with(&discriminator("global", "emit_price")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmBehavior {
    Confirm,
    Expire,
    Hang,
}

#[derive(Debug)]
pub struct RpcState {
    pub emit_price: SimulationOutcome,
    pub exchange: SimulationOutcome,
    pub owned: HashMap<Pubkey, OwnedTokenAccount>,
    pub balances: HashMap<Pubkey, TokenAmount>,
    /// Accounts whose balance query errors
    pub unreadable: HashSet<Pubkey>,
    /// Accounts never registered with `own` are not yet visible
    pub hide_new_accounts: bool,
    pub confirm: ConfirmBehavior,
    pub fail_account_lookup: bool,
    pub simulated: Vec<Transaction>,
    pub confirmed: Vec<Signature>,
    pub balance_queries: Vec<Pubkey>,
    pub block_reference_calls: usize,
    pub rent_queries: usize,
}

#[derive(Clone)]
pub struct MockRpc {
    pub state: Arc<Mutex<RpcState>>,
}

impl MockRpc {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RpcState {
                emit_price: SimulationOutcome::default(),
                exchange: SimulationOutcome::default(),
                owned: HashMap::new(),
                balances: HashMap::new(),
                unreadable: HashSet::new(),
                hide_new_accounts: false,
                confirm: ConfirmBehavior::Confirm,
                fail_account_lookup: false,
                simulated: Vec::new(),
                confirmed: Vec::new(),
                balance_queries: Vec::new(),
                block_reference_calls: 0,
                rent_queries: 0,
            })),
        }
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut RpcState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    /// Give `owner` a token account for `mint`
    pub fn own(&self, mint: Pubkey, balance: &str) -> Pubkey {
        let address = Pubkey::new_unique();
        self.with(|state| {
            state.owned.insert(
                mint,
                OwnedTokenAccount {
                    address,
                    balance: amount(balance),
                },
            );
            state.balances.insert(address, amount(balance));
        });
        address
    }
}

impl ChainRpc for MockRpc {
    async fn latest_block_reference(&self) -> Result<BlockReference> {
        self.with(|state| state.block_reference_calls += 1);
        Ok(BlockReference {
            blockhash: Hash::new_unique(),
            last_valid_block_height: LAST_VALID_BLOCK_HEIGHT,
            context_slot: CONTEXT_SLOT,
        })
    }

    async fn simulate(&self, transaction: &Transaction) -> Result<SimulationOutcome> {
        Ok(self.with(|state| {
            state.simulated.push(transaction.clone());
            if is_emit_price(transaction) {
                state.emit_price.clone()
            } else {
                state.exchange.clone()
            }
        }))
    }

    async fn confirm(&self, signature: &Signature, _reference: &BlockReference) -> Result<()> {
        let behavior = self.with(|state| state.confirm);
        match behavior {
            ConfirmBehavior::Confirm => {
                self.with(|state| state.confirmed.push(*signature));
                Ok(())
            }
            ConfirmBehavior::Expire => Err(StakeError::ConfirmationTimeout(signature.to_string())),
            ConfirmBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    async fn token_account_balance(&self, account: &Pubkey) -> Result<TokenAmount> {
        self.with(|state| {
            state.balance_queries.push(*account);
            let hidden = state.hide_new_accounts && !state.balances.contains_key(account);
            if hidden || state.unreadable.contains(account) {
                return Err(StakeError::Rpc("could not find account".to_string()));
            }
            Ok(state.balances.get(account).copied().unwrap_or_default())
        })
    }

    async fn find_owned_token_account(&self, _owner: &Pubkey, mint: &Pubkey) -> Result<Option<OwnedTokenAccount>> {
        self.with(|state| {
            if state.fail_account_lookup {
                return Err(StakeError::Rpc("connection refused".to_string()));
            }
            Ok(state.owned.get(mint).copied())
        })
    }

    async fn minimum_balance_for_rent_exemption(&self, _size: usize) -> Result<u64> {
        self.with(|state| state.rent_queries += 1);
        Ok(RENT)
    }
}

/// Lets a test hold a submit inside the signer
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Clone)]
pub struct MockWallet {
    pub keypair: Arc<Keypair>,
    pub connected: bool,
    pub reject: Option<String>,
    pub gate: Option<Arc<Gate>>,
    pub submitted: Arc<Mutex<Vec<(Transaction, SubmitOptions)>>>,
}

impl MockWallet {
    pub fn new() -> Self {
        Self {
            keypair: Arc::new(Keypair::new()),
            connected: true,
            reject: None,
            gate: None,
            submitted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn submitted(&self) -> Vec<(Transaction, SubmitOptions)> {
        self.submitted.lock().unwrap().clone()
    }
}

impl WalletSigner for MockWallet {
    fn identity(&self) -> Option<Pubkey> {
        self.connected.then(|| self.keypair.pubkey())
    }

    async fn sign_and_submit(
        &self,
        mut transaction: Transaction,
        options: SubmitOptions,
    ) -> std::result::Result<Signature, SignerError> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if let Some(reason) = &self.reject {
            return Err(SignerError::Rejected(reason.clone()));
        }

        let blockhash = transaction.message.recent_blockhash;
        transaction.partial_sign(&[self.keypair.as_ref()], blockhash);
        let signature = transaction.signatures[0];
        self.submitted.lock().unwrap().push((transaction, options));
        Ok(signature)
    }
}

#[derive(Clone)]
pub struct MockOracle {
    pub prices: Option<(f64, f64)>,
    pub calls: Arc<Mutex<usize>>,
}

impl MockOracle {
    pub fn new(prices: Option<(f64, f64)>) -> Self {
        Self {
            prices,
            calls: Arc::new(Mutex::new(0)),
        }
    }
}

impl PriceOracle for MockOracle {
    async fn spot_prices(&self, _mint_a: &Pubkey, _mint_b: &Pubkey) -> Result<SpotPrices> {
        *self.calls.lock().unwrap() += 1;
        match self.prices {
            Some((a, b)) => Ok(SpotPrices {
                price_a: Some(a),
                price_b: Some(b),
            }),
            None => Err(StakeError::PriceOracleUnavailable("HTTP 429".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Success(String, String),
    Failure(String, String),
    Info(String, String),
}

#[derive(Clone, Default)]
pub struct MockNotifier {
    pub reports: Arc<Mutex<Vec<Report>>>,
}

impl MockNotifier {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }
}

impl Notifier for MockNotifier {
    fn success(&self, title: &str, detail: &str) {
        self.reports
            .lock()
            .unwrap()
            .push(Report::Success(title.to_string(), detail.to_string()));
    }

    fn failure(&self, title: &str, detail: &str) {
        self.reports
            .lock()
            .unwrap()
            .push(Report::Failure(title.to_string(), detail.to_string()));
    }

    fn info(&self, title: &str, detail: &str) {
        self.reports
            .lock()
            .unwrap()
            .push(Report::Info(title.to_string(), detail.to_string()));
    }
}

pub type TestSession = StakeSession<MockRpc, MockWallet, MockOracle, MockNotifier>;

pub struct Harness {
    pub program: StakingProgram,
    pub rpc: MockRpc,
    pub wallet: MockWallet,
    pub oracle: MockOracle,
    pub notifier: MockNotifier,
}

impl Harness {
    /// Rate 1.0 from `emit_price`, prices known, no token accounts yet
    pub fn new() -> Self {
        let program = StakingProgram::new(Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let rpc = MockRpc::new();
        let logs = program_logs(&program.program_id, &[price_event(1_000_000_000)]);
        rpc.with(|state| state.emit_price.logs = logs);

        Self {
            program,
            rpc,
            wallet: MockWallet::new(),
            oracle: MockOracle::new(Some((0.05, 0.06))),
            notifier: MockNotifier::default(),
        }
    }

    pub fn settings() -> SessionSettings {
        SessionSettings {
            commitment: CommitmentConfig::confirmed(),
            confirm_timeout: Duration::from_millis(200),
        }
    }

    pub fn session(&self) -> Result<TestSession> {
        StakeSession::new(
            self.program.clone(),
            self.rpc.clone(),
            self.wallet.clone(),
            self.oracle.clone(),
            self.notifier.clone(),
            Self::settings(),
        )
    }

    /// Session with accounts discovered and market loaded
    pub async fn open(&self) -> TestSession {
        let session = self.session().unwrap();
        session.initialize().await;
        session
    }
}
