//! STEP Staker CLI
//!
//! Stakes STEP into xSTEP (or back) from a local keypair.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use solana_client::nonblocking::rpc_client::RpcClient;
use step_staker::{
    config::Config,
    form::{FormState, Side, StakeDirection},
    notify::LogNotifier,
    oracle::GeckoTerminalOracle,
    rpc::SolanaRpc,
    wallet::{load_keypair, KeypairWallet},
    StakeSession,
};

#[derive(Parser)]
#[command(name = "step-staker")]
#[command(about = "Stake STEP into xSTEP and back")]
struct Cli {
    /// Defaults to `status`
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the exchange rate, USD prices and balances
    Status,
    /// Stake STEP for xSTEP
    Stake {
        /// STEP amount, e.g. 12.5
        amount: String,
    },
    /// Unstake xSTEP for STEP
    Unstake {
        /// xSTEP amount, e.g. 12.5
        amount: String,
    },
    /// Write the default mainnet config
    InitConfig {
        #[arg(default_value = "staker-config.toml")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Status);

    if let Commands::InitConfig { path } = &command {
        return Config::write_default(path);
    }

    // Load configuration
    let config = Config::load().unwrap_or_else(|err| {
        log::warn!("Failed to load config ({:#}), using default mainnet config", err);
        Config::default_mainnet()
    });

    log::info!("Connected to RPC: {}", config.rpc_url);
    log::info!("Staking program: {}", config.program_id);

    let commitment = config.commitment_config()?;
    let client = Arc::new(RpcClient::new_with_commitment(config.rpc_url.clone(), commitment));

    let keypair = load_keypair(&config.keypair_path)?;
    let session = StakeSession::new(
        config.program(),
        SolanaRpc::new(Arc::clone(&client), commitment),
        KeypairWallet::new(keypair, Arc::clone(&client)),
        GeckoTerminalOracle::new(config.price_oracle_url.clone()),
        LogNotifier,
        config.session_settings()?,
    )
    .context("Failed to open staking session")?;

    log::info!("Wallet: {}", session.owner());
    session.initialize().await;

    let submit = match command {
        Commands::Stake { amount } => Some((StakeDirection::Stake, amount)),
        Commands::Unstake { amount } => Some((StakeDirection::Unstake, amount)),
        Commands::Status | Commands::InitConfig { .. } => None,
    };

    match submit {
        None => print_status(&session, &config),
        Some((direction, amount)) => {
            let mut form = FormState::new(direction, config.labels(), config.bounds()?);
            form.apply_market(&session.market());
            form.edit(direction.input_side(), &amount);

            log::info!(
                "{} {} {} -> {} {}",
                direction.caption(direction.input_side()),
                form.text(direction.input_side()),
                config.labels().symbol(direction.input_side()),
                form.text(direction.output_side()),
                config.labels().symbol(direction.output_side()),
            );

            let Some(request) = form.submit() else {
                bail!("{}", form.submit_label());
            };
            session.handle_submit(&request).await?;
            print_status(&session, &config);
        }
    }

    session.teardown();
    Ok(())
}

fn print_status<R, W, O, N>(session: &StakeSession<R, W, O, N>, config: &Config)
where
    R: step_staker::rpc::ChainRpc,
    W: step_staker::wallet::WalletSigner,
    O: step_staker::oracle::PriceOracle,
    N: step_staker::notify::Notifier,
{
    let market = session.market();
    let labels = config.labels();

    match market.rate {
        Some(rate) => println!("1 {} = {} {}", labels.derivative_symbol, rate, labels.base_symbol),
        None => println!("1 {} = ? {}", labels.derivative_symbol, labels.base_symbol),
    }

    for side in [Side::Base, Side::Derivative] {
        let balance = market.balance(side).unwrap_or_default();
        let price = match side {
            Side::Base => market.usd_price_base,
            Side::Derivative => market.usd_price_derivative,
        };
        println!(
            "{:>6} balance {} (USD ${})",
            labels.symbol(side),
            balance,
            balance.usd_value(price)
        );
    }
}
