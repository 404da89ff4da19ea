//! mintdesk CLI
//!
//! Configure a token, deploy it from the connected wallet, check balances
//! and transfer to recipients. State lives in the client store between
//! invocations.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mintdesk::{
    balance::get_token_balance,
    config::{Config, DEFAULT_CONFIG_PATH},
    metrics,
    recipients::RecentRecipients,
    storage::{keys, ClientStore},
    token::MetadataAttribute,
    wallet::ProviderRegistry,
    DeploymentOrchestrator, DeploymentResult, DeploySettings, Network, NetworkGateway, Pubkey,
    Session, TokenConfig, TokenMetadataDraft, TransferExecutor, TransferRequest,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Network to use (overrides the configured default)
    #[arg(short, long)]
    network: Option<Network>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print Prometheus metrics after the command
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect a wallet, or restore the stored one
    Connect {
        /// Derive a local wallet from this BIP-39 phrase
        #[arg(long, env = "MINTDESK_SEED_PHRASE", hide_env_values = true)]
        seed_phrase: Option<String>,
    },
    /// Forget the stored wallet identity
    Disconnect,
    /// Validate and save the token configuration
    Configure {
        #[arg(long)]
        name: String,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        supply: u64,
        #[arg(long, default_value_t = 9)]
        decimals: u8,
    },
    /// Validate and save descriptive metadata (kept off-chain)
    Describe {
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "")]
        url: String,
        /// Attribute as `trait=value`; repeatable
        #[arg(long = "attr")]
        attributes: Vec<String>,
    },
    /// Deploy the saved token configuration
    Deploy,
    /// Show the wallet's balance of a mint (defaults to the deployed one)
    Balance {
        #[arg(long)]
        mint: Option<String>,
    },
    /// Transfer tokens to a recipient
    Transfer {
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        mint: Option<String>,
    },
    /// Wallet, deployment and balance summary
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    init_logging(args.verbose, config.logging.json)?;

    let network = args.network.unwrap_or(config.network.default);
    info!(network = %network, store = %config.storage.path, "mintdesk {}", env!("CARGO_PKG_VERSION"));

    let store = ClientStore::open(&config.storage.path)
        .with_context(|| format!("Failed to open client store at {}", config.storage.path))?;
    let gateway = Arc::new(NetworkGateway::new(config.endpoint_resolver()));
    let session = Session::new(store, gateway, ProviderRegistry::new());

    let outcome = run(&session, &config, network, args.command).await;

    if let Err(e) = session.store().flush() {
        warn!(error = %e, "Failed to flush client store");
    }
    if args.print_metrics {
        match metrics::metrics().map(|m| m.render()) {
            Some(Ok(text)) => print!("{}", text),
            Some(Err(e)) => warn!(error = %e, "Failed to render metrics"),
            None => warn!("Metrics unavailable"),
        }
    }
    outcome
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "mintdesk=debug,info"
    } else {
        "mintdesk=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    }
    .context("Failed to install tracing subscriber")
}

async fn run(session: &Session, config: &Config, network: Network, command: Command) -> Result<()> {
    match command {
        Command::Connect { seed_phrase } => {
            if seed_phrase.is_none() {
                if let Some(wallet) = session.restore()? {
                    println!("Restored {} wallet {}", wallet.kind(), wallet.pubkey());
                    return Ok(());
                }
            }
            let outcome = session.connect(seed_phrase.as_deref()).await?;
            println!("Connected {} wallet {}", outcome.wallet.kind(), outcome.wallet.pubkey());
            if let Some(phrase) = outcome.recovery_phrase {
                println!("Recovery phrase (shown once, store it safely):");
                println!("  {}", phrase.as_str());
            }
        }

        Command::Disconnect => {
            session.disconnect()?;
            println!("Wallet disconnected");
        }

        Command::Configure {
            name,
            symbol,
            supply,
            decimals,
        } => {
            let token = TokenConfig {
                name,
                symbol,
                initial_supply: supply,
                decimals,
            };
            token.validate()?;
            session.store().set(keys::TOKEN_CONFIG, &token)?;
            println!("Saved configuration for {} ({})", token.name, token.symbol);
        }

        Command::Describe {
            description,
            url,
            attributes,
        } => {
            let mut draft = TokenMetadataDraft {
                description,
                external_url: url,
                attributes: Vec::new(),
            };
            for raw in &attributes {
                let Some((trait_type, value)) = raw.split_once('=') else {
                    bail!("Attribute '{}' must look like trait=value", raw);
                };
                let index = draft.add_attribute();
                draft.update_attribute(
                    index,
                    MetadataAttribute {
                        trait_type: trait_type.trim().to_string(),
                        value: value.trim().to_string(),
                    },
                );
            }
            draft.validate()?;
            session.store().set(keys::TOKEN_METADATA, &draft)?;
            println!("Saved metadata with {} attributes", draft.attributes.len());
        }

        Command::Deploy => {
            let token: TokenConfig = session
                .store()
                .get(keys::TOKEN_CONFIG)?
                .context("No token configuration saved; run `mintdesk configure` first")?;
            let metadata: Option<TokenMetadataDraft> = session.store().get(keys::TOKEN_METADATA)?;

            let orchestrator = DeploymentOrchestrator::new(DeploySettings::from(&config.deploy));
            let result = orchestrator
                .deploy(session, &token, metadata.as_ref(), network)
                .await
                .map_err(|e| {
                    warn!(category = e.category(), error = %e, "Deployment failed");
                    e
                })?;
            print_deployment(&result);
            if !result.is_fully_minted() {
                println!("Initial supply was not minted; the mint exists without supply");
            }
        }

        Command::Balance { mint } => {
            let mint = resolve_mint(session, mint.as_deref())?;
            let balance = get_token_balance(session, network, &mint).await;
            println!("{} (mint {})", balance, mint);
        }

        Command::Transfer { to, amount, mint } => {
            let mint = resolve_mint(session, mint.as_deref())?;
            let balance = get_token_balance(session, network, &mint).await;
            let request = TransferRequest {
                recipient: to,
                amount,
                mint: Some(mint.to_string()),
            };
            let result = TransferExecutor::from(&config.deploy)
                .transfer(session, network, &request, &balance)
                .await?;
            println!(
                "Sent {} to {} (transaction {})",
                result.amount, result.recipient, result.signature
            );
        }

        Command::Status => {
            match session.wallet() {
                Ok(wallet) => println!("Wallet: {} ({})", wallet.pubkey(), wallet.kind()),
                Err(_) => println!("Wallet: not connected"),
            }

            let deployment: Option<DeploymentResult> = session.store().get(keys::DEPLOYMENT_RESULT)?;
            match deployment {
                Some(result) => {
                    print_deployment(&result);
                    if let Ok(mint) = Pubkey::from_str(&result.mint_address) {
                        let balance = get_token_balance(session, result.network, &mint).await;
                        println!("Balance: {} {}", balance, result.token_symbol);
                    }
                }
                None => println!("No token deployed yet"),
            }

            let recent = RecentRecipients::load(session.store())?;
            for entry in recent.entries() {
                println!(
                    "Recent: {} {} (last used {})",
                    entry.label,
                    entry.address,
                    entry.last_used.to_rfc3339()
                );
            }
        }
    }
    Ok(())
}

/// Explicit `--mint`, else the stored deployment's mint
fn resolve_mint(session: &Session, explicit: Option<&str>) -> Result<Pubkey> {
    let address = match explicit {
        Some(address) => address.to_string(),
        None => {
            let deployed: DeploymentResult = session
                .store()
                .get(keys::DEPLOYMENT_RESULT)?
                .context("No mint given and no token deployed yet")?;
            deployed.mint_address
        }
    };
    Pubkey::from_str(address.trim()).with_context(|| format!("Invalid mint address '{}'", address))
}

fn print_deployment(result: &DeploymentResult) {
    println!("Token:    {} ({})", result.token_name, result.token_symbol);
    println!("Mint:     {}", result.mint_address);
    println!("Supply:   {} (decimals {})", result.initial_supply, result.decimals);
    println!("Network:  {}", result.network);
    println!("Deployed: {}", result.deploy_time.to_rfc3339());
    println!("Create tx: {}", result.create_tx_id);
    println!("Mint tx:   {}", result.mint_tx_id);
    println!("Explorer: {}", result.explorer_url());
}
