mod api;
mod auth;
mod campaign;
mod mining;
mod proxy;
mod retry;
mod store;
mod wallet;

use anyhow::{Result, bail};
use campaign::{Campaign, DEFAULT_TASKS, Pacing};
use clap::{Parser, Subcommand};
use retry::RetryPolicy;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallet::Wallet;

#[derive(Parser)]
#[command(name = "stobix-bot", version, about = "Stobix campaign automation")]
struct Cli {
    /// Account records, one `address,private_key,referral_code` per line
    #[arg(long, default_value = "account.txt")]
    accounts_file: PathBuf,

    /// Key list, one `PRIVATE_KEY_<n>=<hex>` per line
    #[arg(long, default_value = "wallets.txt")]
    wallets_file: PathBuf,

    /// Proxy endpoints, one per line; entries without a scheme get http://
    #[arg(long, default_value = "proxies.txt")]
    proxies_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create wallets under a referral code, claim tasks and start mining
    Referral {
        /// Number of accounts to create
        #[arg(long)]
        count: usize,
        /// Referral code; falls back to the code file, then STOBIX_REFERRAL_CODE
        #[arg(long)]
        code: Option<String>,
        #[arg(long, default_value = "code.txt")]
        code_file: PathBuf,
        /// Skip the loyalty task list and only start mining
        #[arg(long)]
        mining_only: bool,
    },
    /// Start mining for every stored wallet
    Mine,
    /// Generate wallets offline and append them to the store
    Generate {
        #[arg(long)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Referral {
            count,
            ref code,
            ref code_file,
            mining_only,
        } => {
            if count == 0 {
                bail!("account count must be greater than zero");
            }
            let code = resolve_referral_code(code.as_deref(), code_file)?;
            let tasks = if mining_only {
                Vec::new()
            } else {
                DEFAULT_TASKS.iter().map(|t| t.to_string()).collect()
            };
            let campaign = Campaign {
                api_base: api::API_BASE.to_string(),
                site_base: api::SITE_BASE.to_string(),
                proxies: proxy::load_proxies(&cli.proxies_file),
                accounts_file: cli.accounts_file.clone(),
                wallets_file: cli.wallets_file.clone(),
                tasks,
                pacing: Pacing::referral(),
                retry: RetryPolicy::default(),
            };
            campaign.run_referral(&code, count).await?;
        }
        Command::Mine => {
            let keys = store::load_private_keys(
                &cli.wallets_file,
                &cli.accounts_file,
                std::env::vars(),
            );
            if keys.is_empty() {
                bail!(
                    "no private keys found in {}, {} or the environment",
                    cli.wallets_file.display(),
                    cli.accounts_file.display()
                );
            }
            info!("Total unique wallets to process: {}", keys.len());
            let campaign = Campaign {
                api_base: api::API_BASE.to_string(),
                site_base: api::SITE_BASE.to_string(),
                proxies: proxy::load_proxies(&cli.proxies_file),
                accounts_file: cli.accounts_file.clone(),
                wallets_file: cli.wallets_file.clone(),
                tasks: Vec::new(),
                pacing: Pacing::mining(),
                retry: RetryPolicy::default(),
            };
            campaign.run_mining(&keys).await;
        }
        Command::Generate { count } => {
            if count == 0 {
                bail!("account count must be greater than zero");
            }
            for i in 1..=count {
                let wallet = Wallet::generate();
                store::append_account(
                    &cli.accounts_file,
                    &store::AccountRecord {
                        address: wallet.address(),
                        private_key: wallet.private_key_hex(),
                        referral_code: String::new(),
                    },
                )?;
                store::append_wallet_key(&cli.wallets_file, &wallet.private_key_hex())?;
                info!("[{}/{}] Generated wallet {}", i, count, wallet.address());
            }
            info!(
                "Saved {} wallets to {} (keys mirrored to {})",
                count,
                cli.accounts_file.display(),
                cli.wallets_file.display()
            );
        }
    }
    Ok(())
}

fn resolve_referral_code(code: Option<&str>, code_file: &std::path::Path) -> Result<String> {
    if let Some(code) = code {
        let code = code.trim();
        if !code.is_empty() {
            return Ok(code.to_string());
        }
    }
    if let Ok(content) = std::fs::read_to_string(code_file) {
        let code = content.trim();
        if !code.is_empty() {
            info!("Loaded referral code: {}", code);
            return Ok(code.to_string());
        }
    }
    if let Ok(code) = std::env::var("STOBIX_REFERRAL_CODE") {
        let code = code.trim().to_string();
        if !code.is_empty() {
            return Ok(code);
        }
    }
    bail!(
        "no referral code: pass --code, fill {} or set STOBIX_REFERRAL_CODE",
        code_file.display()
    )
}
