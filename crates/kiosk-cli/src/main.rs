//! Kiosk wallet command line

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kiosk_wallet::config::Settings;
use kiosk_wallet::Wallet;
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod sub_commands;

/// Cashu wallet for paying kiosk payment requests
#[derive(Parser)]
#[command(name = "kiosk-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to working dir
    #[arg(short, long)]
    work_dir: Option<PathBuf>,
    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Logging level
    #[arg(short, long, default_value = "error")]
    log_level: Level,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Balance per mint
    Balance,
    /// Receive token
    Receive(sub_commands::receive::ReceiveSubCommand),
    /// Pay a payment request, bolt11 invoice or lightning address
    Send(sub_commands::send::SendSubCommand),
    /// Print the proofs as JSON
    Export(sub_commands::export::ExportSubCommand),
    /// Import proofs from a JSON file
    Import(sub_commands::import::ImportSubCommand),
    /// Create a payment request
    CreateRequest(sub_commands::create_request::CreateRequestSubCommand),
    /// Decode a payment request
    DecodeRequest(sub_commands::decode_request::DecodePaymentRequestSubCommand),
    /// Decode a token
    DecodeToken(sub_commands::decode_token::DecodeTokenSubCommand),
    /// Check whether a mint is reachable
    CheckMint(sub_commands::check_mint::CheckMintSubCommand),
    /// Set the default mint
    SetMint(sub_commands::set_mint::SetMintSubCommand),
    /// Drop proofs the mints report as spent
    RemoveSpent,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Cli = Cli::parse();
    let default_filter = args.log_level;

    let hyper_filter = "hyper=warn";
    let reqwest_filter = "reqwest=warn";
    let rustls_filter = "rustls=warn";
    let relay_filter = "nostr_relay_pool=error";

    let env_filter = EnvFilter::new(format!(
        "{default_filter},{hyper_filter},{reqwest_filter},{rustls_filter},{relay_filter}"
    ));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // Commands that never touch the ledger
    match &args.command {
        Commands::DecodeToken(sub_command_args) => {
            return sub_commands::decode_token::decode_token(sub_command_args);
        }
        Commands::DecodeRequest(sub_command_args) => {
            return sub_commands::decode_request::decode_payment_request(sub_command_args);
        }
        Commands::CreateRequest(sub_command_args) => {
            return sub_commands::create_request::create_request(sub_command_args);
        }
        _ => (),
    }

    let mut settings = Settings::new(args.config.clone());
    if let Some(work_dir) = &args.work_dir {
        settings.work_dir = Some(work_dir.clone());
    }

    let wallet = Wallet::from_settings(&settings).await?;

    match &args.command {
        Commands::Balance => sub_commands::balance::balance(&wallet).await,
        Commands::Receive(sub_command_args) => {
            sub_commands::receive::receive(&wallet, sub_command_args).await
        }
        Commands::Send(sub_command_args) => {
            sub_commands::send::send(&wallet, sub_command_args).await
        }
        Commands::Export(sub_command_args) => {
            sub_commands::export::export(&wallet, sub_command_args).await
        }
        Commands::Import(sub_command_args) => {
            sub_commands::import::import(&wallet, sub_command_args).await
        }
        Commands::CheckMint(sub_command_args) => {
            sub_commands::check_mint::check_mint(&wallet, sub_command_args).await
        }
        Commands::SetMint(sub_command_args) => {
            sub_commands::set_mint::set_mint(&wallet, sub_command_args).await
        }
        Commands::RemoveSpent => sub_commands::remove_spent::remove_spent(&wallet).await,
        Commands::DecodeToken(_) | Commands::DecodeRequest(_) | Commands::CreateRequest(_) => {
            Ok(())
        }
    }
}
