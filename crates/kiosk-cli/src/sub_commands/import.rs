use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use kiosk_wallet::Wallet;

#[derive(Args)]
pub struct ImportSubCommand {
    /// JSON file holding a list of proofs or `{"proofs": [..]}`
    file: PathBuf,
}

pub async fn import(wallet: &Wallet, sub_command_args: &ImportSubCommand) -> Result<()> {
    let contents = fs::read_to_string(&sub_command_args.file)?;
    let result = wallet.ledger().import_proofs(contents).await?;

    println!("Imported {} proofs, {} held", result.added, result.total);
    Ok(())
}
