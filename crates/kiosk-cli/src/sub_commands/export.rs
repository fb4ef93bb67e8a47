use anyhow::Result;
use clap::Args;
use kiosk_wallet::Wallet;

#[derive(Args)]
pub struct ExportSubCommand {
    /// Pretty print
    #[arg(short, long)]
    pretty: bool,
}

pub async fn export(wallet: &Wallet, sub_command_args: &ExportSubCommand) -> Result<()> {
    println!(
        "{}",
        wallet.ledger().export_proofs(sub_command_args.pretty).await
    );
    Ok(())
}
