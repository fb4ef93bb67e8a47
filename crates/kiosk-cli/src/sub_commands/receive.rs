use anyhow::Result;
use clap::Args;
use kiosk_wallet::Wallet;

#[derive(Args)]
pub struct ReceiveSubCommand {
    /// Cashu Token
    token: String,
}

pub async fn receive(wallet: &Wallet, sub_command_args: &ReceiveSubCommand) -> Result<()> {
    let before = wallet.total_balance().await;
    let result = wallet.receive(&sub_command_args.token).await?;
    let after = wallet.total_balance().await;

    let received = after.checked_sub(before).unwrap_or_default();
    println!("Received: {received} ({} new proofs)", result.added);

    Ok(())
}
