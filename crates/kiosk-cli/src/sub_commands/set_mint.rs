use anyhow::Result;
use clap::Args;
use kiosk_wallet::Wallet;

#[derive(Args)]
pub struct SetMintSubCommand {
    /// New default mint url
    mint_url: String,
}

pub async fn set_mint(wallet: &Wallet, sub_command_args: &SetMintSubCommand) -> Result<()> {
    let old_mint_url = wallet.mint_url().await;
    let new_mint_url = wallet
        .ledger()
        .set_mint_url(&sub_command_args.mint_url)
        .await?;

    println!("Mint Url changed from {old_mint_url} to {new_mint_url}");
    Ok(())
}
