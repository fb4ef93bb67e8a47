use std::str::FromStr;

use anyhow::Result;
use clap::Args;
use kiosk_cashu::MintUrl;
use kiosk_wallet::Wallet;

#[derive(Args)]
pub struct CheckMintSubCommand {
    /// Mint url, the default mint when omitted
    #[arg(short, long)]
    mint_url: Option<String>,
}

pub async fn check_mint(wallet: &Wallet, sub_command_args: &CheckMintSubCommand) -> Result<()> {
    let mint_url = sub_command_args
        .mint_url
        .as_deref()
        .map(MintUrl::from_str)
        .transpose()?;

    let availability = wallet.check_mint(mint_url.as_ref()).await;
    println!("{}", serde_json::to_string_pretty(&availability)?);

    Ok(())
}
