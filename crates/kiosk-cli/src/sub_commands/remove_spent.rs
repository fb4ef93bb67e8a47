use anyhow::Result;
use kiosk_wallet::Wallet;

pub async fn remove_spent(wallet: &Wallet) -> Result<()> {
    let result = wallet.remove_spent().await?;

    println!("Removed {} spent proofs, {} left", result.removed, result.total);
    Ok(())
}
