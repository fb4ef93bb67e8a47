use anyhow::Result;
use kiosk_wallet::Wallet;

pub async fn balance(wallet: &Wallet) -> Result<()> {
    let holdings = wallet.ledger().holdings().await;

    for (i, holding) in holdings.iter().enumerate() {
        println!(
            "{i}: {} {} ({} proofs)",
            holding.mint_url, holding.amount, holding.count
        );
    }
    println!("Total: {}", wallet.total_balance().await);

    Ok(())
}
