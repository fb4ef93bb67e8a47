use anyhow::Result;
use clap::Args;
use kiosk_cashu::Amount;
use kiosk_wallet::transport::Delivery;
use kiosk_wallet::{SendOutcome, Wallet};

#[derive(Args)]
pub struct SendSubCommand {
    /// Payment request, bolt11 invoice or lightning address
    input: String,
    /// Amount for requests without one and for lightning addresses
    #[arg(short, long)]
    amount: Option<u64>,
}

pub async fn send(wallet: &Wallet, sub_command_args: &SendSubCommand) -> Result<()> {
    let amount = sub_command_args.amount.map(Amount::from);

    match wallet.send(&sub_command_args.input, amount).await? {
        SendOutcome::Delivered {
            amount,
            change,
            delivery,
        } => {
            match delivery {
                Delivery::HttpPost { url, status } => {
                    println!("Sent {amount} to {url} ({status})")
                }
                Delivery::Nostr { relay, event_id } => {
                    println!("Sent {amount} via {relay}, event {event_id}")
                }
            }
            println!("Change: {change}");
        }
        SendOutcome::Paid {
            quote,
            amount,
            fee_reserve,
            change,
            state,
            payment_preimage,
        } => {
            println!("Paid {amount} (fee reserve {fee_reserve}), quote {quote}");
            if let Some(state) = state {
                println!("State: {state}");
            }
            if let Some(preimage) = payment_preimage {
                println!("Preimage: {preimage}");
            }
            println!("Change: {change}");
        }
    }

    Ok(())
}
