use std::str::FromStr;

use anyhow::Result;
use clap::Args;
use kiosk_cashu::nuts::PaymentRequest;

#[derive(Args)]
pub struct DecodePaymentRequestSubCommand {
    /// Payment request
    payment_request: String,
}

pub fn decode_payment_request(sub_command_args: &DecodePaymentRequestSubCommand) -> Result<()> {
    let payment_request = PaymentRequest::from_str(&sub_command_args.payment_request)?;

    println!("{}", serde_json::to_string_pretty(&payment_request)?);
    Ok(())
}
