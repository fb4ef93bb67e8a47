use anyhow::{bail, Result};
use clap::Args;
use kiosk_cashu::nuts::{PaymentRequestParams, Transport, TransportType};

#[derive(Args)]
pub struct CreateRequestSubCommand {
    /// Request id
    id: String,
    /// Amount, rounded to whole units
    amount: f64,
    /// Unit
    #[arg(short, long, default_value = "sat")]
    unit: String,
    /// Description
    #[arg(short, long)]
    description: Option<String>,
    /// Accepted mint, can be given more than once
    #[arg(short, long, action = clap::ArgAction::Append)]
    mint: Vec<String>,
    /// URL the payment is posted to
    #[arg(long)]
    http_url: Option<String>,
    /// Nostr profile (nprofile or npub) the payment is sent to
    #[arg(long)]
    nostr: Option<String>,
    /// Allow paying the request more than once
    #[arg(long)]
    multi_use: bool,
}

pub fn create_request(sub_command_args: &CreateRequestSubCommand) -> Result<()> {
    let mut transports = Vec::new();
    if let Some(nostr) = &sub_command_args.nostr {
        transports.push(
            Transport::builder()
                .transport_type(TransportType::Nostr)
                .target(nostr)
                .add_tag(vec!["n".to_string(), "17".to_string()])
                .build()?,
        );
    }
    if let Some(http_url) = &sub_command_args.http_url {
        transports.push(Transport::http_post(http_url));
    }
    if transports.is_empty() {
        bail!("At least one of --http-url or --nostr is required");
    }

    let request = kiosk_cashu::create_payment_request(PaymentRequestParams {
        id: sub_command_args.id.clone(),
        amount: sub_command_args.amount,
        unit: Some(sub_command_args.unit.clone()),
        single_use: Some(!sub_command_args.multi_use),
        mints: sub_command_args.mint.clone(),
        description: sub_command_args.description.clone(),
        transports,
    })?;

    println!("{request}");
    Ok(())
}
