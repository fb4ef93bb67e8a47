use anyhow::Result;
use clap::Args;
use kiosk_cashu::nuts::ProofsMethods;
use kiosk_cashu::parse_token;

#[derive(Args)]
pub struct DecodeTokenSubCommand {
    /// Cashu Token
    token: String,
    /// Print the proofs as well
    #[arg(short, long)]
    proofs: bool,
}

pub fn decode_token(sub_command_args: &DecodeTokenSubCommand) -> Result<()> {
    let token = parse_token(&sub_command_args.token)?;

    println!("Version: {}", token.version);
    println!("Unit: {}", token.unit.as_deref().unwrap_or("sat"));
    if let Some(memo) = &token.memo {
        println!("Memo: {memo}");
    }
    for entry in &token.entries {
        println!(
            "{}: {} ({} proofs)",
            entry.mint,
            entry.proofs.total_amount()?,
            entry.proofs.len()
        );
    }
    println!("Value: {}", token.value()?);

    if sub_command_args.proofs {
        println!("{}", serde_json::to_string_pretty(&token.proofs())?);
    }
    Ok(())
}
