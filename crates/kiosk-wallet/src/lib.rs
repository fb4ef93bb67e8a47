//! Kiosk e-cash wallet
//!
//! Holds cashu proofs for a shop kiosk and spends them: NUT-18 payment
//! requests are settled with a swap and delivered over http or nostr,
//! lightning invoices and addresses are paid with a melt.

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod blinding;
mod builder;
pub mod check;
pub mod config;
pub mod error;
pub mod input;
pub mod ledger;
pub mod lightning_address;
pub mod mint_connector;
pub mod settle;
pub mod store;
pub mod transport;

mod test_utils;

pub use self::builder::WalletBuilder;
pub use self::error::{Error, ErrorKind};
pub use self::ledger::ProofLedger;
pub use self::settle::{SendOutcome, Wallet};
