//! Cashu token and payment request codecs
//!
//! Wire formats shared by the kiosk wallet: the restricted CBOR codec, the
//! NUT-00 bearer token envelopes, NUT-18 payment requests and the mint API
//! models the wallet exchanges with a mint.

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod amount;
pub mod cbor;
pub mod mint_url;
pub mod nuts;

pub use self::amount::{split_into_denominations, Amount};
pub use self::mint_url::MintUrl;
pub use self::nuts::nut00::{dedup_proofs, parse_token, serialize_token};
pub use self::nuts::nut18::{create_payment_request, parse_payment_request};
pub use self::nuts::*;
