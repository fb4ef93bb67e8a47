//! Nuts
//!
//! See all at <https://github.com/cashubtc/nuts>

pub mod nut00;
pub mod nut02;
pub mod nut03;
pub mod nut05;
pub mod nut06;
pub mod nut07;
pub mod nut18;

pub use nut00::{
    BlindSignature, BlindSignatureDleq, BlindedMessage, ParsedToken, Proof, ProofDleq, Proofs,
    ProofsMethods, TokenEntry, TokenVersion,
};
pub use nut02::{Keyset, MintKeys};
pub use nut03::{SwapRequest, SwapResponse};
pub use nut05::{MeltQuoteBolt11Request, MeltQuoteBolt11Response, MeltRequest, MeltResponse};
pub use nut06::MintInfo;
pub use nut07::{CheckStateRequest, CheckStateResponse, State};
pub use nut18::{
    PaymentRequest, PaymentRequestParams, PaymentRequestPayload, Transport, TransportType,
};
