//! Error types for NUT-18: Payment Requests

use thiserror::Error;

/// NUT18 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid Prefix
    #[error("Invalid Prefix")]
    InvalidPrefix,
    /// Decoded payload is not a map
    #[error("Invalid payment request payload")]
    InvalidPayload,
    /// Request id is required when creating a request
    #[error("Payment request id is required")]
    MissingId,
    /// Amount rounds to zero
    #[error("Payment request amount must be positive")]
    InvalidAmount,
    /// Transport type other than `post` or `nostr`
    #[error("Unknown transport type: {0}")]
    UnknownTransport(String),
    /// Transport builder missing a field
    #[error("Transport {0} is required")]
    IncompleteTransport(&'static str),
    /// Base64 error
    #[error(transparent)]
    Base64Error(#[from] bitcoin::base64::DecodeError),
    /// CBOR decode error
    #[error(transparent)]
    CborDecode(#[from] crate::cbor::DecodeError),
    /// CBOR encode error
    #[error(transparent)]
    CborEncode(#[from] crate::cbor::EncodeError),
    /// Amount Error
    #[error(transparent)]
    Amount(#[from] crate::amount::Error),
    /// Token envelope error
    #[error(transparent)]
    NUT00(#[from] crate::nuts::nut00::Error),
}
