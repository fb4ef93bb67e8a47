//! Wallet errors

use std::fmt;

use kiosk_cashu::nuts::{nut00, nut02, nut18};
use kiosk_cashu::Amount;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Mint code for inputs that were already redeemed
pub const TOKEN_ALREADY_SPENT: u64 = 11001;

/// Coarse classification of an [`Error`]
///
/// Callers branch on this instead of matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed token or request text
    Format,
    /// Bad caller input
    Validation,
    /// Invariant broken while talking to the mint or the blinding engine
    Protocol,
    /// Ledger holds too little
    InsufficientFunds,
    /// Request or proofs belong to another mint
    MintMismatch,
    /// Mint reports the inputs as redeemed
    AlreadySpent,
    /// Request offers no transport the wallet can use
    NoTransport,
    /// Delivering a payment failed
    Transport,
    /// Mint rejected the operation
    Settlement,
    /// Network failure
    Http,
    /// Ledger persistence failed
    Storage,
}

/// Wallet Error
#[derive(Debug, Error)]
pub enum Error {
    /// Token envelope error
    #[error(transparent)]
    Token(#[from] nut00::Error),
    /// Payment request error
    #[error(transparent)]
    PaymentRequest(#[from] nut18::Error),
    /// Keyset resolution error
    #[error(transparent)]
    Keyset(#[from] nut02::Error),
    /// Amount error
    #[error(transparent)]
    Amount(#[from] kiosk_cashu::amount::Error),
    /// Mint url error
    #[error(transparent)]
    MintUrl(#[from] kiosk_cashu::mint_url::Error),
    /// Input is not something the wallet can act on
    #[error("{0}")]
    Validation(String),
    /// Blinding or mint protocol invariant violated
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// Not enough proofs to cover the payment
    #[error("Insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Amount the payment needs
        required: Amount,
        /// Amount selectable from the ledger
        available: Amount,
    },
    /// Selected proofs turned out spent and the rest does not cover the payment
    #[error("Some proofs were already spent, need {required}, have {available}. Refresh the wallet and try again")]
    InsufficientAfterCleanup {
        /// Amount the payment needs
        required: Amount,
        /// Amount selectable after removing spent proofs
        available: Amount,
    },
    /// Mint of the request or proofs differs from the wallet mint
    #[error("Mint mismatch: {0}")]
    MintMismatch(String),
    /// Inputs already redeemed, they have been removed from the ledger
    #[error("Proofs already spent: {0}")]
    AlreadySpent(String),
    /// No usable transport in the payment request
    #[error("Payment request has no supported transport")]
    NoTransport,
    /// Payment delivery failed
    #[error("Transport error: {0}")]
    Transport(String),
    /// Mint rejected the operation, message passed through
    #[error("{0}")]
    Settlement(String),
    /// Http error
    #[error("HTTP error ({status}): {1}", status = .0.map(|c| c.to_string()).unwrap_or_else(|| "no status".to_string()))]
    HttpError(Option<u16>, String),
    /// Reqwest error
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Url parse error
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Serde Json error
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
    /// Io error
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Config error
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Kind of the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Token(_) => ErrorKind::Format,
            Self::PaymentRequest(err) => match err {
                nut18::Error::MissingId | nut18::Error::InvalidAmount => ErrorKind::Validation,
                _ => ErrorKind::Format,
            },
            Self::Keyset(_) | Self::Protocol(_) => ErrorKind::Protocol,
            Self::Amount(_) | Self::MintUrl(_) | Self::Validation(_) | Self::Config(_) => {
                ErrorKind::Validation
            }
            Self::InsufficientFunds { .. } | Self::InsufficientAfterCleanup { .. } => {
                ErrorKind::InsufficientFunds
            }
            Self::MintMismatch(_) => ErrorKind::MintMismatch,
            Self::AlreadySpent(_) => ErrorKind::AlreadySpent,
            Self::NoTransport => ErrorKind::NoTransport,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Settlement(_) => ErrorKind::Settlement,
            Self::HttpError(..) | Self::Reqwest(_) | Self::Url(_) => ErrorKind::Http,
            Self::SerdeJsonError(_) => ErrorKind::Protocol,
            Self::Storage(_) | Self::Io(_) => ErrorKind::Storage,
        }
    }

    /// Mint saw the inputs as redeemed
    pub fn is_already_spent(&self) -> bool {
        match self {
            Self::AlreadySpent(_) => true,
            Self::HttpError(_, body) => ErrorResponse::from_body(body).is_already_spent(),
            _ => false,
        }
    }

    /// Error can be cleared by invoking the operation again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AlreadySpent | ErrorKind::Http | ErrorKind::Transport
        )
    }
}

/// Error body returned by a mint
///
/// See NUT definition in [00](https://github.com/cashubtc/nuts/blob/main/00.md)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error Code
    #[serde(default)]
    pub code: Option<u64>,
    /// Human readable description
    #[serde(default, alias = "error", alias = "message")]
    pub detail: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "code: {}, detail: {}", code, self.detail),
            None => write!(f, "{}", self.detail),
        }
    }
}

impl ErrorResponse {
    /// Error response from json
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(json)?;

        Self::from_value(value)
    }

    /// Error response from json Value
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match serde_json::from_value::<ErrorResponse>(value.clone()) {
            Ok(res) if !res.detail.is_empty() || res.code.is_some() => Ok(res),
            _ => Ok(Self {
                code: None,
                detail: value.to_string(),
            }),
        }
    }

    /// Error response if `body` is a json object with a `code` or `detail`
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<ErrorResponse>(body)
            .ok()
            .filter(|res| res.code.is_some() || !res.detail.is_empty())
    }

    /// Error response from a raw body, json or not
    pub fn from_body(body: &str) -> Self {
        Self::from_json(body).unwrap_or_else(|_| Self {
            code: None,
            detail: body.trim().to_string(),
        })
    }

    /// Mint says the inputs were already redeemed
    pub fn is_already_spent(&self) -> bool {
        if self.code == Some(TOKEN_ALREADY_SPENT) {
            return true;
        }
        let detail = self.detail.to_lowercase();
        detail.contains("already spent")
            || detail.contains("token already")
            || detail.contains("proofs already")
    }
}

impl From<ErrorResponse> for Error {
    fn from(err: ErrorResponse) -> Error {
        if err.is_already_spent() {
            Self::AlreadySpent(err.detail)
        } else {
            Self::Settlement(err.detail)
        }
    }
}
