//! NUT-00: Notation and Models
//!
//! <https://github.com/cashubtc/nuts/blob/main/00.md>

use std::collections::HashSet;
use std::string::FromUtf8Error;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Amount;

pub mod token;

pub use token::{parse_token, serialize_token, ParsedToken, TokenEntry, TokenVersion};

/// List of [Proof]
pub type Proofs = Vec<Proof>;

/// NUT00 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Text does not look like a token
    #[error("Invalid e-cash token format")]
    InvalidTokenFormat,
    /// Version flag other than A or B
    #[error("Unsupported token version: {0}")]
    UnsupportedVersion(char),
    /// Prefix with nothing after it
    #[error("Token payload is missing")]
    MissingPayload,
    /// Decoded payload has the wrong shape
    #[error("Invalid token payload")]
    InvalidPayload,
    /// Token serialization needs at least one proof
    #[error("Proofs required in token")]
    ProofsRequired,
    /// Serde Json error
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
    /// Utf8 parse error
    #[error(transparent)]
    Utf8ParseError(#[from] FromUtf8Error),
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
}

/// DLEQ proof carried by a [Proof]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofDleq {
    /// e
    pub e: String,
    /// s
    pub s: String,
    /// Blinding factor
    pub r: String,
}

/// Bearer proof
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Proof {
    /// Amount
    pub amount: Amount,
    /// Secret message
    pub secret: String,
    /// Unblinded signature, hex
    #[serde(rename = "C")]
    pub c: String,
    /// `Keyset id`
    #[serde(rename = "id")]
    pub keyset_id: String,
    /// Mint that issued the proof
    #[serde(
        rename = "mintUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub mint_url: Option<String>,
    /// DLEQ Proof
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dleq: Option<ProofDleq>,
}

impl Proof {
    /// Create new [`Proof`]
    pub fn new(amount: Amount, keyset_id: String, secret: String, c: String) -> Self {
        Proof {
            amount,
            secret,
            c,
            keyset_id,
            mint_url: None,
            dleq: None,
        }
    }

    /// Proof with `mint_url` set
    pub fn with_mint_url(mut self, mint_url: impl Into<String>) -> Self {
        self.mint_url = Some(mint_url.into());
        self
    }

    /// Amount is positive and secret is present
    pub fn is_valid(&self) -> bool {
        self.amount > Amount::ZERO && !self.secret.is_empty()
    }

    /// True if both proofs are the same bearer unit
    ///
    /// Proofs are identified by secret, proofs without one compare on every field.
    pub fn same_as(&self, other: &Proof) -> bool {
        if self.secret.is_empty() || other.secret.is_empty() {
            self == other
        } else {
            self.secret == other.secret
        }
    }
}

/// Utility methods for [Proofs]
pub trait ProofsMethods {
    /// Try to sum up the amounts of all [Proof]s
    fn total_amount(&self) -> Result<Amount, Error>;

    /// Copy of the proofs without the `mintUrl` field
    fn without_mint_url(&self) -> Proofs;
}

impl ProofsMethods for Proofs {
    fn total_amount(&self) -> Result<Amount, Error> {
        total_amount(self.iter())
    }

    fn without_mint_url(&self) -> Proofs {
        self.iter()
            .cloned()
            .map(|mut p| {
                p.mint_url = None;
                p
            })
            .collect()
    }
}

impl ProofsMethods for [Proof] {
    fn total_amount(&self) -> Result<Amount, Error> {
        total_amount(self.iter())
    }

    fn without_mint_url(&self) -> Proofs {
        self.to_vec().without_mint_url()
    }
}

fn total_amount<'a, I: Iterator<Item = &'a Proof>>(proofs: I) -> Result<Amount, Error> {
    Ok(Amount::try_sum(proofs.map(|p| p.amount))?)
}

/// Remove duplicates keeping the first occurrence and the original order
pub fn dedup_proofs(proofs: Proofs) -> Proofs {
    let mut seen_secrets: HashSet<String> = HashSet::new();
    let mut result: Proofs = Vec::with_capacity(proofs.len());

    for proof in proofs {
        if proof.secret.is_empty() {
            if !result.iter().any(|p| p == &proof) {
                result.push(proof);
            }
        } else if seen_secrets.insert(proof.secret.clone()) {
            result.push(proof);
        }
    }

    result
}

/// Blinded Message (also called `output`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlindedMessage {
    /// Amount
    pub amount: Amount,
    /// Keyset ID
    #[serde(rename = "id")]
    pub keyset_id: String,
    /// Blinded secret message (B_), hex
    #[serde(rename = "B_")]
    pub blinded_secret: String,
}

/// DLEQ proof returned alongside a [BlindSignature]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlindSignatureDleq {
    /// e
    pub e: String,
    /// s
    pub s: String,
}

/// Blind Signature (also called `promise`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlindSignature {
    /// Amount
    pub amount: Amount,
    /// Keyset ID
    #[serde(rename = "id", default)]
    pub keyset_id: String,
    /// Blinded signature (C_), hex
    #[serde(rename = "C_")]
    pub c: String,
    /// DLEQ Proof
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dleq: Option<BlindSignatureDleq>,
}
