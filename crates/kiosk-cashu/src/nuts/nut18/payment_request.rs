//! NUT-18: Payment Requests
//!
//! <https://github.com/cashubtc/nuts/blob/main/18.md>

use std::fmt;
use std::str::FromStr;

use bitcoin::base64::engine::general_purpose;
use bitcoin::base64::Engine;
use serde::{Deserialize, Serialize};

use super::{Error, Transport};
use crate::cbor::{self, Value};
use crate::nuts::nut00::token::decode_base64;
use crate::nuts::Proofs;
use crate::Amount;

const PAYMENT_REQUEST_PREFIX: &str = "creqA";

/// Payment Request
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// `Payment id`
    #[serde(rename = "i")]
    pub payment_id: Option<String>,
    /// Amount
    #[serde(rename = "a")]
    pub amount: Option<Amount>,
    /// Unit
    #[serde(rename = "u")]
    pub unit: Option<String>,
    /// Single use
    #[serde(rename = "s")]
    pub single_use: Option<bool>,
    /// Mints
    #[serde(rename = "m")]
    pub mints: Option<Vec<String>>,
    /// Description
    #[serde(rename = "d")]
    pub description: Option<String>,
    /// Transport
    #[serde(rename = "t")]
    #[serde(skip_serializing_if = "Vec::is_empty", default = "Vec::default")]
    pub transports: Vec<Transport>,
}

impl PaymentRequest {
    /// Create a new PaymentRequestBuilder
    pub fn builder() -> PaymentRequestBuilder {
        PaymentRequestBuilder::default()
    }

    /// Encode as `creqA` text
    pub fn encode(&self) -> Result<String, Error> {
        let data = cbor::encode(&self.to_cbor())?;
        let encoded = general_purpose::URL_SAFE.encode(data);
        Ok(format!("{PAYMENT_REQUEST_PREFIX}{encoded}"))
    }

    fn to_cbor(&self) -> Value {
        let mut entries: Vec<(String, Value)> = Vec::new();
        if let Some(id) = &self.payment_id {
            entries.push(("i".to_string(), Value::from(id.as_str())));
        }
        if let Some(amount) = self.amount {
            entries.push(("a".to_string(), Value::from(amount.to_u64())));
        }
        if let Some(unit) = &self.unit {
            entries.push(("u".to_string(), Value::from(unit.as_str())));
        }
        if let Some(single_use) = self.single_use {
            entries.push(("s".to_string(), Value::from(single_use)));
        }
        if let Some(mints) = &self.mints {
            let mints = mints.iter().map(|m| Value::from(m.as_str())).collect();
            entries.push(("m".to_string(), Value::Array(mints)));
        }
        if let Some(description) = &self.description {
            entries.push(("d".to_string(), Value::from(description.as_str())));
        }
        if !self.transports.is_empty() {
            let transports = self.transports.iter().map(Transport::to_cbor).collect();
            entries.push(("t".to_string(), Value::Array(transports)));
        }
        Value::Map(entries)
    }

    fn from_cbor(value: &Value) -> Result<Self, Error> {
        if !matches!(value, Value::Map(_)) {
            return Err(Error::InvalidPayload);
        }

        let amount = value.get("a").and_then(|a| match a {
            Value::Text(_) | Value::Bytes(_) => decoded_text(a).and_then(|s| s.trim().parse().ok()),
            _ => a.as_u64(),
        });

        let mints = value.get("m").and_then(Value::as_array).map(|mints| {
            mints
                .iter()
                .filter_map(decoded_text)
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect()
        });

        let transports = value
            .get("t")
            .and_then(Value::as_array)
            .map(|transports| {
                transports
                    .iter()
                    .filter_map(|t| match Transport::from_cbor(t) {
                        Ok(transport) => Some(transport),
                        Err(err) => {
                            tracing::debug!("Skipping payment request transport: {}", err);
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            payment_id: value.get("i").and_then(decoded_text),
            amount: amount.map(Amount::from),
            unit: value.get("u").and_then(decoded_text),
            single_use: value.get("s").and_then(Value::as_bool),
            mints,
            description: value.get("d").and_then(decoded_text),
            transports,
        })
    }

    /// First transport of the given type
    pub fn transport(&self, transport_type: super::TransportType) -> Option<&Transport> {
        self.transports.iter().find(|t| t._type == transport_type)
    }
}

impl fmt::Display for PaymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.encode().map_err(|_| fmt::Error)?;
        write!(f, "{encoded}")
    }
}

impl FromStr for PaymentRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_payment_request(s)
    }
}

/// Text of a string or byte string value, with one pass of UTF-8 repair
///
/// Some producers encode already-encoded UTF-8 a second time, which shows up
/// as Latin-1 code points. When every code point fits a byte and those bytes
/// form valid UTF-8, the re-decoded string is returned.
pub(crate) fn decoded_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Text(s) => s.clone(),
        Value::Bytes(b) => String::from_utf8(b.clone()).ok()?,
        _ => return None,
    };
    Some(redecode_utf8(text))
}

fn redecode_utf8(text: String) -> String {
    if text.is_ascii() || text.chars().any(|c| c as u32 > 0xff) {
        return text;
    }
    let bytes: Vec<u8> = text.chars().map(|c| c as u32 as u8).collect();
    String::from_utf8(bytes).unwrap_or(text)
}

/// Parse `creqA` text
pub fn parse_payment_request(text: &str) -> Result<PaymentRequest, Error> {
    let text = text.trim();
    let prefix_len = PAYMENT_REQUEST_PREFIX.len();
    if text.len() < prefix_len
        || !text.is_char_boundary(prefix_len)
        || !text[..prefix_len].eq_ignore_ascii_case(PAYMENT_REQUEST_PREFIX)
    {
        return Err(Error::InvalidPrefix);
    }

    let decoded = decode_base64(&text[prefix_len..])?;
    PaymentRequest::from_cbor(&cbor::decode(&decoded)?)
}

/// Caller input for [`create_payment_request`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentRequestParams {
    /// Request id, required
    pub id: String,
    /// Amount, rounded to the nearest non-negative integer
    pub amount: f64,
    /// Unit, defaults to `sat`
    pub unit: Option<String>,
    /// Single use, defaults to `true`
    pub single_use: Option<bool>,
    /// Accepted mints
    pub mints: Vec<String>,
    /// Description
    pub description: Option<String>,
    /// Transports
    pub transports: Vec<Transport>,
}

/// Validate `params` and encode them as `creqA` text
pub fn create_payment_request(params: PaymentRequestParams) -> Result<String, Error> {
    let id = params.id.trim();
    if id.is_empty() {
        return Err(Error::MissingId);
    }

    let amount = Amount::from_rounded(params.amount)?;
    if amount == Amount::ZERO {
        return Err(Error::InvalidAmount);
    }

    let mints: Vec<String> = params
        .mints
        .iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();

    let mut builder = PaymentRequest::builder()
        .payment_id(id)
        .amount(amount)
        .unit(params.unit.unwrap_or_else(|| "sat".to_string()))
        .single_use(params.single_use.unwrap_or(true))
        .transports(params.transports);
    if !mints.is_empty() {
        builder = builder.mints(mints);
    }
    if let Some(description) = params.description {
        builder = builder.description(description);
    }

    builder.build().encode()
}

/// Builder for PaymentRequest
#[derive(Debug, Default, Clone)]
pub struct PaymentRequestBuilder {
    payment_id: Option<String>,
    amount: Option<Amount>,
    unit: Option<String>,
    single_use: Option<bool>,
    mints: Option<Vec<String>>,
    description: Option<String>,
    transports: Vec<Transport>,
}

impl PaymentRequestBuilder {
    /// Set payment ID
    pub fn payment_id<S>(mut self, payment_id: S) -> Self
    where
        S: Into<String>,
    {
        self.payment_id = Some(payment_id.into());
        self
    }

    /// Set amount
    pub fn amount<A>(mut self, amount: A) -> Self
    where
        A: Into<Amount>,
    {
        self.amount = Some(amount.into());
        self
    }

    /// Set unit
    pub fn unit<S: Into<String>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set single use flag
    pub fn single_use(mut self, single_use: bool) -> Self {
        self.single_use = Some(single_use);
        self
    }

    /// Add a mint URL
    pub fn add_mint<S: Into<String>>(mut self, mint_url: S) -> Self {
        self.mints.get_or_insert_with(Vec::new).push(mint_url.into());
        self
    }

    /// Set mints
    pub fn mints(mut self, mints: Vec<String>) -> Self {
        self.mints = Some(mints);
        self
    }

    /// Set description
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a transport
    pub fn add_transport(mut self, transport: Transport) -> Self {
        self.transports.push(transport);
        self
    }

    /// Set transports
    pub fn transports(mut self, transports: Vec<Transport>) -> Self {
        self.transports = transports;
        self
    }

    /// Build the PaymentRequest
    pub fn build(self) -> PaymentRequest {
        PaymentRequest {
            payment_id: self.payment_id,
            amount: self.amount,
            unit: self.unit,
            single_use: self.single_use,
            mints: self.mints,
            description: self.description,
            transports: self.transports,
        }
    }
}

/// Payment sent to the request's transport
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequestPayload {
    /// Id
    pub id: Option<String>,
    /// Amount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    /// Memo
    pub memo: Option<String>,
    /// Mint
    pub mint: String,
    /// Unit
    pub unit: String,
    /// Proofs
    pub proofs: Proofs,
}
