//! Lightning address resolution
//!
//! Turns a lightning address or LNURL plus an amount into a BOLT11 invoice
//! that the melt path can pay.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::bech32;
use kiosk_cashu::Amount;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ErrorResponse;
use crate::input::normalize_bolt11;
use crate::Error;

/// Resolves an address to an invoice for `amount` sats
#[async_trait]
pub trait LightningAddressResolver: Debug + Send + Sync {
    /// BOLT11 invoice paying `amount` to `address`
    async fn resolve(&self, address: &str, amount: Amount) -> Result<String, Error>;
}

#[derive(Debug, Serialize)]
struct QuoteRequest<'a> {
    address: &'a str,
    amount: Amount,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default, alias = "invoice", alias = "pr")]
    request: Option<String>,
}

/// Asks the shop backend to quote an invoice
#[derive(Debug, Clone)]
pub struct BackendQuoteResolver {
    client: Client,
    backend_url: Url,
}

impl BackendQuoteResolver {
    /// Create new [`BackendQuoteResolver`]
    pub fn new(backend_url: Url, timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            backend_url,
        })
    }

    fn quote_url(&self) -> Result<Url, Error> {
        let base = self.backend_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/lightningaddr/quote/"))?)
    }
}

#[async_trait]
impl LightningAddressResolver for BackendQuoteResolver {
    #[tracing::instrument(skip(self))]
    async fn resolve(&self, address: &str, amount: Amount) -> Result<String, Error> {
        if amount == Amount::ZERO {
            return Err(Error::Validation("Amount is required".to_string()));
        }

        let response = self
            .client
            .post(self.quote_url()?)
            .json(&QuoteRequest { address, amount })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Settlement(ErrorResponse::from_body(&body).detail));
        }

        let quote: QuoteResponse = serde_json::from_str(&body)?;
        quote
            .request
            .as_deref()
            .and_then(normalize_bolt11)
            .ok_or_else(|| Error::Protocol("Address quote did not return an invoice".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayRequest {
    callback: String,
    min_sendable: u64,
    max_sendable: u64,
    #[serde(default)]
    tag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackResponse {
    #[serde(default)]
    pr: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Url of the LNURL-pay endpoint behind `address`
///
/// Accepts `user@domain` and bech32 `lnurl1..` strings.
pub fn lnurlp_url(address: &str) -> Result<Url, Error> {
    let address = address.trim();

    if address
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("lnurl"))
    {
        let (_, data) = bech32::decode(&address.to_lowercase())
            .map_err(|e| Error::Validation(format!("Invalid LNURL: {e}")))?;
        let url = String::from_utf8(data)
            .map_err(|_| Error::Validation("Invalid LNURL".to_string()))?;
        return Ok(Url::parse(&url)?);
    }

    let (user, domain) = address
        .split_once('@')
        .filter(|(user, domain)| !user.is_empty() && !domain.is_empty())
        .ok_or_else(|| Error::Validation(format!("Invalid lightning address: {address}")))?;

    Ok(Url::parse(&format!(
        "https://{}/.well-known/lnurlp/{}",
        domain.to_lowercase(),
        user
    ))?)
}

fn amount_in_bounds(pay_request: &PayRequest, amount: Amount) -> Result<u64, Error> {
    let msat = amount
        .to_u64()
        .checked_mul(1000)
        .ok_or_else(|| Error::Validation("Amount too large".to_string()))?;

    if msat < pay_request.min_sendable || msat > pay_request.max_sendable {
        return Err(Error::Validation(format!(
            "Amount must be between {} and {} sats",
            pay_request.min_sendable.div_ceil(1000),
            pay_request.max_sendable / 1000
        )));
    }

    Ok(msat)
}

/// Resolves addresses with LNURL-pay directly
#[derive(Debug, Clone)]
pub struct LnurlPayResolver {
    client: Client,
}

impl LnurlPayResolver {
    /// Create new [`LnurlPayResolver`]
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl LightningAddressResolver for LnurlPayResolver {
    #[tracing::instrument(skip(self))]
    async fn resolve(&self, address: &str, amount: Amount) -> Result<String, Error> {
        let pay_request: PayRequest = self
            .client
            .get(lnurlp_url(address)?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if pay_request
            .tag
            .as_deref()
            .is_some_and(|tag| tag != "payRequest")
        {
            return Err(Error::Validation(format!(
                "{address} is not a pay request"
            )));
        }

        let msat = amount_in_bounds(&pay_request, amount)?;

        let mut callback = Url::parse(&pay_request.callback)?;
        callback
            .query_pairs_mut()
            .append_pair("amount", &msat.to_string());

        let response: CallbackResponse = self
            .client
            .get(callback)
            .send()
            .await?
            .json()
            .await?;

        if response
            .status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("error"))
        {
            return Err(Error::Validation(
                response
                    .reason
                    .unwrap_or_else(|| "Address rejected the payment".to_string()),
            ));
        }

        response
            .pr
            .as_deref()
            .and_then(normalize_bolt11)
            .ok_or_else(|| Error::Protocol("LNURL callback did not return an invoice".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::bech32::{Bech32, Hrp};

    use super::*;

    #[test]
    fn test_lnurlp_url_from_address() {
        let url = lnurlp_url("satoshi@Coinos.io").unwrap();
        assert_eq!(url.as_str(), "https://coinos.io/.well-known/lnurlp/satoshi");

        assert!(lnurlp_url("@coinos.io").is_err());
        assert!(lnurlp_url("satoshi").is_err());
    }

    #[test]
    fn test_lnurlp_url_from_bech32() {
        let hrp = Hrp::parse("lnurl").unwrap();
        let encoded =
            bech32::encode::<Bech32>(hrp, b"https://service.com/api?q=3fc3645b439ce8e7").unwrap();

        let url = lnurlp_url(&encoded.to_uppercase()).unwrap();
        assert_eq!(url.as_str(), "https://service.com/api?q=3fc3645b439ce8e7");
    }

    #[test]
    fn test_amount_bounds() {
        let pay_request = PayRequest {
            callback: "https://coinos.io/lnurlp/callback".to_string(),
            min_sendable: 1_000,
            max_sendable: 100_000_000,
            tag: Some("payRequest".to_string()),
        };

        assert_eq!(amount_in_bounds(&pay_request, Amount::from(21)).unwrap(), 21_000);
        assert!(amount_in_bounds(&pay_request, Amount::ZERO).is_err());
        assert!(amount_in_bounds(&pay_request, Amount::from(100_001)).is_err());
    }

    #[test]
    fn test_backend_quote_url() {
        let resolver = BackendQuoteResolver::new(
            Url::parse("https://shop.example.com/api/").unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            resolver.quote_url().unwrap().as_str(),
            "https://shop.example.com/api/lightningaddr/quote/"
        );
    }
}
