//! NUT-05: Melting Tokens
//!
//! <https://github.com/cashubtc/nuts/blob/main/05.md>

use serde::{Deserialize, Serialize};

use super::nut00::{BlindSignature, BlindedMessage, Proofs};
use crate::Amount;

/// Melt quote request [NUT-05]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuoteBolt11Request {
    /// Bolt11 invoice to be paid
    pub request: String,
    /// Unit wallet would like to pay with
    pub unit: String,
}

/// Melt quote response [NUT-05]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuoteBolt11Response {
    /// Quote Id
    #[serde(alias = "quote_id")]
    pub quote: String,
    /// The amount that needs to be provided
    pub amount: Amount,
    /// The fee reserve that is required
    #[serde(default, alias = "fee")]
    pub fee_reserve: Amount,
    /// Quote state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Unix timestamp until the quote is valid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
}

impl MeltQuoteBolt11Response {
    /// Amount the inputs have to cover
    pub fn required(&self) -> Option<Amount> {
        self.amount.checked_add(self.fee_reserve)
    }
}

/// Melt Bolt11 Request [NUT-05]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltRequest {
    /// Quote ID
    pub quote: String,
    /// Proofs
    pub inputs: Proofs,
    /// Blinded Message that can be used to return change [NUT-08]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<BlindedMessage>>,
}

/// Melt Response [NUT-05]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltResponse {
    /// Quote state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Bolt11 preimage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_preimage: Option<String>,
    /// Change for overpaid fee reserve
    #[serde(
        default,
        alias = "signatures",
        alias = "promises",
        skip_serializing_if = "Option::is_none"
    )]
    pub change: Option<Vec<BlindSignature>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_aliases() {
        let quote: MeltQuoteBolt11Response =
            serde_json::from_str(r#"{"quote_id":"q1","amount":100,"fee":3}"#).unwrap();
        assert_eq!(quote.quote, "q1");
        assert_eq!(quote.required(), Some(Amount::from(103)));

        let quote: MeltQuoteBolt11Response =
            serde_json::from_str(r#"{"quote":"q2","amount":21}"#).unwrap();
        assert_eq!(quote.fee_reserve, Amount::ZERO);
    }

    #[test]
    fn test_change_aliases() {
        let response: MeltResponse = serde_json::from_str(
            r#"{"state":"PAID","signatures":[{"amount":1,"id":"00ad","C_":"02aa"}]}"#,
        )
        .unwrap();
        assert_eq!(response.change.map(|c| c.len()), Some(1));

        let response: MeltResponse = serde_json::from_str(r#"{"paid":true}"#).unwrap();
        assert!(response.change.is_none());
    }
}
