//! Transport types for NUT-18: Payment Requests

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::payment_request::decoded_text;
use crate::cbor::Value;
use crate::nuts::nut18::error::Error;

/// Transport Type
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportType {
    /// Nostr
    #[serde(rename = "nostr")]
    Nostr,
    /// Http post
    #[serde(rename = "post")]
    HttpPost,
}

impl TransportType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nostr => "nostr",
            Self::HttpPost => "post",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nostr" => Ok(Self::Nostr),
            "post" => Ok(Self::HttpPost),
            _ => Err(Error::UnknownTransport(s.to_string())),
        }
    }
}

/// Transport
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    /// Type
    #[serde(rename = "t")]
    pub _type: TransportType,
    /// Target
    #[serde(rename = "a")]
    pub target: String,
    /// Tags
    #[serde(rename = "g")]
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<Vec<String>>,
}

impl Transport {
    /// Create a new TransportBuilder
    pub fn builder() -> TransportBuilder {
        TransportBuilder::default()
    }

    /// HTTP POST transport to `url`
    pub fn http_post<S: Into<String>>(url: S) -> Self {
        Self {
            _type: TransportType::HttpPost,
            target: url.into(),
            tags: Vec::new(),
        }
    }

    pub(crate) fn to_cbor(&self) -> Value {
        let mut entries = vec![
            ("t".to_string(), Value::from(self._type.as_str())),
            ("a".to_string(), Value::from(self.target.as_str())),
        ];
        if !self.tags.is_empty() {
            let tags = self
                .tags
                .iter()
                .map(|tag| Value::Array(tag.iter().map(|t| Value::from(t.as_str())).collect()))
                .collect();
            entries.push(("g".to_string(), Value::Array(tags)));
        }
        Value::Map(entries)
    }

    /// Read a transport from a decoded map
    ///
    /// Both the compact (`t`, `a`) and long (`type`, `address`, `url`) key
    /// names are accepted.
    pub(crate) fn from_cbor(value: &Value) -> Result<Self, Error> {
        let kind = ["t", "type"]
            .iter()
            .find_map(|k| value.get(k).and_then(decoded_text))
            .ok_or(Error::IncompleteTransport("type"))?;
        let target = ["a", "address", "url"]
            .iter()
            .find_map(|k| value.get(k).and_then(decoded_text))
            .ok_or(Error::IncompleteTransport("target"))?;
        let tags = value
            .get("g")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|tag| {
                        tag.as_array()
                            .map(|items| items.iter().filter_map(decoded_text).collect())
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            _type: TransportType::from_str(&kind)?,
            target,
            tags,
        })
    }
}

/// Builder for Transport
#[derive(Debug, Default, Clone)]
pub struct TransportBuilder {
    _type: Option<TransportType>,
    target: Option<String>,
    tags: Vec<Vec<String>>,
}

impl TransportBuilder {
    /// Set transport type
    pub fn transport_type(mut self, transport_type: TransportType) -> Self {
        self._type = Some(transport_type);
        self
    }

    /// Set target
    pub fn target<S: Into<String>>(mut self, target: S) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Add a tag
    pub fn add_tag(mut self, tag: Vec<String>) -> Self {
        self.tags.push(tag);
        self
    }

    /// Build the Transport
    pub fn build(self) -> Result<Transport, Error> {
        let _type = self._type.ok_or(Error::IncompleteTransport("type"))?;
        let target = self.target.ok_or(Error::IncompleteTransport("target"))?;

        Ok(Transport {
            _type,
            target,
            tags: self.tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_builder() {
        let transport = Transport::builder()
            .transport_type(TransportType::Nostr)
            .target("nprofile1xyz")
            .add_tag(vec!["n".to_string(), "17".to_string()])
            .build()
            .unwrap();
        assert_eq!(transport._type, TransportType::Nostr);
        assert_eq!(transport.tags, vec![vec!["n".to_string(), "17".to_string()]]);

        assert!(Transport::builder().target("x").build().is_err());
    }

    #[test]
    fn test_long_key_names() {
        let value = Value::map([
            ("type", Value::from("POST")),
            ("url", Value::from("https://shop.example/pay")),
        ]);
        let transport = Transport::from_cbor(&value).unwrap();
        assert_eq!(transport, Transport::http_post("https://shop.example/pay"));

        let value = Value::map([
            ("type", Value::from("nostr")),
            ("address", Value::from("nprofile1abc")),
        ]);
        assert_eq!(Transport::from_cbor(&value).unwrap().target, "nprofile1abc");
    }

    #[test]
    fn test_empty_tags_omitted() {
        let value = Transport::http_post("https://shop.example/pay").to_cbor();
        assert!(value.get("g").is_none());
    }
}
