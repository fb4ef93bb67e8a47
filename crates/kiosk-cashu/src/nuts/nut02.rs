//! NUT-02: Keysets
//!
//! <https://github.com/cashubtc/nuts/blob/main/02.md>

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Amount;

/// NUT02 Error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Listing contains no keyset
    #[error("Mint returned no keysets")]
    NoKeyset,
    /// Selected keyset has no id
    #[error("Keyset id missing")]
    MissingKeysetId,
}

/// Keyset as returned by a mint
///
/// Mints disagree on field names, the common spellings are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyset {
    /// Keyset id
    #[serde(default, alias = "keyset_id", alias = "keysetId")]
    pub id: String,
    /// Unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Active flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Alternative active flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// Alternative active flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<bool>,
    /// `"active"` when active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Public key per amount
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

impl Keyset {
    /// True if any of the active markers is set
    pub fn is_active(&self) -> bool {
        self.active == Some(true)
            || self.is_active == Some(true)
            || self.current == Some(true)
            || self.state.as_deref() == Some("active")
    }

    /// Mint public key for `amount`
    pub fn amount_key(&self, amount: Amount) -> Option<&str> {
        self.keys.get(&amount.to_string()).map(String::as_str)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeysetListing {
    Listing {
        keysets: Vec<Keyset>,
        #[serde(default)]
        current_keyset: Option<String>,
    },
    List(Vec<Keyset>),
    Single(Keyset),
}

/// Keysets advertised by a mint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "KeysetListing")]
pub struct MintKeys {
    /// Keysets in mint order
    pub keysets: Vec<Keyset>,
    /// Keyset id pinned by the mint or the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_keyset: Option<String>,
}

impl From<KeysetListing> for MintKeys {
    fn from(listing: KeysetListing) -> Self {
        match listing {
            KeysetListing::Listing {
                keysets,
                current_keyset,
            } => Self {
                keysets,
                current_keyset,
            },
            KeysetListing::List(keysets) => Self {
                keysets,
                current_keyset: None,
            },
            KeysetListing::Single(keyset) => Self {
                keysets: vec![keyset],
                current_keyset: None,
            },
        }
    }
}

impl MintKeys {
    /// Keys with a pinned keyset id
    pub fn pinned(mut self, keyset_id: impl Into<String>) -> Self {
        self.current_keyset = Some(keyset_id.into());
        self
    }

    /// Pick the keyset to sign against
    ///
    /// The pinned id wins, then the first active keyset, then the first keyset.
    pub fn select(&self) -> Option<&Keyset> {
        self.current_keyset
            .as_deref()
            .filter(|id| !id.is_empty())
            .and_then(|id| self.keysets.iter().find(|k| k.id == id))
            .or_else(|| self.keysets.iter().find(|k| k.is_active()))
            .or_else(|| self.keysets.first())
    }

    /// Selected keyset, failing if it cannot carry outputs
    pub fn resolve(&self) -> Result<&Keyset, Error> {
        let keyset = self.select().ok_or(Error::NoKeyset)?;
        if keyset.id.is_empty() {
            return Err(Error::MissingKeysetId);
        }
        Ok(keyset)
    }

    /// Keyset with the given id
    pub fn keyset(&self, id: &str) -> Option<&Keyset> {
        self.keysets.iter().find(|k| k.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_chain() {
        let keys: MintKeys = serde_json::from_str(
            r#"{"keysets":[
                {"id":"first","unit":"sat","keys":{"1":"02aa"}},
                {"keyset_id":"flagged","state":"active"},
                {"keysetId":"pinned","active":false}
            ],"current_keyset":"pinned"}"#,
        )
        .unwrap();
        assert_eq!(keys.resolve().unwrap().id, "pinned");

        let unpinned = MintKeys {
            current_keyset: Some("missing".to_string()),
            ..keys.clone()
        };
        assert_eq!(unpinned.resolve().unwrap().id, "flagged");

        let none_active = MintKeys {
            keysets: vec![keys.keysets[0].clone(), keys.keysets[2].clone()],
            current_keyset: None,
        };
        assert_eq!(none_active.resolve().unwrap().id, "first");
        assert_eq!(
            none_active.keysets[0].amount_key(Amount::ONE),
            Some("02aa")
        );
    }

    #[test]
    fn test_listing_shapes() {
        let list: MintKeys = serde_json::from_str(r#"[{"id":"a"},{"id":"b","is_active":true}]"#).unwrap();
        assert_eq!(list.resolve().unwrap().id, "b");

        let single: MintKeys = serde_json::from_str(r#"{"id":"solo","keys":{"2":"03bb"}}"#).unwrap();
        assert_eq!(single.resolve().unwrap().id, "solo");

        let pinned = single.pinned("solo");
        assert_eq!(pinned.current_keyset.as_deref(), Some("solo"));
    }

    #[test]
    fn test_unresolvable() {
        let empty: MintKeys = serde_json::from_str(r#"{"keysets":[]}"#).unwrap();
        assert_eq!(empty.resolve(), Err(Error::NoKeyset));

        let no_id: MintKeys = serde_json::from_str(r#"{"keys":{"1":"02aa"}}"#).unwrap();
        assert_eq!(no_id.resolve(), Err(Error::MissingKeysetId));
    }
}
