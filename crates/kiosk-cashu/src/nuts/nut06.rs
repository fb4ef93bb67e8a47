//! NUT-06: Mint Information
//!
//! <https://github.com/cashubtc/nuts/blob/main/06.md>

use serde::{Deserialize, Serialize};

/// Mint Info [NUT-06]
///
/// Only the descriptive fields are modelled, everything else a mint
/// advertises is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintInfo {
    /// name of the mint and should be recognizable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// hex pubkey of the mint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    /// implementation name and the version running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// short description of the mint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// long description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_long: Option<String>,
    /// message of the day that the wallet must display to the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motd: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_info_ignores_unknown_fields() {
        let json = r#"{
            "name": "Coinos",
            "version": "Nutshell/0.16.0",
            "description": "A mint",
            "nuts": {"4": {"methods": []}},
            "contact": [["email", "a@b.c"]]
        }"#;

        let info: MintInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.name.as_deref(), Some("Coinos"));
        assert_eq!(info.version.as_deref(), Some("Nutshell/0.16.0"));
        assert!(info.pubkey.is_none());
    }
}
