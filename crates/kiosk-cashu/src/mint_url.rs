//! Mint Url

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{ParseError, Url};

/// Mint used when nothing else is configured
pub const DEFAULT_MINT_URL: &str = "https://mint.coinos.io";

/// Url Error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Url error
    #[error(transparent)]
    Url(#[from] ParseError),
    /// Invalid URL structure
    #[error("Invalid URL")]
    InvalidUrl,
}

/// Normalized mint url
///
/// Always carries a scheme, a lowercase scheme and host and no trailing slash.
/// An empty input resolves to [`DEFAULT_MINT_URL`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MintUrl(String);

impl Serialize for MintUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MintUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MintUrl::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Default for MintUrl {
    fn default() -> Self {
        Self(DEFAULT_MINT_URL.to_string())
    }
}

impl MintUrl {
    fn format_url(url: &str) -> Result<String, Error> {
        let url = url.trim();
        if url.is_empty() {
            return Ok(DEFAULT_MINT_URL.to_string());
        }

        let lower = url.to_ascii_lowercase();
        let url = if lower.starts_with("http://") || lower.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{url}")
        };

        let url = url.trim_end_matches('/');
        let (protocol, rest) = url.split_once("://").ok_or(Error::InvalidUrl)?;
        let mut parts = rest.splitn(2, '/');
        let host = parts.next().ok_or(Error::InvalidUrl)?.to_lowercase();
        if host.is_empty() {
            return Err(Error::InvalidUrl);
        }

        let mut formatted_url = format!("{}://{host}", protocol.to_lowercase());
        if let Some(path) = parts.next().filter(|p| !p.is_empty()) {
            formatted_url.push('/');
            formatted_url.push_str(path);
        }
        Ok(formatted_url)
    }

    /// Key used to decide whether two urls name the same mint
    ///
    /// Scheme and trailing slashes are ignored, comparison is case-insensitive.
    pub fn comparison_key(url: &str) -> String {
        let url = url.trim();
        let without_scheme = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(url);
        without_scheme.trim_end_matches('/').to_lowercase()
    }

    /// True if `other` names this mint
    pub fn matches(&self, other: &str) -> bool {
        Self::comparison_key(&self.0) == Self::comparison_key(other)
    }

    /// Url as str
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append path elements onto the URL
    pub fn join_paths(&self, path_elements: &[&str]) -> Result<Url, Error> {
        let mut url = Url::parse(&self.0)?;
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", base_path, path_elements.join("/")));
        Ok(url)
    }
}

impl FromStr for MintUrl {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let formatted = Self::format_url(url)?;
        Url::parse(&formatted)?;
        Ok(Self(formatted))
    }
}

impl fmt::Display for MintUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
