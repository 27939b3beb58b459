//! Index node URL type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{Error, InvalidInputError};

/// A validated federation index node URL.
///
/// The URL names the node's search service root, for example
/// `https://esgf-node.llnl.gov/esg-search`. Service endpoints such as
/// `search` and `wget` are resolved beneath it.
///
/// # Example
///
/// ```
/// use esgf_core::NodeUrl;
///
/// let node = NodeUrl::new("https://esgf-node.llnl.gov/esg-search/").unwrap();
/// assert_eq!(node.endpoint("search"),
///            "https://esgf-node.llnl.gov/esg-search/search");
/// assert_eq!(node.host(), Some("esgf-node.llnl.gov"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeUrl(Url);

impl NodeUrl {
    /// Create a new node URL from a string, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not an absolute HTTP(S) URL with a host.
    pub fn new(s: impl AsRef<str>) -> Result<Self, Error> {
        let s = s.as_ref().trim();
        let url = Url::parse(s).map_err(|e| InvalidInputError::NodeUrl {
            value: s.to_string(),
            reason: e.to_string(),
        })?;

        Self::validate(&url, s)?;

        // Normalize: remove trailing slash
        let mut normalized = url;
        let trimmed = normalized.path().trim_end_matches('/').to_string();
        normalized.set_path(&trimmed);
        normalized.set_query(None);
        normalized.set_fragment(None);

        Ok(Self(normalized))
    }

    /// Returns the URL of a service endpoint beneath this node.
    pub fn endpoint(&self, service: &str) -> String {
        let base = self.0.as_str().trim_end_matches('/');
        format!("{}/{}", base, service)
    }

    /// Returns the base URL as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the inner URL.
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Returns the host string.
    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }

    fn validate(url: &Url, original: &str) -> Result<(), Error> {
        if url.cannot_be_a_base() {
            return Err(InvalidInputError::NodeUrl {
                value: original.to_string(),
                reason: "must be an absolute URL".to_string(),
            }
            .into());
        }

        let scheme = url.scheme();
        if scheme != "https" && scheme != "http" {
            return Err(InvalidInputError::NodeUrl {
                value: original.to_string(),
                reason: format!("unsupported scheme '{}'", scheme),
            }
            .into());
        }

        if url.host_str().is_none() {
            return Err(InvalidInputError::NodeUrl {
                value: original.to_string(),
                reason: "must have a host".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

impl fmt::Display for NodeUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_str().trim_end_matches('/'))
    }
}

impl FromStr for NodeUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for NodeUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NodeUrl::new(&s).map_err(serde::de::Error::custom)
    }
}

impl AsRef<str> for NodeUrl {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_https_url() {
        let node = NodeUrl::new("https://esgf-data.dkrz.de/esg-search").unwrap();
        assert_eq!(node.host(), Some("esgf-data.dkrz.de"));
    }

    #[test]
    fn valid_localhost_http() {
        let node = NodeUrl::new("http://127.0.0.1:8080").unwrap();
        assert_eq!(node.endpoint("search"), "http://127.0.0.1:8080/search");
    }

    #[test]
    fn normalizes_trailing_slash_in_endpoint() {
        let node = NodeUrl::new("https://esgf-node.llnl.gov/esg-search/").unwrap();
        assert_eq!(
            node.endpoint("wget"),
            "https://esgf-node.llnl.gov/esg-search/wget"
        );
    }

    #[test]
    fn drops_query_and_fragment() {
        let node = NodeUrl::new("https://node.example/esg-search?x=1#top").unwrap();
        assert_eq!(node.endpoint("search"), "https://node.example/esg-search/search");
    }

    #[test]
    fn invalid_scheme() {
        assert!(NodeUrl::new("ftp://node.example/esg-search").is_err());
        assert!(NodeUrl::new("socket://node.example:7512").is_err());
    }

    #[test]
    fn invalid_relative_url() {
        assert!(NodeUrl::new("/esg-search/search").is_err());
    }

    #[test]
    fn serde_round_trip_validates() {
        let node = NodeUrl::new("https://node.example/esg-search").unwrap();
        let json = serde_json::to_string(&node).unwrap();
        let back: NodeUrl = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
        assert!(serde_json::from_str::<NodeUrl>("\"not a url\"").is_err());
    }
}
