//! OpenID identity parsing and delegation endpoint discovery.

use std::fmt;

use regex::Regex;
use tracing::{debug, instrument, warn};
use url::Url;

use esgf_core::Result;
use esgf_core::error::{AuthError, InvalidInputError};

/// Port a MyProxy server listens on when the identity does not advertise one.
pub const DEFAULT_MYPROXY_PORT: u16 = 7512;

/// XRDS service type advertising the delegation endpoint.
pub const MYPROXY_SERVICE_TYPE: &str = "urn:esg:security:myproxy-service";

/// A parsed OpenID identity.
///
/// The delegation username is the last path segment of the identity URL,
/// e.g. `alice` for `https://idp.example/esgf-idp/openid/alice`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    openid: Url,
    username: String,
}

impl Identity {
    /// Parse and validate an OpenID identity URL.
    pub fn parse(openid: &str) -> Result<Self> {
        let invalid = |reason: &str| InvalidInputError::Identity {
            value: openid.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(openid.trim()).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(invalid("must use https").into());
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host").into());
        }

        let username = url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .map(str::to_string)
            .ok_or_else(|| invalid("missing username path segment"))?;

        Ok(Self {
            openid: url,
            username,
        })
    }

    pub fn openid(&self) -> &Url {
        &self.openid
    }

    /// Username presented to the delegation service.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn host(&self) -> &str {
        self.openid.host_str().unwrap_or_default()
    }

    /// Whether a certificate subject belongs to this identity.
    ///
    /// Delegated certificates carry the username (or the full OpenID URL)
    /// as their common name.
    pub fn matches_subject(&self, common_name: &str) -> bool {
        common_name == self.username || common_name == self.openid.as_str()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.openid.as_str())
    }
}

/// Host and port of a MyProxy delegation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationEndpoint {
    pub host: String,
    pub port: u16,
}

impl DelegationEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Endpoint assumed when the identity advertises none.
    pub fn fallback(identity: &Identity) -> Self {
        Self::new(identity.host(), DEFAULT_MYPROXY_PORT)
    }
}

impl fmt::Display for DelegationEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Resolve an identity to its delegation endpoint.
///
/// Fetches the identity's XRDS document and looks for the MyProxy service
/// entry. When the document cannot be fetched or has no such entry, the
/// identity host on the default port is used.
#[instrument(skip(http), fields(identity = %identity))]
pub async fn resolve_endpoint(
    http: &reqwest::Client,
    identity: &Identity,
) -> Result<DelegationEndpoint> {
    let response = http
        .get(identity.openid().clone())
        .header(reqwest::header::ACCEPT, "application/xrds+xml")
        .send()
        .await;

    let body = match response {
        Ok(r) if r.status().is_success() => r.text().await.ok(),
        Ok(r) => {
            warn!(status = %r.status(), "identity document unavailable");
            None
        }
        Err(e) => {
            warn!(error = %e, "identity document unavailable");
            None
        }
    };

    let advertised = match body {
        Some(xrds) => find_myproxy_endpoint(&xrds).map_err(|reason| {
            AuthError::IdentityResolution {
                identity: identity.to_string(),
                reason,
            }
        })?,
        None => None,
    };

    let endpoint = advertised.unwrap_or_else(|| DelegationEndpoint::fallback(identity));
    debug!(%endpoint, "delegation endpoint resolved");
    Ok(endpoint)
}

/// Scan an XRDS document for the MyProxy service URI.
///
/// Returns `Ok(None)` when no entry exists and `Err` when an entry exists
/// but its URI is unusable.
pub fn find_myproxy_endpoint(xrds: &str) -> std::result::Result<Option<DelegationEndpoint>, String> {
    let service = Regex::new(r"(?s)<Service[^>]*>(.*?)</Service>").map_err(|e| e.to_string())?;
    let uri = Regex::new(r"(?s)<URI[^>]*>\s*(.*?)\s*</URI>").map_err(|e| e.to_string())?;

    for block in service.captures_iter(xrds) {
        let body = &block[1];
        if !body.contains(MYPROXY_SERVICE_TYPE) {
            continue;
        }
        let Some(found) = uri.captures(body) else {
            return Err("myproxy service entry has no URI".into());
        };
        let raw = &found[1];
        let url = Url::parse(raw).map_err(|e| format!("bad myproxy URI '{}': {}", raw, e))?;
        let host = url
            .host_str()
            .ok_or_else(|| format!("myproxy URI '{}' has no host", raw))?;
        let port = url.port().unwrap_or(DEFAULT_MYPROXY_PORT);
        return Ok(Some(DelegationEndpoint::new(host, port)));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const XRDS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xrds:XRDS xmlns:xrds="xri://$xrds" xmlns="xri://$xrd*($v*2.0)">
  <XRD>
    <Service priority="0">
      <Type>http://specs.openid.net/auth/2.0/signon</Type>
      <URI>https://idp.example/esgf-idp/idp/openidServer.htm</URI>
    </Service>
    <Service priority="10">
      <Type>urn:esg:security:myproxy-service</Type>
      <URI>socket://myproxy.example:7513</URI>
    </Service>
  </XRD>
</xrds:XRDS>"#;

    #[test]
    fn username_is_last_segment() {
        let id = Identity::parse("https://idp.example/esgf-idp/openid/alice").unwrap();
        assert_eq!(id.username(), "alice");
        assert_eq!(id.host(), "idp.example");

        let trailing = Identity::parse("https://idp.example/esgf-idp/openid/bob/").unwrap();
        assert_eq!(trailing.username(), "bob");
    }

    #[test]
    fn rejects_bad_identities() {
        assert!(Identity::parse("not a url").is_err());
        assert!(Identity::parse("ftp://idp.example/openid/alice").is_err());
        assert!(Identity::parse("https://idp.example/").is_err());
    }

    #[test]
    fn subject_matching() {
        let id = Identity::parse("https://idp.example/esgf-idp/openid/alice").unwrap();
        assert!(id.matches_subject("alice"));
        assert!(id.matches_subject("https://idp.example/esgf-idp/openid/alice"));
        assert!(!id.matches_subject("mallory"));
    }

    #[test]
    fn finds_myproxy_service() {
        let endpoint = find_myproxy_endpoint(XRDS).unwrap().unwrap();
        assert_eq!(endpoint, DelegationEndpoint::new("myproxy.example", 7513));
    }

    #[test]
    fn missing_service_is_none() {
        let xrds = "<XRDS><XRD><Service><Type>other</Type><URI>x</URI></Service></XRD></XRDS>";
        assert_eq!(find_myproxy_endpoint(xrds).unwrap(), None);
    }

    #[test]
    fn fallback_uses_identity_host() {
        let id = Identity::parse("https://idp.example/esgf-idp/openid/alice").unwrap();
        assert_eq!(
            DelegationEndpoint::fallback(&id).to_string(),
            "idp.example:7512"
        );
    }
}
