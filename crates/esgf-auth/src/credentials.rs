//! Login credentials type.

use std::fmt;

/// An OpenID identity and its password.
///
/// # Security
///
/// The password is never exposed in Debug output to prevent accidental logging.
///
/// # Example
///
/// ```
/// use esgf_auth::Credentials;
///
/// let creds = Credentials::new("https://esgf-node.llnl.gov/esgf-idp/openid/alice", "pw");
/// assert_eq!(creds.openid(), "https://esgf-node.llnl.gov/esgf-idp/openid/alice");
/// ```
#[derive(Clone)]
pub struct Credentials {
    openid: String,
    password: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Arguments
    ///
    /// * `openid` - The OpenID identity URL issued by a federation identity provider
    /// * `password` - The password registered with that identity provider
    pub fn new(openid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            openid: openid.into(),
            password: password.into(),
        }
    }

    /// Returns the OpenID identity URL.
    pub fn openid(&self) -> &str {
        &self.openid
    }

    /// Returns the password.
    ///
    /// # Security
    ///
    /// Use this only when constructing the delegation request.
    /// Never log or display this value.
    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("openid", &self.openid)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_hides_password_in_debug() {
        let creds = Credentials::new("https://idp.example/openid/alice", "secret123");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("openid/alice"));
        assert!(!debug.contains("secret123"));
        assert!(debug.contains("[REDACTED]"));
    }
}
