//! Delegation service trait.

use std::fmt;

use async_trait::async_trait;

use esgf_core::Result;

use crate::certificate::Certificate;
use crate::identity::DelegationEndpoint;

/// One request for a short-lived delegated certificate.
pub struct DelegationRequest<'a> {
    pub endpoint: &'a DelegationEndpoint,
    pub username: &'a str,
    pub passphrase: &'a str,
    /// Requested validity in hours.
    pub lifetime_hours: u32,
    /// PEM trust roots used to authenticate the delegation service.
    pub trust_roots: &'a str,
}

impl fmt::Debug for DelegationRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegationRequest")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("passphrase", &"[REDACTED]")
            .field("lifetime_hours", &self.lifetime_hours)
            .finish()
    }
}

/// Issues delegated credentials in exchange for an identity and secret.
///
/// Rejections surface as [`esgf_core::error::AuthError`]; network failures
/// as transport errors.
#[async_trait]
pub trait DelegationService: Send + Sync {
    async fn delegate(&self, request: DelegationRequest<'_>) -> Result<Certificate>;
}
