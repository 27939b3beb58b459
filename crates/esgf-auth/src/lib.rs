//! esgf-auth - Delegated credentials for ESGF data access.
//!
//! Data nodes authenticate downloads with short-lived X.509 client
//! certificates. [`CredentialProvider`] turns an OpenID identity and password
//! into such a certificate through a [`DelegationService`] (MyProxy in
//! production), keeps it on disk in a [`CredentialStore`], renews it when it
//! lapses, and hands out connections that present it.

mod certificate;
mod credentials;
mod delegation;
mod identity;
mod myproxy;
mod provider;
mod store;
mod trust;

pub use certificate::Certificate;
pub use credentials::Credentials;
pub use delegation::{DelegationRequest, DelegationService};
pub use identity::{
    DEFAULT_MYPROXY_PORT, DelegationEndpoint, Identity, MYPROXY_SERVICE_TYPE,
    find_myproxy_endpoint, resolve_endpoint,
};
pub use myproxy::MyProxyClient;
pub use provider::{CertificateInfo, CredentialProvider, ProviderSettings};
pub use store::{CREDENTIALS_FILE, CredentialStore, KEYSTORE_FILE, TRUST_ROOTS_FILE};
pub use trust::{fetch_trust_roots, root_store};

use esgf_core::Error;
use esgf_core::error::TransportError;

/// Map a reqwest failure into the engine's transport taxonomy.
pub(crate) fn transport(err: reqwest::Error) -> Error {
    let err = if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection {
            message: err.to_string(),
        }
    } else {
        TransportError::Http {
            message: err.to_string(),
        }
    };
    err.into()
}
