//! Certificate lifecycle and authenticated connections.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use reqwest::header::{COOKIE, HeaderValue, LOCATION, SET_COOKIE};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use esgf_core::error::{AuthError, InvalidInputError, TransportError};
use esgf_core::{EngineConfig, Result};

use crate::certificate::Certificate;
use crate::credentials::Credentials;
use crate::delegation::{DelegationRequest, DelegationService};
use crate::identity::{Identity, resolve_endpoint};
use crate::myproxy::MyProxyClient;
use crate::store::CredentialStore;
use crate::transport;
use crate::trust::fetch_trust_roots;

/// Settings for a [`CredentialProvider`].
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Validity requested for delegated certificates.
    pub lifetime_hours: u32,
    /// Where to download the federation trust roots from on every
    /// delegation. When unset, the bundle already in the credential store is
    /// used.
    pub trust_roots_url: Option<Url>,
    pub user_agent: String,
}

impl ProviderSettings {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            lifetime_hours: config.certificate_lifetime_hours,
            trust_roots_url: config.trust_roots_url.clone(),
            user_agent: config.user_agent.clone(),
        }
    }

    pub fn with_trust_roots_url(mut self, url: Url) -> Self {
        self.trust_roots_url = Some(url);
        self
    }
}

/// Public details of the current certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub valid: bool,
}

/// Owns the process's delegated credential and hands out connections that
/// present it.
///
/// Cheap to clone; clones share one credential. Create one per process and
/// pass it to whatever needs authenticated access.
///
/// # Example
///
/// ```no_run
/// use esgf_auth::{CredentialProvider, CredentialStore, Credentials, ProviderSettings};
/// use esgf_core::EngineConfig;
///
/// # async fn example() -> esgf_core::Result<()> {
/// let provider = CredentialProvider::myproxy(
///     CredentialStore::new("/home/alice/.esg"),
///     ProviderSettings::from_engine(&EngineConfig::default()),
/// )?;
/// if !provider.initialize_from_local_store().await? {
///     let creds = Credentials::new("https://idp.example/esgf-idp/openid/alice", "pw");
///     provider.initialize_from_identity(creds).await?;
/// }
/// let response = provider
///     .authenticated_connection("https://data.example/thredds/fileServer/tas.nc")
///     .await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CredentialProvider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    store: CredentialStore,
    delegation: Arc<dyn DelegationService>,
    http: reqwest::Client,
    settings: ProviderSettings,
    state: Mutex<ProviderState>,
}

#[derive(Default)]
struct ProviderState {
    credentials: Option<Credentials>,
    identity: Option<Identity>,
    certificate: Option<Certificate>,
    /// TLS client built from `certificate`; dropped whenever it changes.
    client: Option<reqwest::Client>,
}

impl CredentialProvider {
    pub fn new(
        store: CredentialStore,
        delegation: Arc<dyn DelegationService>,
        settings: ProviderSettings,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(transport)?;

        Ok(Self {
            inner: Arc::new(ProviderInner {
                store,
                delegation,
                http,
                settings,
                state: Mutex::new(ProviderState::default()),
            }),
        })
    }

    /// Provider delegating through MyProxy.
    pub fn myproxy(store: CredentialStore, settings: ProviderSettings) -> Result<Self> {
        Self::new(store, Arc::new(MyProxyClient::default()), settings)
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Obtain a fresh delegated certificate for an identity.
    ///
    /// Resolves the identity's delegation endpoint, fetches and persists the
    /// trust roots, runs the delegation exchange and persists the result.
    #[instrument(skip(self, credentials), fields(identity = %credentials.openid()))]
    pub async fn initialize_from_identity(&self, credentials: Credentials) -> Result<()> {
        let identity = Identity::parse(credentials.openid())?;
        let mut state = self.inner.state.lock().await;
        self.renew_locked(&mut state, &identity, &credentials).await?;
        state.identity = Some(identity);
        state.credentials = Some(credentials);
        Ok(())
    }

    /// Load the persisted certificate.
    ///
    /// Returns `Ok(false)` when no certificate is stored or the stored one
    /// has expired; an expired certificate is still loaded. Fails when the
    /// files are unreadable or the certificate belongs to a different
    /// identity than the one already configured.
    #[instrument(skip(self))]
    pub async fn initialize_from_local_store(&self) -> Result<bool> {
        let Some(certificate) = self.inner.store.load_certificate()? else {
            debug!("no stored certificate");
            return Ok(false);
        };

        let mut state = self.inner.state.lock().await;
        if let Some(identity) = &state.identity {
            let matches = certificate
                .common_names()
                .iter()
                .any(|cn| identity.matches_subject(cn));
            if !matches {
                return Err(AuthError::SubjectMismatch {
                    expected: identity.username().to_string(),
                    actual: certificate.subject().to_string(),
                }
                .into());
            }
        }

        let valid = certificate.is_valid();
        if !valid {
            warn!(not_after = %certificate.not_after(), "stored certificate has expired");
        }
        state.certificate = Some(certificate);
        state.client = None;
        Ok(valid)
    }

    pub async fn has_valid_credential(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.certificate.as_ref().is_some_and(Certificate::is_valid)
    }

    /// Time left on the current certificate, zero when there is none.
    pub async fn remaining_validity(&self) -> Duration {
        let state = self.inner.state.lock().await;
        state
            .certificate
            .as_ref()
            .map(Certificate::remaining)
            .unwrap_or_else(Duration::zero)
    }

    pub async fn certificate_info(&self) -> Option<CertificateInfo> {
        let state = self.inner.state.lock().await;
        state.certificate.as_ref().map(|c| CertificateInfo {
            subject: c.subject().to_string(),
            not_before: c.not_before(),
            not_after: c.not_after(),
            valid: c.is_valid(),
        })
    }

    /// Replace the certificate using the configured identity.
    #[instrument(skip(self))]
    pub async fn renew(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let (Some(identity), Some(credentials)) = (state.identity.clone(), state.credentials.clone())
        else {
            return Err(AuthError::NoCredential.into());
        };
        self.renew_locked(&mut state, &identity, &credentials).await
    }

    /// Fetch `url` presenting the client certificate.
    ///
    /// Data nodes answer an unauthenticated request with a redirect to their
    /// authentication service. That redirect is followed with the client
    /// certificate, the session cookie it sets is captured, and the original
    /// URL is requested again with the cookie attached.
    ///
    /// An invalid certificate is renewed first, but only when an identity is
    /// configured; a provider initialized from the local store alone fails
    /// with [`AuthError::CertificateExpired`] instead.
    #[instrument(skip(self))]
    pub async fn authenticated_connection(&self, url: &str) -> Result<reqwest::Response> {
        let target = Url::parse(url).map_err(|e| InvalidInputError::Other {
            message: format!("invalid URL '{}': {}", url, e),
        })?;
        let client = self.client().await?;

        let probe = client.get(target.clone()).send().await.map_err(transport)?;
        if !probe.status().is_redirection() {
            return checked(probe);
        }

        let Some(location) = redirect_target(&target, &probe) else {
            return checked(probe);
        };
        debug!(%location, "following authentication redirect");

        let auth = client.get(location).send().await.map_err(transport)?;
        let cookie = session_cookie(&auth);
        if cookie.is_none() {
            warn!(status = %auth.status(), "authentication service set no session cookie");
        }

        let mut request = client.get(target);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        checked(request.send().await.map_err(transport)?)
    }

    /// The cached TLS client, rebuilt when the certificate changed or was
    /// renewed.
    async fn client(&self) -> Result<reqwest::Client> {
        let mut state = self.inner.state.lock().await;

        let valid = state.certificate.as_ref().map(Certificate::is_valid);
        match valid {
            Some(true) => {}
            _ => match (state.identity.clone(), state.credentials.clone()) {
                (Some(identity), Some(credentials)) => {
                    info!("certificate missing or invalid, renewing");
                    self.renew_locked(&mut state, &identity, &credentials).await?;
                }
                _ if valid.is_some() => return Err(AuthError::CertificateExpired.into()),
                _ => return Err(AuthError::NoCredential.into()),
            },
        }

        if let Some(client) = &state.client {
            return Ok(client.clone());
        }

        let certificate = state.certificate.as_ref().ok_or(AuthError::NoCredential)?;
        let client = self.build_client(certificate)?;
        state.client = Some(client.clone());
        Ok(client)
    }

    fn build_client(&self, certificate: &Certificate) -> Result<reqwest::Client> {
        let tls = |e: reqwest::Error| TransportError::Tls {
            message: e.to_string(),
        };

        let identity =
            reqwest::Identity::from_pem(certificate.to_keystore_pem().as_bytes()).map_err(tls)?;
        let mut builder = reqwest::Client::builder()
            .user_agent(self.inner.settings.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .identity(identity);

        if let Some(pem) = self.inner.store.load_trust_roots()? {
            for root in reqwest::Certificate::from_pem_bundle(pem.as_bytes()).map_err(tls)? {
                builder = builder.add_root_certificate(root);
            }
        }

        Ok(builder.build().map_err(tls)?)
    }

    async fn renew_locked(
        &self,
        state: &mut ProviderState,
        identity: &Identity,
        credentials: &Credentials,
    ) -> Result<()> {
        let inner = &self.inner;
        let endpoint = resolve_endpoint(&inner.http, identity).await?;

        let trust_roots = match &inner.settings.trust_roots_url {
            Some(url) => {
                let pem = fetch_trust_roots(&inner.http, url.as_str()).await?;
                inner.store.save_trust_roots(&pem)?;
                pem
            }
            None => inner.store.load_trust_roots()?.ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!(
                        "no trust roots URL configured and none stored at {}",
                        inner.store.trust_roots_path().display()
                    ),
                )
            })?,
        };

        let certificate = inner
            .delegation
            .delegate(DelegationRequest {
                endpoint: &endpoint,
                username: identity.username(),
                passphrase: credentials.password(),
                lifetime_hours: inner.settings.lifetime_hours,
                trust_roots: &trust_roots,
            })
            .await?;

        inner.store.save_certificate(&certificate)?;
        info!(
            subject = certificate.subject(),
            not_after = %certificate.not_after(),
            "credential renewed"
        );
        state.certificate = Some(certificate);
        state.client = None;
        Ok(())
    }
}

impl std::fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("store", &self.inner.store)
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

fn redirect_target(base: &Url, response: &reqwest::Response) -> Option<Url> {
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    base.join(location).ok()
}

/// `name=value` pairs of every cookie the response sets, joined for a
/// `Cookie` header.
fn session_cookie(response: &reqwest::Response) -> Option<HeaderValue> {
    let pairs: Vec<&str> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    HeaderValue::from_str(&pairs.join("; ")).ok()
}

fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() || status == StatusCode::NOT_MODIFIED {
        Ok(response)
    } else {
        Err(TransportError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        }
        .into())
    }
}
