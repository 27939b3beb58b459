//! MyProxy delegation client.
//!
//! Speaks the MyProxy v2 `GET` exchange over TLS:
//!
//! 1. send the GSI compatibility byte `0` and the request block
//!    (`VERSION`, `COMMAND=0`, `USERNAME`, `PASSPHRASE`, `LIFETIME`);
//! 2. read the server response, `RESPONSE=0` on success;
//! 3. send a DER certificate signing request for a fresh key;
//! 4. read a count byte followed by that many DER certificates, leaf first,
//!    then a final response block.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rcgen::{CertificateParams, KeyPair};
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument, trace};

use esgf_core::Result;
use esgf_core::error::{AuthError, ResponseFormatError, TransportError};

use crate::certificate::Certificate;
use crate::delegation::{DelegationRequest, DelegationService};
use crate::trust::root_store;

const PROTOCOL_VERSION: &str = "MYPROXYv2";

/// Largest response block accepted before the exchange is abandoned.
const MAX_RESPONSE: usize = 64 * 1024;

/// Delegation over the MyProxy protocol.
#[derive(Debug, Clone)]
pub struct MyProxyClient {
    connect_timeout: Duration,
}

impl Default for MyProxyClient {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl MyProxyClient {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn connector(trust_roots: &str) -> Result<TlsConnector> {
        let roots = root_store(trust_roots)?;
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::Tls {
                message: e.to_string(),
            })?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(TlsConnector::from(Arc::new(config)))
    }
}

#[async_trait]
impl DelegationService for MyProxyClient {
    #[instrument(skip(self, request), fields(endpoint = %request.endpoint, username = request.username))]
    async fn delegate(&self, request: DelegationRequest<'_>) -> Result<Certificate> {
        check_fields(&request)?;
        let connector = Self::connector(request.trust_roots)?;
        let endpoint = request.endpoint;

        let tcp = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::Connection {
            message: format!("{}: {}", endpoint, e),
        })?;

        let server_name =
            ServerName::try_from(endpoint.host.clone()).map_err(|e| TransportError::Tls {
                message: e.to_string(),
            })?;
        let mut tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| TransportError::Tls {
                message: e.to_string(),
            })?;
        debug!("TLS session established");

        exchange(&mut tls, &request).await
    }
}

/// Run the `GET` exchange over an established stream.
pub(crate) async fn exchange<S>(stream: &mut S, request: &DelegationRequest<'_>) -> Result<Certificate>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    check_fields(request)?;
    let command = format!(
        "VERSION={}\nCOMMAND=0\nUSERNAME={}\nPASSPHRASE={}\nLIFETIME={}\n\0",
        PROTOCOL_VERSION,
        request.username,
        request.passphrase,
        u64::from(request.lifetime_hours) * 3600,
    );
    stream.write_all(b"0").await?;
    stream.write_all(command.as_bytes()).await?;
    stream.flush().await?;

    let response = read_response(stream).await?;
    check_response(&response)?;
    trace!("passphrase accepted");

    let key = KeyPair::generate().map_err(certificate_error)?;
    let csr = CertificateParams::new(Vec::<String>::new())
        .and_then(|params| params.serialize_request(&key))
        .map_err(certificate_error)?;
    let csr_der: &[u8] = csr.der();
    stream.write_all(csr_der).await?;
    stream.flush().await?;

    let chain = read_chain(stream).await?;
    debug!(certificates = chain.len(), "delegated chain received");
    Certificate::from_parts(chain, key.serialize_pem())
}

/// The request block is newline-separated and NUL-terminated, so neither
/// may appear inside a field.
fn check_fields(request: &DelegationRequest<'_>) -> Result<()> {
    let unsafe_char = |c: char| matches!(c, '\n' | '\r' | '\0');
    if request.username.is_empty()
        || request.username.contains(unsafe_char)
        || request.passphrase.contains(unsafe_char)
    {
        return Err(AuthError::InvalidCredentials.into());
    }
    Ok(())
}

async fn read_response<S: AsyncRead + Unpin>(stream: &mut S) -> Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if response_complete(&String::from_utf8_lossy(&buf)) {
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
        if buf.len() > MAX_RESPONSE {
            return Err(protocol("response too large"));
        }
        let n = read_some(stream, &mut chunk).await?;
        if n == 0 {
            return Err(protocol("connection closed before response"));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn read_chain<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Vec<Vec<u8>>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        if buf.starts_with(b"VERSION=") {
            // An error block instead of certificates.
            let text = String::from_utf8_lossy(&buf).into_owned();
            if response_complete(&text) {
                check_response(&text)?;
                return Err(protocol("response block where certificates were expected"));
            }
        } else if let Some((chain, trailer)) = split_chain(&buf)? {
            let trailer = String::from_utf8_lossy(trailer);
            if response_complete(&trailer) {
                check_response(&trailer)?;
                return Ok(chain);
            }
        }

        let n = read_some(stream, &mut chunk).await?;
        if n == 0 {
            return match split_chain(&buf)? {
                Some((chain, _)) => Ok(chain),
                None => Err(protocol("connection closed before certificates")),
            };
        }
        if buf.len() > MAX_RESPONSE * 4 {
            return Err(protocol("certificate chain too large"));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Read once, treating a TLS close without `close_notify` as end of stream.
async fn read_some<S: AsyncRead + Unpin>(stream: &mut S, chunk: &mut [u8]) -> Result<usize> {
    match stream.read(chunk).await {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// A response block is complete once its `RESPONSE=` line is terminated.
fn response_complete(text: &str) -> bool {
    text.find("RESPONSE=")
        .map(|at| text[at..].contains(['\n', '\0']))
        .unwrap_or(false)
}

/// Interpret a response block.
fn check_response(text: &str) -> Result<()> {
    let mut code = None;
    let mut errors = Vec::new();
    for line in text.split(['\n', '\0']) {
        if let Some(value) = line.strip_prefix("RESPONSE=") {
            code = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("ERROR=") {
            errors.push(value.trim().to_string());
        }
    }

    match code.as_deref() {
        Some("0") => Ok(()),
        Some(_) => {
            let reason = if errors.is_empty() {
                "request refused".to_string()
            } else {
                errors.join("; ")
            };
            let lower = reason.to_lowercase();
            if lower.contains("pass phrase")
                || lower.contains("password")
                || lower.contains("authentication failed")
            {
                Err(AuthError::InvalidCredentials.into())
            } else {
                Err(AuthError::DelegationRejected { reason }.into())
            }
        }
        None => Err(protocol("missing RESPONSE line")),
    }
}

/// Split `count || cert_1 || ... || cert_n || trailer` once every
/// certificate has fully arrived.
fn split_chain(buf: &[u8]) -> Result<Option<(Vec<Vec<u8>>, &[u8])>> {
    let Some((&count, mut rest)) = buf.split_first() else {
        return Ok(None);
    };
    if count == 0 {
        return Err(protocol("server returned no certificates"));
    }

    let mut chain = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match der_len(rest)? {
            Some(len) if len <= rest.len() => {
                chain.push(rest[..len].to_vec());
                rest = &rest[len..];
            }
            _ => return Ok(None),
        }
    }
    Ok(Some((chain, rest)))
}

/// Total encoded length of the DER SEQUENCE at the start of `bytes`, or
/// `None` if its header has not fully arrived.
fn der_len(bytes: &[u8]) -> Result<Option<usize>> {
    let Some(&tag) = bytes.first() else {
        return Ok(None);
    };
    if tag != 0x30 {
        return Err(protocol("certificate is not a DER sequence"));
    }
    let Some(&first) = bytes.get(1) else {
        return Ok(None);
    };
    if first & 0x80 == 0 {
        return Ok(Some(2 + first as usize));
    }

    let octets = (first & 0x7f) as usize;
    if octets == 0 || octets > 4 {
        return Err(protocol("unsupported DER length"));
    }
    let Some(len_bytes) = bytes.get(2..2 + octets) else {
        return Ok(None);
    };
    let len = len_bytes
        .iter()
        .fold(0usize, |acc, b| (acc << 8) | *b as usize);
    Ok(Some(2 + octets + len))
}

fn protocol(message: &str) -> esgf_core::Error {
    ResponseFormatError::Protocol {
        message: message.to_string(),
    }
    .into()
}

fn certificate_error(err: rcgen::Error) -> esgf_core::Error {
    ResponseFormatError::Certificate {
        message: err.to_string(),
    }
    .into()
}
