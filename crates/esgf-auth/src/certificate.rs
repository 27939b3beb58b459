//! Delegated X.509 certificate and its private key.

use std::fmt;
use std::io::BufReader;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use rustls::pki_types::PrivateKeyDer;
use x509_parser::parse_x509_certificate;

use esgf_core::Result;
use esgf_core::error::ResponseFormatError;

/// A client certificate chain with its private key.
///
/// The leaf certificate's validity window and subject are parsed once at
/// construction. The key is never exposed in Debug output.
#[derive(Clone)]
pub struct Certificate {
    chain: Vec<Vec<u8>>,
    key_pem: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    subject: String,
    common_names: Vec<String>,
}

impl Certificate {
    /// Build from DER certificates (leaf first) and a PEM private key.
    pub fn from_parts(chain: Vec<Vec<u8>>, key_pem: impl Into<String>) -> Result<Self> {
        let leaf = chain.first().ok_or_else(|| invalid("empty certificate chain"))?;
        let (_, cert) =
            parse_x509_certificate(leaf).map_err(|e| invalid(&format!("leaf certificate: {}", e)))?;

        let validity = cert.validity();
        let not_before = timestamp(validity.not_before.timestamp())?;
        let not_after = timestamp(validity.not_after.timestamp())?;
        let subject = cert.subject().to_string();
        let common_names = cert
            .subject()
            .iter_common_name()
            .filter_map(|cn| cn.as_str().ok())
            .map(str::to_string)
            .collect();

        Ok(Self {
            chain,
            key_pem: key_pem.into(),
            not_before,
            not_after,
            subject,
            common_names,
        })
    }

    /// Parse a PEM bundle holding one private key and one or more certificates
    /// in any order.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let chain = rustls_pemfile::certs(&mut BufReader::new(pem.as_bytes()))
            .map(|cert| cert.map(|der| der.to_vec()))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| invalid(&e.to_string()))?;

        let key = rustls_pemfile::private_key(&mut BufReader::new(pem.as_bytes()))
            .map_err(|e| invalid(&e.to_string()))?
            .ok_or_else(|| invalid("no private key"))?;

        Self::from_parts(chain, key_to_pem(&key))
    }

    /// Split a concatenation of DER certificates, as returned by a
    /// delegation service, into individual certificates.
    pub fn split_der_chain(mut bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut chain = Vec::new();
        while !bytes.is_empty() {
            let (rest, _) =
                parse_x509_certificate(bytes).map_err(|e| invalid(&format!("chain: {}", e)))?;
            let consumed = bytes.len() - rest.len();
            chain.push(bytes[..consumed].to_vec());
            bytes = rest;
        }
        Ok(chain)
    }

    /// DER certificates, leaf first.
    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Subject distinguished name of the leaf certificate.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn common_names(&self) -> &[String] {
        &self.common_names
    }

    /// Whether the certificate is inside its validity window at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_before && now < self.not_after
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        (self.not_after - Utc::now()).max(Duration::zero())
    }

    /// Grid proxy layout: leaf certificate, private key, then the rest of
    /// the chain.
    pub fn to_credential_pem(&self) -> String {
        let mut out = String::new();
        let mut certs = self.chain.iter();
        if let Some(leaf) = certs.next() {
            out.push_str(&pem_encode("CERTIFICATE", leaf));
        }
        out.push_str(&self.key_pem);
        ensure_newline(&mut out);
        for cert in certs {
            out.push_str(&pem_encode("CERTIFICATE", cert));
        }
        out
    }

    /// Client identity bundle: private key followed by the full chain.
    pub fn to_keystore_pem(&self) -> String {
        let mut out = self.key_pem.clone();
        ensure_newline(&mut out);
        for cert in &self.chain {
            out.push_str(&pem_encode("CERTIFICATE", cert));
        }
        out
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("chain_len", &self.chain.len())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Encode DER bytes as a PEM block.
pub(crate) fn pem_encode(label: &str, der: &[u8]) -> String {
    let b64 = STANDARD.encode(der);
    let mut out = format!("-----BEGIN {}-----\n", label);
    for line in b64.as_bytes().chunks(64) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", label));
    out
}

fn key_to_pem(key: &PrivateKeyDer<'_>) -> String {
    let label = match key {
        PrivateKeyDer::Pkcs1(_) => "RSA PRIVATE KEY",
        PrivateKeyDer::Sec1(_) => "EC PRIVATE KEY",
        _ => "PRIVATE KEY",
    };
    pem_encode(label, key.secret_der())
}

fn ensure_newline(s: &mut String) {
    if !s.is_empty() && !s.ends_with('\n') {
        s.push('\n');
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| invalid(&format!("timestamp {} out of range", secs)).into())
}

fn invalid(message: &str) -> ResponseFormatError {
    ResponseFormatError::Certificate {
        message: message.to_string(),
    }
}
