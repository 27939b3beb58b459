//! Federation trust roots.

use std::io::BufReader;

use rustls::RootCertStore;
use tracing::{debug, instrument};

use esgf_core::Result;
use esgf_core::error::{ResponseFormatError, TransportError};

use crate::transport;

/// Download the federation trust root bundle and check it holds at least
/// one usable certificate.
#[instrument(skip(http))]
pub async fn fetch_trust_roots(http: &reqwest::Client, url: &str) -> Result<String> {
    let response = http.get(url).send().await.map_err(transport)?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        }
        .into());
    }

    let pem = response.text().await.map_err(transport)?;
    let roots = root_store(&pem)?;
    debug!(roots = roots.len(), "trust roots fetched");
    Ok(pem)
}

/// Build a rustls root store from a PEM bundle.
pub fn root_store(pem: &str) -> Result<RootCertStore> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem.as_bytes()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| ResponseFormatError::Certificate {
            message: format!("trust roots: {}", e),
        })?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(ResponseFormatError::Certificate {
            message: format!("trust roots: no usable certificates ({} ignored)", ignored),
        }
        .into());
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, IsCa, BasicConstraints, KeyPair};

    fn ca_pem() -> String {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn builds_root_store() {
        let bundle = format!("{}{}", ca_pem(), ca_pem());
        assert_eq!(root_store(&bundle).unwrap().len(), 2);
    }

    #[test]
    fn empty_bundle_is_rejected() {
        assert!(root_store("").is_err());
        assert!(root_store("<html>not found</html>").is_err());
    }
}
