//! On-disk credential files.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, instrument};

use esgf_core::Result;

use crate::certificate::Certificate;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

/// Certificate chain and key in grid proxy layout, owner-only.
pub const CREDENTIALS_FILE: &str = "credentials.pem";

/// Client identity bundle for TLS clients.
pub const KEYSTORE_FILE: &str = "keystore.pem";

/// Federation trust roots.
pub const TRUST_ROOTS_FILE: &str = "trustroots.pem";

const LOCK_FILE: &str = ".credentials.lock";

/// Directory holding the credential, keystore and trust root files.
///
/// Writers take an exclusive advisory lock so two processes never
/// interleave a credential with another's keystore.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.root.join(CREDENTIALS_FILE)
    }

    pub fn keystore_path(&self) -> PathBuf {
        self.root.join(KEYSTORE_FILE)
    }

    pub fn trust_roots_path(&self) -> PathBuf {
        self.root.join(TRUST_ROOTS_FILE)
    }

    /// Persist a certificate as both the credential file and the keystore.
    #[instrument(skip(self, certificate), fields(root = %self.root.display()))]
    pub fn save_certificate(&self, certificate: &Certificate) -> Result<()> {
        self.locked(|| {
            write_private(&self.credentials_path(), &certificate.to_credential_pem())?;
            write_private(&self.keystore_path(), &certificate.to_keystore_pem())?;
            Ok(())
        })?;
        debug!(subject = certificate.subject(), "certificate saved");
        Ok(())
    }

    /// Load the persisted certificate, if any.
    pub fn load_certificate(&self) -> Result<Option<Certificate>> {
        let path = self.keystore_path();
        if !path.exists() {
            return Ok(None);
        }
        let pem = fs::read_to_string(&path)?;
        Certificate::from_pem(&pem).map(Some)
    }

    /// Persist the trust root bundle.
    pub fn save_trust_roots(&self, pem: &str) -> Result<()> {
        self.locked(|| {
            fs::write(self.trust_roots_path(), pem)?;
            Ok(())
        })
    }

    pub fn load_trust_roots(&self) -> Result<Option<String>> {
        let path = self.trust_roots_path();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path)?))
    }

    /// Whether both the credential and the keystore file exist.
    pub fn has_certificate(&self) -> bool {
        self.credentials_path().exists() && self.keystore_path().exists()
    }

    /// Delete all credential files.
    pub fn clear(&self) -> Result<()> {
        self.locked(|| {
            for path in [
                self.credentials_path(),
                self.keystore_path(),
                self.trust_roots_path(),
            ] {
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
            Ok(())
        })
    }

    fn locked<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        fs::create_dir_all(&self.root)?;
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.root.join(LOCK_FILE))?;

        lock_file.lock_exclusive()?;
        let result = f();
        lock_file.unlock()?;
        result
    }
}

/// Write a file readable by the owner only.
///
/// A new file is created with mode 0600; an existing one is narrowed to 0600
/// before any contents are written.
fn write_private(path: &Path, contents: &str) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path)?;

    #[cfg(unix)]
    file.set_permissions(fs::Permissions::from_mode(0o600))?;

    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};
    use tempfile::TempDir;

    fn certificate() -> Certificate {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, "alice");
        let cert = params.self_signed(&key).unwrap();
        Certificate::from_parts(vec![cert.der().to_vec()], key.serialize_pem()).unwrap()
    }

    #[test]
    fn round_trips_certificate() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("certs"));
        assert!(store.load_certificate().unwrap().is_none());

        let cert = certificate();
        store.save_certificate(&cert).unwrap();

        assert!(store.has_certificate());
        let loaded = store.load_certificate().unwrap().unwrap();
        assert_eq!(loaded.chain(), cert.chain());
        assert_eq!(loaded.subject(), cert.subject());
    }

    #[cfg(unix)]
    #[test]
    fn credential_files_are_owner_only() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path());
        store.save_certificate(&certificate()).unwrap();

        for path in [store.credentials_path(), store.keystore_path()] {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{}", path.display());
        }
    }

    #[cfg(unix)]
    #[test]
    fn loose_existing_file_is_narrowed() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path());
        fs::write(store.credentials_path(), "stale").unwrap();
        fs::set_permissions(store.credentials_path(), fs::Permissions::from_mode(0o644)).unwrap();

        store.save_certificate(&certificate()).unwrap();

        let mode = fs::metadata(store.credentials_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let pem = fs::read_to_string(store.credentials_path()).unwrap();
        assert!(!pem.contains("stale"));
    }

    #[cfg(unix)]
    #[test]
    fn new_private_file_is_created_owner_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key.pem");
        write_private(&path, "secret").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path());
        store.save_certificate(&certificate()).unwrap();
        store.save_trust_roots("roots").unwrap();

        store.clear().unwrap();
        assert!(!store.has_certificate());
        assert!(store.load_trust_roots().unwrap().is_none());
    }
}
