//! Keystore lookup of client certificates by thumbprint.
//!
//! The [`KeyStore`] trait abstracts where certificate entries live. A store is
//! addressed by a scope ([`KeyStoreLocation`]) and a container name, and
//! returns that container's entries in its enumeration order.
//!
//! - [`MemoryKeyStore`]: in-memory, for tests and embedding applications
//! - [`DirectoryKeyStore`]: one directory per container, one PEM file per entry
//!
//! Lookup returns the first entry, in enumeration order, whose leaf
//! certificate matches the configured thumbprint and which carries a private
//! key. Matching entries without a key are skipped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::identity::Identity;
use crate::pem;
use crate::policy::{KeyStoreLocation, Policy};

/// One certificate entry of a keystore container.
pub struct KeyStoreEntry {
    /// Leaf first.
    pub chain: Vec<CertificateDer<'static>>,
    pub private_key: Option<PrivateKeyDer<'static>>,
}

impl KeyStoreEntry {
    pub fn new(
        chain: Vec<CertificateDer<'static>>,
        private_key: Option<PrivateKeyDer<'static>>,
    ) -> Self {
        Self { chain, private_key }
    }

    pub fn leaf(&self) -> Option<&CertificateDer<'static>> {
        self.chain.first()
    }
}

impl Clone for KeyStoreEntry {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            private_key: self.private_key.as_ref().map(PrivateKeyDer::clone_key),
        }
    }
}

impl std::fmt::Debug for KeyStoreEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStoreEntry")
            .field("chain_len", &self.chain.len())
            .field("has_private_key", &self.private_key.is_some())
            .finish()
    }
}

/// A source of certificate entries grouped into scoped, named containers.
///
/// Implementations must be `Send + Sync` so one store can be shared through
/// `Arc<dyn KeyStore>` by every factory in a process.
pub trait KeyStore: Send + Sync {
    /// Entries of a container in enumeration order. A container that does
    /// not exist has no entries.
    fn entries(&self, location: KeyStoreLocation, name: &str) -> Result<Vec<KeyStoreEntry>>;
}

/// Find the policy's client certificate in the keystore.
pub fn find_by_thumbprint(policy: &Policy, store: &dyn KeyStore) -> Result<Option<Identity>> {
    let Some(thumbprint) = policy.client_thumbprint.as_ref() else {
        debug!("no client thumbprint configured");
        return Ok(None);
    };

    let entries = store.entries(policy.keystore_location, &policy.keystore_name)?;

    let mut found: Option<Identity> = None;
    for entry in entries {
        let Some(leaf) = entry.leaf() else {
            continue;
        };
        if !thumbprint.matches(leaf) {
            continue;
        }
        let Some(key) = entry.private_key else {
            debug!(%thumbprint, "matching keystore entry has no private key, skipping");
            continue;
        };
        if found.is_some() {
            warn!(%thumbprint, "several keystore entries match the thumbprint, using the first");
            break;
        }
        found = Some(Identity::new(entry.chain, key));
    }

    if found.is_none() {
        warn!(
            %thumbprint,
            location = ?policy.keystore_location,
            container = %policy.keystore_name,
            "client certificate not found in keystore"
        );
    }
    Ok(found)
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory keystore backed by `RwLock<HashMap<..>>`.
pub struct MemoryKeyStore {
    containers: RwLock<HashMap<(KeyStoreLocation, String), Vec<KeyStoreEntry>>>,
}

impl MemoryKeyStore {
    /// Create an empty keystore.
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
        }
    }

    /// Append an entry to a container, creating the container if needed.
    pub fn insert(&self, location: KeyStoreLocation, name: &str, entry: KeyStoreEntry) {
        let mut containers = self
            .containers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        containers
            .entry((location, name.to_string()))
            .or_default()
            .push(entry);
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemoryKeyStore {
    fn entries(&self, location: KeyStoreLocation, name: &str) -> Result<Vec<KeyStoreEntry>> {
        let containers = self
            .containers
            .read()
            .map_err(|_| CoreError::KeyStore("keystore lock poisoned".into()))?;
        Ok(containers
            .get(&(location, name.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Directory-backed store
// ---------------------------------------------------------------------------

/// Directory-backed keystore.
///
/// Layout: `<root for location>/<container>/<entry>.pem`, where each entry
/// file holds the certificate chain as `CERTIFICATE` blocks (leaf first) and
/// optionally one PKCS#8 `PRIVATE KEY` block. Entries enumerate in ascending
/// file-name order.
#[derive(Debug, Clone)]
pub struct DirectoryKeyStore {
    user_root: PathBuf,
    machine_root: PathBuf,
}

impl DirectoryKeyStore {
    pub fn new(user_root: impl Into<PathBuf>, machine_root: impl Into<PathBuf>) -> Self {
        Self {
            user_root: user_root.into(),
            machine_root: machine_root.into(),
        }
    }

    /// Default roots: `$XDG_DATA_HOME/mtls/keystore` (or
    /// `$HOME/.local/share/mtls/keystore`) for the current user and
    /// `/etc/mtls/keystore` for the machine.
    pub fn platform() -> Self {
        let user_data = std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| Path::new(&home).join(".local/share")))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(user_data.join("mtls/keystore"), "/etc/mtls/keystore")
    }

    fn container_dir(&self, location: KeyStoreLocation, name: &str) -> PathBuf {
        let root = match location {
            KeyStoreLocation::CurrentUser => &self.user_root,
            KeyStoreLocation::LocalMachine => &self.machine_root,
        };
        root.join(name)
    }
}

impl KeyStore for DirectoryKeyStore {
    fn entries(&self, location: KeyStoreLocation, name: &str) -> Result<Vec<KeyStoreEntry>> {
        let dir = self.container_dir(location, name);
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "keystore container does not exist");
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(|e| CoreError::io(&dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "pem"))
            .collect();
        files.sort();

        files.iter().map(|path| read_entry_file(path)).collect()
    }
}

fn read_entry_file(path: &Path) -> Result<KeyStoreEntry> {
    let text = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
    let corrupt = |what: &str| CoreError::KeyStore(format!("{}: {what}", path.display()));

    let chain = pem::blocks(&text, pem::CERTIFICATE)
        .into_iter()
        .map(|block| block.map(CertificateDer::from))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| corrupt(&format!("bad certificate block ({e:?})")))?;
    if chain.is_empty() {
        return Err(corrupt("no certificate"));
    }

    let private_key = match pem::blocks(&text, pem::PRIVATE_KEY).into_iter().next() {
        None => None,
        Some(Ok(der)) => Some(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der))),
        Some(Err(e)) => return Err(corrupt(&format!("bad private key block ({e:?})"))),
    };

    Ok(KeyStoreEntry::new(chain, private_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ClientMode;
    use crate::thumbprint::Thumbprint;

    fn entry(cert: &[u8], with_key: bool) -> KeyStoreEntry {
        let key = with_key.then(|| PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(vec![7u8; 8])));
        KeyStoreEntry::new(vec![CertificateDer::from(cert.to_vec())], key)
    }

    fn policy_for(cert: &[u8]) -> Policy {
        Policy {
            client_mode: ClientMode::KeyStore,
            client_thumbprint: Thumbprint::parse(Thumbprint::sha1_of(cert).as_str()),
            ..Policy::default()
        }
    }

    #[test]
    fn finds_entry_with_matching_thumbprint() {
        let store = MemoryKeyStore::new();
        store.insert(KeyStoreLocation::CurrentUser, "My", entry(b"other", true));
        store.insert(KeyStoreLocation::CurrentUser, "My", entry(b"wanted", true));

        let identity = find_by_thumbprint(&policy_for(b"wanted"), &store)
            .unwrap()
            .expect("identity should be found");
        assert_eq!(identity.leaf().unwrap().as_ref(), b"wanted");
    }

    #[test]
    fn matching_entry_without_key_is_skipped() {
        let store = MemoryKeyStore::new();
        store.insert(KeyStoreLocation::CurrentUser, "My", entry(b"wanted", false));
        assert!(find_by_thumbprint(&policy_for(b"wanted"), &store).unwrap().is_none());

        store.insert(KeyStoreLocation::CurrentUser, "My", entry(b"wanted", true));
        let identity = find_by_thumbprint(&policy_for(b"wanted"), &store).unwrap();
        assert!(identity.is_some());
    }

    #[test]
    fn lookup_is_scoped_to_location_and_container() {
        let store = MemoryKeyStore::new();
        store.insert(KeyStoreLocation::LocalMachine, "My", entry(b"wanted", true));
        store.insert(KeyStoreLocation::CurrentUser, "Other", entry(b"wanted", true));

        assert!(find_by_thumbprint(&policy_for(b"wanted"), &store).unwrap().is_none());

        let machine = Policy {
            keystore_location: KeyStoreLocation::LocalMachine,
            ..policy_for(b"wanted")
        };
        assert!(find_by_thumbprint(&machine, &store).unwrap().is_some());
    }

    #[test]
    fn sha256_thumbprints_are_accepted() {
        let store = MemoryKeyStore::new();
        store.insert(KeyStoreLocation::CurrentUser, "My", entry(b"wanted", true));
        let policy = Policy {
            client_thumbprint: Thumbprint::parse(&Thumbprint::sha256_of(b"wanted").as_str().to_lowercase()),
            ..policy_for(b"wanted")
        };
        assert!(find_by_thumbprint(&policy, &store).unwrap().is_some());
    }

    #[test]
    fn directory_store_reads_sorted_pem_entries() {
        let root = tempfile::tempdir().expect("tempdir");
        let container = root.path().join("user/My");
        std::fs::create_dir_all(&container).expect("mkdir");

        let with_key = format!(
            "{}{}",
            pem::encode(pem::CERTIFICATE, b"second"),
            pem::encode(pem::PRIVATE_KEY, b"key")
        );
        std::fs::write(container.join("b.pem"), with_key).expect("write");
        std::fs::write(container.join("a.pem"), pem::encode(pem::CERTIFICATE, b"first"))
            .expect("write");
        std::fs::write(container.join("notes.txt"), "ignored").expect("write");

        let store = DirectoryKeyStore::new(root.path().join("user"), root.path().join("machine"));
        let entries = store.entries(KeyStoreLocation::CurrentUser, "My").unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].leaf().unwrap().as_ref(), b"first");
        assert!(entries[0].private_key.is_none());
        assert_eq!(entries[1].leaf().unwrap().as_ref(), b"second");
        assert!(entries[1].private_key.is_some());
    }

    #[test]
    fn directory_store_missing_container_is_empty() {
        let root = tempfile::tempdir().expect("tempdir");
        let store = DirectoryKeyStore::new(root.path(), root.path());
        let entries = store.entries(KeyStoreLocation::LocalMachine, "Nope").unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn directory_store_corrupt_entry_is_an_error() {
        let root = tempfile::tempdir().expect("tempdir");
        let container = root.path().join("My");
        std::fs::create_dir_all(&container).expect("mkdir");
        std::fs::write(container.join("broken.pem"), "no blocks at all").expect("write");

        let store = DirectoryKeyStore::new(root.path(), root.path());
        let result = store.entries(KeyStoreLocation::CurrentUser, "My");
        assert!(matches!(result, Err(CoreError::KeyStore(_))));
    }
}
