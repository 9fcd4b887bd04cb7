//! Client identity sourcing: the certificate and private key presented to
//! servers during the mTLS handshake.
//!
//! Two mutually exclusive strategies, selected by [`ClientMode`]:
//!
//! - [`archive`]: a password-protected PKCS#12 file; the password is read
//!   from an environment variable whose *name* is configured
//! - [`keystore`]: an entry looked up by thumbprint in a scoped, named
//!   keystore container
//!
//! "No identity" (`Ok(None)`) is a valid outcome when nothing is configured
//! or the configured thumbprint is not present. Failures to decode key
//! material are always errors.

pub mod archive;
pub mod keystore;

use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::Result;
use crate::policy::{ClientMode, Policy};

pub use keystore::{DirectoryKeyStore, KeyStore, KeyStoreEntry, MemoryKeyStore};

/// A client certificate chain (leaf first) and its private key.
///
/// Kept in process memory only; handed by value to the TLS config builder.
pub struct Identity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl Identity {
    pub fn new(chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self { chain, key }
    }

    /// The leaf certificate.
    pub fn leaf(&self) -> Option<&CertificateDer<'static>> {
        self.chain.first()
    }

    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// Split into the parts rustls consumes.
    pub fn into_parts(self) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        (self.chain, self.key)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// Load the client identity selected by the policy.
pub fn load_client_identity(policy: &Policy, store: &dyn KeyStore) -> Result<Option<Identity>> {
    match policy.client_mode {
        ClientMode::File => archive::load_from_policy(policy),
        ClientMode::KeyStore => keystore::find_by_thumbprint(policy, store),
    }
}
