//! PKCS#12 archive loading.
//!
//! The archive path comes from the policy; the password does not. The policy
//! only names an environment variable, which is read at load time into a
//! zeroizing buffer. Decoded key material lives in memory only and is never
//! written back to any key storage.
//!
//! Reference: `p12-keystore` crate (MIT/Apache-2.0)

use std::path::Path;

use p12_keystore::KeyStore as Pkcs12;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{CoreError, Result};
use crate::identity::Identity;
use crate::policy::Policy;

/// Load the archive configured in the policy, if any.
pub fn load_from_policy(policy: &Policy) -> Result<Option<Identity>> {
    let Some(path) = policy.client_file_path.as_deref() else {
        debug!("no client archive configured");
        return Ok(None);
    };

    let password = read_password(policy.client_password_env.as_deref())?;
    load_archive(path, &password).map(Some)
}

/// Read the archive password from the named environment variable.
///
/// No variable name means the archive has an empty password. A name that is
/// configured but not set in the environment is an error.
fn read_password(var_name: Option<&str>) -> Result<Zeroizing<String>> {
    match var_name {
        None => Ok(Zeroizing::new(String::new())),
        Some(name) => std::env::var(name)
            .map(Zeroizing::new)
            .map_err(|_| CoreError::MissingPassword(name.to_string())),
    }
}

/// Decode a PKCS#12 file into an identity.
pub fn load_archive(path: &Path, password: &str) -> Result<Identity> {
    let data = Zeroizing::new(std::fs::read(path).map_err(|e| CoreError::io(path, e))?);
    decode_archive(&data, password)
}

/// Decode PKCS#12 bytes into an identity.
///
/// The first private-key entry of the archive is used; its chain becomes the
/// presented certificate chain.
pub fn decode_archive(data: &[u8], password: &str) -> Result<Identity> {
    let archive =
        Pkcs12::from_pkcs12(data, password).map_err(|e| CoreError::Archive(e.to_string()))?;

    let (alias, key_chain) = archive
        .private_key_chain()
        .ok_or_else(|| CoreError::Archive("archive contains no private key entry".into()))?;

    let chain: Vec<CertificateDer<'static>> = key_chain
        .chain()
        .iter()
        .map(|cert| CertificateDer::from(cert.as_der().to_vec()))
        .collect();
    if chain.is_empty() {
        return Err(CoreError::Archive(format!(
            "private key entry {alias} has no certificate"
        )));
    }

    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_chain.key().to_vec()));

    debug!(alias, chain_len = chain.len(), "loaded client archive");
    Ok(Identity::new(chain, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use p12_keystore::{Certificate as P12Certificate, KeyStoreEntry as P12Entry, PrivateKeyChain};
    use rcgen::{CertificateParams, KeyPair};

    use crate::tls::{build_client_tls_config, SystemRoots};

    /// A PKCS#12 archive holding one freshly issued client certificate.
    fn archive(password: &str) -> (Vec<u8>, CertificateDer<'static>) {
        let key = KeyPair::generate().expect("key gen");
        let cert = CertificateParams::new(vec!["client.test".into()])
            .expect("params")
            .self_signed(&key)
            .expect("self-signed");

        let chain = vec![P12Certificate::from_der(cert.der()).expect("p12 certificate")];
        let entry = PrivateKeyChain::new(key.serialize_der(), [1u8, 2, 3, 4], chain);
        let mut store = Pkcs12::new();
        store.add_entry("client", P12Entry::PrivateKeyChain(entry));
        let data = store.writer(password).write().expect("write archive");
        (data, cert.der().clone())
    }

    #[test]
    fn absent_path_is_no_identity() {
        let policy = Policy {
            client_password_env: Some("MTLS_ARCHIVE_TEST_UNUSED".into()),
            ..Policy::default()
        };
        assert!(load_from_policy(&policy).unwrap().is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let policy = Policy {
            client_file_path: Some(dir.path().join("client.p12")),
            ..Policy::default()
        };
        let result = load_from_policy(&policy);
        assert!(matches!(result, Err(CoreError::Io { .. })));
    }

    #[test]
    fn unset_password_variable_is_an_error() {
        let policy = Policy {
            client_file_path: Some(PathBuf::from("/nonexistent/client.p12")),
            client_password_env: Some("MTLS_ARCHIVE_TEST_PASSWORD_NEVER_SET".into()),
            ..Policy::default()
        };
        let result = load_from_policy(&policy);
        assert!(matches!(result, Err(CoreError::MissingPassword(name))
            if name == "MTLS_ARCHIVE_TEST_PASSWORD_NEVER_SET"));
    }

    #[test]
    fn corrupt_archive_is_an_error_not_no_identity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client.p12");
        std::fs::write(&path, b"definitely not DER").expect("write");

        std::env::set_var("MTLS_ARCHIVE_TEST_PASSWORD", "secret");
        let policy = Policy {
            client_file_path: Some(path),
            client_password_env: Some("MTLS_ARCHIVE_TEST_PASSWORD".into()),
            ..Policy::default()
        };
        let result = load_from_policy(&policy);
        std::env::remove_var("MTLS_ARCHIVE_TEST_PASSWORD");

        assert!(matches!(result, Err(CoreError::Archive(_))));
    }

    #[test]
    fn decoded_archive_is_usable_for_tls() {
        let (data, leaf) = archive("correct horse");

        let identity = decode_archive(&data, "correct horse").expect("decode");
        assert_eq!(identity.leaf(), Some(&leaf));

        let config = build_client_tls_config(
            Arc::new(Policy::default()),
            Some(identity),
            SystemRoots::empty(),
        )
        .expect("tls config");
        assert!(config.client_auth_cert_resolver.has_certs());
    }

    #[test]
    fn wrong_password_is_an_archive_error() {
        let (data, _) = archive("correct horse");
        let result = decode_archive(&data, "battery staple");
        assert!(matches!(result, Err(CoreError::Archive(_))));
    }

    #[test]
    fn archive_loads_from_policy_with_named_password_variable() {
        let (data, leaf) = archive("from-env");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client.p12");
        std::fs::write(&path, data).expect("write");

        std::env::set_var("MTLS_ARCHIVE_TEST_LOAD_PASSWORD", "from-env");
        let policy = Policy {
            client_file_path: Some(path),
            client_password_env: Some("MTLS_ARCHIVE_TEST_LOAD_PASSWORD".into()),
            ..Policy::default()
        };
        let result = load_from_policy(&policy);
        std::env::remove_var("MTLS_ARCHIVE_TEST_LOAD_PASSWORD");

        let identity = result.expect("load").expect("identity present");
        assert_eq!(identity.chain(), &[leaf]);
    }

    #[test]
    fn empty_password_when_no_variable_named() {
        let password = read_password(None).expect("empty password");
        assert!(password.is_empty());
    }
}
