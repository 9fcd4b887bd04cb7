//! Integration tests: from raw settings to a handshake verdict.
//!
//! Settings are resolved into a `Policy`, the client identity is read from a
//! directory keystore on disk, and server certificates are run through the
//! rustls verifier adapter exactly as a handshake would.

use std::collections::HashMap;
use std::sync::Arc;

use mtls_core::identity::{self, DirectoryKeyStore};
use mtls_core::pem;
use mtls_core::policy::{keys, ClientMode, KeyStoreLocation, RevocationMode};
use mtls_core::thumbprint::Thumbprint;
use mtls_core::tls::{build_client_tls_config, PolicyServerCertVerifier, SystemRoots};
use mtls_core::Policy;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use rustls::client::danger::ServerCertVerifier;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .try_init();
}

fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

struct Ca {
    cert: rcgen::Certificate,
    key: KeyPair,
}

fn ca(cn: &str) -> Ca {
    let key = KeyPair::generate().expect("key gen");
    let mut params = CertificateParams::new(vec![]).expect("params");
    params.distinguished_name.push(DnType::CommonName, cn);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let cert = params.self_signed(&key).expect("ca");
    Ca { cert, key }
}

fn issue(ca: &Ca, host: &str) -> (CertificateDer<'static>, KeyPair) {
    let key = KeyPair::generate().expect("key gen");
    let cert = CertificateParams::new(vec![host.to_string()])
        .expect("params")
        .signed_by(&key, &ca.cert, &ca.key)
        .expect("leaf");
    (cert.der().clone(), key)
}

fn verdict(policy: Policy, leaf: &CertificateDer<'_>, host: &str) -> bool {
    let verifier = PolicyServerCertVerifier::new(Arc::new(policy), SystemRoots::empty());
    let name = ServerName::try_from(host.to_string()).expect("server name");
    verifier
        .verify_server_cert(leaf, &[], &name, &[], UnixTime::now())
        .is_ok()
}

#[test]
fn keystore_identity_and_bundle_from_settings() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");

    // Client certificate stored as a keystore entry file.
    let client_ca = ca("Client CA");
    let (client_leaf, client_key) = issue(&client_ca, "client.test");
    let container = dir.path().join("machine").join("Services");
    std::fs::create_dir_all(&container).expect("container");
    std::fs::write(
        container.join("10-client.pem"),
        format!(
            "{}{}",
            pem::encode(pem::CERTIFICATE, &client_leaf),
            pem::encode(pem::PRIVATE_KEY, &client_key.serialize_der()),
        ),
    )
    .expect("entry file");

    // Server trust bundle.
    let server_ca = ca("Internal Server CA");
    let (server_leaf, _) = issue(&server_ca, "api.internal.test");
    let bundle = dir.path().join("bundle.pem");
    std::fs::write(&bundle, server_ca.cert.pem()).expect("bundle");

    let thumbprint = Thumbprint::sha1_of(&client_leaf);
    let client_pin = thumbprint.as_str().to_lowercase();
    let bundle_path = bundle.display().to_string();
    let source = settings(&[
        (keys::CLIENT_MODE, "keystore"),
        (keys::KEYSTORE_LOCATION, "LocalMachine"),
        (keys::KEYSTORE_NAME, "Services"),
        (keys::CLIENT_THUMBPRINT, &client_pin),
        (keys::REVOCATION_MODE, "NoCheck"),
        (keys::ISSUER_CN, "internal server ca"),
        (keys::CA_BUNDLE_PATH, &bundle_path),
    ]);
    let policy = Policy::resolve(&source);
    assert_eq!(policy.client_mode, ClientMode::KeyStore);
    assert_eq!(policy.keystore_location, KeyStoreLocation::LocalMachine);
    assert_eq!(policy.revocation_mode, RevocationMode::NoCheck);

    let store = DirectoryKeyStore::new(dir.path().join("user"), dir.path().join("machine"));
    let identity = identity::load_client_identity(&policy, &store)
        .expect("load identity")
        .expect("identity present");
    assert_eq!(identity.leaf(), Some(&client_leaf));

    let config =
        build_client_tls_config(Arc::new(policy.clone()), Some(identity), SystemRoots::empty())
            .expect("tls config");
    assert!(config.client_auth_cert_resolver.has_certs());

    // Bundle trust ignores the hostname; the issuer constraint still applies.
    assert!(verdict(policy.clone(), &server_leaf, "other-name.test"));

    let (foreign_leaf, _) = issue(&ca("Internal Server CA"), "api.internal.test");
    assert!(!verdict(policy, &foreign_leaf, "api.internal.test"));
}

#[test]
fn unparsable_settings_fail_closed() {
    init_tracing();
    let ca = ca("Any CA");
    let (leaf, _) = issue(&ca, "svc.test");

    let source = settings(&[
        (keys::STRICT_VALIDATION, "maybe"),
        (keys::REVOCATION_MODE, "sometimes"),
    ]);
    let policy = Policy::resolve(&source);
    assert!(policy.strict_validation);
    assert_eq!(policy.revocation_mode, RevocationMode::Online);

    // Strict and no system anchor for this CA.
    assert!(!verdict(policy, &leaf, "svc.test"));

    let relaxed = Policy::resolve(&settings(&[(keys::STRICT_VALIDATION, "false")]));
    assert!(verdict(relaxed, &leaf, "svc.test"));
}
