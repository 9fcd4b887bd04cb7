//! TLS configuration builder for outbound mTLS clients.
//!
//! Constructs a `rustls::ClientConfig` with:
//! - Ring crypto provider
//! - Protocol versions from the policy's TLS floor
//! - [`PolicyServerCertVerifier`] in place of default server verification
//! - The client identity, when one was loaded
//! - ALPN `http/1.1`

use std::sync::Arc;

use rustls::client::danger::ServerCertVerifier;
use rustls::SupportedProtocolVersion;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::identity::Identity;
use crate::policy::{Policy, TlsFloor};
use crate::tls::roots::SystemRoots;
use crate::tls::verifier::PolicyServerCertVerifier;

/// ALPN protocol identifier offered to servers.
pub const ALPN_HTTP1: &[u8] = b"http/1.1";

static TLS12_AND_UP: &[&SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];
static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// Protocol versions permitted by a TLS floor.
pub fn protocol_versions(floor: TlsFloor) -> &'static [&'static SupportedProtocolVersion] {
    match floor {
        TlsFloor::Tls12 => TLS12_AND_UP,
        TlsFloor::Tls13 => TLS13_ONLY,
    }
}

/// Build a `rustls::ClientConfig` for the policy.
///
/// With `identity` the config presents that certificate chain when the
/// server requests client authentication; without it no certificate is sent.
pub fn build_client_tls_config(
    policy: Arc<Policy>,
    identity: Option<Identity>,
    roots: SystemRoots,
) -> Result<rustls::ClientConfig> {
    let versions = protocol_versions(policy.min_tls_version);
    let verifier: Arc<dyn ServerCertVerifier> =
        Arc::new(PolicyServerCertVerifier::new(policy, roots));

    let builder = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_protocol_versions(versions)
    .map_err(|e| CoreError::TlsConfiguration(format!("TLS version config: {e}")))?
    .dangerous()
    .with_custom_certificate_verifier(verifier);

    let mut config = match identity {
        Some(identity) => {
            let (chain, key) = identity.into_parts();
            debug!(chain_len = chain.len(), "presenting client certificate");
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| CoreError::TlsConfiguration(format!("client cert config: {e}")))?
        }
        None => builder.with_no_client_auth(),
    };

    config.alpn_protocols = vec![ALPN_HTTP1.to_vec()];

    Ok(config)
}
