//! rustls integration for outbound mTLS connections.
//!
//! - [`roots`]: the system trust anchors used for baseline evaluation
//! - [`verifier`]: adapter feeding each handshake into [`crate::validation`]
//! - [`config`]: `rustls::ClientConfig` builder for a resolved policy

pub mod config;
pub mod roots;
pub mod verifier;

use std::sync::LazyLock;

use rustls::crypto::WebPkiSupportedAlgorithms;

pub use config::build_client_tls_config;
pub use roots::SystemRoots;
pub use verifier::PolicyServerCertVerifier;

/// The ring provider's supported signature verification algorithms.
pub fn signature_algorithms() -> &'static WebPkiSupportedAlgorithms {
    static ALGORITHMS: LazyLock<WebPkiSupportedAlgorithms> = LazyLock::new(|| {
        rustls::crypto::ring::default_provider().signature_verification_algorithms
    });
    &ALGORITHMS
}
