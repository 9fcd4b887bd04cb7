//! rustls adapter for the server validation engine.
//!
//! [`PolicyServerCertVerifier`] replaces the default certificate verification
//! of the client TLS stack. For every handshake it assembles a
//! [`ValidationContext`] whose baseline is the system-trust evaluation (path
//! to [`SystemRoots`] plus hostname match) and maps the engine's boolean
//! verdict to a rustls result.
//!
//! Signature verification is delegated to the rustls ring crypto provider.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{CertificateError, DigitallySignedStruct, Error as TlsError, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

use crate::policy::Policy;
use crate::tls::roots::SystemRoots;
use crate::tls::signature_algorithms;
use crate::validation::{self, chain, TrustFailure, ValidationContext};

/// Server certificate verifier driven by a resolved [`Policy`].
#[derive(Debug)]
pub struct PolicyServerCertVerifier {
    policy: Arc<Policy>,
    roots: SystemRoots,
}

impl PolicyServerCertVerifier {
    pub fn new(policy: Arc<Policy>, roots: SystemRoots) -> Self {
        Self { policy, roots }
    }
}

impl ServerCertVerifier for PolicyServerCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        let baseline = || -> Result<(), TrustFailure> {
            chain::system_baseline(
                end_entity,
                intermediates,
                server_name,
                self.roots.anchors(),
                now,
                &self.policy,
            )
        };

        let ctx = ValidationContext {
            peer: Some(end_entity),
            intermediates,
            baseline: &baseline,
            now,
            policy: &self.policy,
        };

        if validation::validate(&ctx) {
            Ok(ServerCertVerified::assertion())
        } else {
            // One undifferentiated failure; the reason is only logged.
            Err(TlsError::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, signature_algorithms())
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, signature_algorithms())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        signature_algorithms().supported_schemes()
    }
}
