//! System trust anchors.
//!
//! The baseline trust evaluation uses the bundled Mozilla root program
//! (`webpki-roots`) together with whatever the operating system's
//! certificate store provides (`rustls-native-certs`).

use std::sync::Arc;

use rustls_pki_types::{CertificateDer, TrustAnchor};
use tracing::{debug, warn};

/// Immutable set of trust anchors, cheap to clone.
#[derive(Clone)]
pub struct SystemRoots {
    anchors: Arc<[TrustAnchor<'static>]>,
}

impl SystemRoots {
    /// Load the Mozilla roots plus the platform's native roots.
    ///
    /// Unreadable or unparsable native certificates are skipped.
    pub fn load() -> Self {
        let mut anchors: Vec<TrustAnchor<'static>> = webpki_roots::TLS_SERVER_ROOTS.to_vec();

        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            warn!(error = %error, "error loading native root certificates");
        }
        let mut skipped = 0usize;
        for cert in &native.certs {
            match webpki::anchor_from_trusted_cert(cert) {
                Ok(anchor) => anchors.push(anchor.to_owned()),
                Err(_) => skipped += 1,
            }
        }

        debug!(
            anchors = anchors.len(),
            native = native.certs.len(),
            skipped,
            "loaded system trust anchors"
        );
        Self {
            anchors: anchors.into(),
        }
    }

    /// Anchors from explicit certificates; entries that are not valid
    /// anchors are ignored.
    pub fn from_certificates<'a>(certs: impl IntoIterator<Item = &'a CertificateDer<'a>>) -> Self {
        let anchors: Vec<TrustAnchor<'static>> = certs
            .into_iter()
            .filter_map(|cert| webpki::anchor_from_trusted_cert(cert).ok())
            .map(|anchor| anchor.to_owned())
            .collect();
        Self {
            anchors: anchors.into(),
        }
    }

    /// No anchors at all: every baseline evaluation fails.
    pub fn empty() -> Self {
        Self {
            anchors: Arc::from(Vec::new()),
        }
    }

    pub fn anchors(&self) -> &[TrustAnchor<'static>] {
        &self.anchors
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

impl std::fmt::Debug for SystemRoots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemRoots")
            .field("anchors", &self.anchors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};

    #[test]
    fn bundled_roots_are_present() {
        let roots = SystemRoots::load();
        assert!(roots.len() >= webpki_roots::TLS_SERVER_ROOTS.len());
    }

    #[test]
    fn explicit_certificates_become_anchors() {
        let key = KeyPair::generate().expect("key gen");
        let mut params = CertificateParams::new(vec![]).expect("params");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).expect("self-signed");

        let garbage = CertificateDer::from(vec![0u8; 8]);
        let roots = SystemRoots::from_certificates([cert.der(), &garbage]);
        assert_eq!(roots.len(), 1);
    }

    #[test]
    fn empty_has_no_anchors() {
        assert!(SystemRoots::empty().is_empty());
    }
}
