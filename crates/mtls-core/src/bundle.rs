//! PEM trust bundles.
//!
//! A bundle file is a concatenation of certificate blocks. Each block is
//! decoded and parsed independently; a block that fails either step is
//! dropped and the rest of the file still loads. Dropping a block can shrink
//! the effective set of trust anchors without any error reaching the caller.
//!
//! Parsed certificates are classified at load time:
//! - subject DN string equal to issuer DN string: root (trust anchor) candidate
//! - anything else: intermediate / cross certificate, used only for path building

use std::path::Path;

use rustls_pki_types::{CertificateDer, UnixTime};
use tracing::debug;
use x509_parser::prelude::*;

use crate::error::{CoreError, Result};
use crate::pem;

/// A certificate from a bundle with its names pre-rendered.
#[derive(Debug, Clone)]
pub struct BundleCertificate {
    der: CertificateDer<'static>,
    subject: String,
    issuer: String,
    not_before: i64,
    not_after: i64,
}

impl BundleCertificate {
    /// Parse a DER certificate.
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        let (subject, issuer, not_before, not_after) = {
            let (_, cert) = X509Certificate::from_der(&der)
                .map_err(|e| CoreError::CertificateParse(format!("X.509 parse error: {e}")))?;
            let validity = cert.validity();
            (
                cert.subject().to_string(),
                cert.issuer().to_string(),
                validity.not_before.timestamp(),
                validity.not_after.timestamp(),
            )
        };
        Ok(Self {
            der: CertificateDer::from(der),
            subject,
            issuer,
            not_before,
            not_after,
        })
    }

    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// `now` lies within NotBefore..=NotAfter.
    pub fn is_valid_at(&self, now: UnixTime) -> bool {
        let now = i64::try_from(now.as_secs()).unwrap_or(i64::MAX);
        self.not_before <= now && now <= self.not_after
    }

    /// Subject and issuer render to the same string.
    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }
}

/// Certificates loaded from one bundle file, in file order.
#[derive(Debug, Clone, Default)]
pub struct TrustBundle {
    certificates: Vec<BundleCertificate>,
    skipped: usize,
}

impl TrustBundle {
    /// Read and parse a bundle file. Only failing to read the file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read(path).map_err(|e| CoreError::io(path, e))?;
        let bundle = Self::from_pem(&String::from_utf8_lossy(&text));
        debug!(
            path = %path.display(),
            loaded = bundle.certificates.len(),
            skipped = bundle.skipped,
            "loaded trust bundle"
        );
        Ok(bundle)
    }

    /// Parse bundle text already in memory.
    pub fn from_pem(text: &str) -> Self {
        let mut bundle = Self::default();

        for (index, block) in pem::blocks(text, pem::CERTIFICATE).into_iter().enumerate() {
            let parsed = block
                .map_err(|e| format!("{e:?}"))
                .and_then(|der| BundleCertificate::from_der(der).map_err(|e| e.to_string()));
            match parsed {
                Ok(cert) => bundle.certificates.push(cert),
                Err(reason) => {
                    debug!(index, %reason, "skipping malformed bundle entry");
                    bundle.skipped += 1;
                }
            }
        }

        bundle
    }

    /// All parsed certificates, in file order.
    pub fn certificates(&self) -> &[BundleCertificate] {
        &self.certificates
    }

    /// Self-signed root candidates.
    pub fn roots(&self) -> impl Iterator<Item = &BundleCertificate> {
        self.certificates.iter().filter(|c| c.is_self_signed())
    }

    /// Intermediate and cross certificates.
    pub fn intermediates(&self) -> impl Iterator<Item = &BundleCertificate> {
        self.certificates.iter().filter(|c| !c.is_self_signed())
    }

    /// Number of blocks dropped while loading.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}
