//! Certification path building against an explicit set of trust anchors.
//!
//! Delegates to `rustls-webpki`: the end-entity certificate must chain through
//! the supplied intermediates to one of the anchors, be valid at `now`, and
//! (when CRLs are supplied) not be revoked anywhere along the path. Unknown
//! revocation status is a failure.
//!
//! Extended key usage is not assessed. webpki always checks one purpose, so a
//! path rejected only for a missing EKU is retried with each of the standard
//! purposes before giving up.

use rustls_pki_types::{CertificateDer, ServerName, TrustAnchor, UnixTime};
use webpki::{EndEntityCert, KeyUsage, RevocationCheckDepth, RevocationOptionsBuilder, UnknownStatusPolicy};

use crate::policy::Policy;
use crate::revocation::{self, RevocationCheck};
use crate::tls::signature_algorithms;

/// DER contents of the purposes a path is tried for, server auth first.
const PURPOSES: &[&[u8]] = &[
    &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x01], // serverAuth
    &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x02], // clientAuth
    &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x03], // codeSigning
    &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x04], // emailProtection
    &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x08], // timeStamping
    &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x09], // OCSPSigning
    &[0x55, 0x1d, 0x25, 0x00],                         // anyExtendedKeyUsage
];

/// Why a certification path could not be established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustFailure {
    Path(webpki::Error),
    RevocationUnavailable,
}

impl std::fmt::Display for TrustFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(e) => write!(f, "{e}"),
            Self::RevocationUnavailable => f.write_str("revocation status unavailable"),
        }
    }
}

/// Build and verify a path from `leaf` to one of `anchors`.
pub fn verify_path(
    leaf: &CertificateDer<'_>,
    anchors: &[TrustAnchor<'_>],
    intermediates: &[CertificateDer<'_>],
    now: UnixTime,
    revocation: &RevocationCheck,
) -> Result<(), TrustFailure> {
    let end_entity = EndEntityCert::try_from(leaf).map_err(TrustFailure::Path)?;

    let crl_refs: Vec<_> = match revocation {
        RevocationCheck::Crls(crls) => crls.iter().collect(),
        RevocationCheck::Disabled => Vec::new(),
        RevocationCheck::Unavailable => return Err(TrustFailure::RevocationUnavailable),
    };
    let options = match revocation {
        RevocationCheck::Crls(_) => Some(
            RevocationOptionsBuilder::new(&crl_refs)
                .map_err(|_| TrustFailure::RevocationUnavailable)?
                .with_depth(RevocationCheckDepth::Chain)
                .with_status_policy(UnknownStatusPolicy::Deny)
                .build(),
        ),
        _ => None,
    };

    for &purpose in PURPOSES {
        let result = end_entity.verify_for_usage(
            signature_algorithms().all,
            anchors,
            intermediates,
            now,
            KeyUsage::required_if_present(purpose),
            options.clone(),
            None,
        );
        match result {
            Ok(_) => return Ok(()),
            Err(webpki::Error::RequiredEkuNotFound) => continue,
            Err(e) => return Err(TrustFailure::Path(e)),
        }
    }
    Err(TrustFailure::Path(webpki::Error::RequiredEkuNotFound))
}

/// Baseline trust: path to the system anchors, revocation per policy, and
/// the certificate must be valid for the name the client connected to.
pub fn system_baseline(
    leaf: &CertificateDer<'_>,
    intermediates: &[CertificateDer<'_>],
    server_name: &ServerName<'_>,
    anchors: &[TrustAnchor<'_>],
    now: UnixTime,
    policy: &Policy,
) -> Result<(), TrustFailure> {
    let mut chain = Vec::with_capacity(intermediates.len() + 1);
    chain.push(leaf.clone());
    chain.extend(intermediates.iter().cloned());

    let revocation = revocation::prepare(policy, &chain);
    verify_path(leaf, anchors, intermediates, now, &revocation)?;

    EndEntityCert::try_from(leaf)
        .and_then(|ee| ee.verify_is_valid_for_subject_name(server_name))
        .map_err(TrustFailure::Path)
}
