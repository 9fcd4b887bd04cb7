//! Server certificate validation engine.
//!
//! [`validate`] is the single decision point invoked once per handshake. It
//! answers accept/reject only; the reason for a rejection is kept internal
//! as a [`Rejection`] and reported through `tracing`.
//!
//! Evaluation order (first failure wins):
//!
//! 1. strict validation disabled: accept
//! 2. no peer certificate: reject
//! 3. outside the validity window: reject (boundary instants are inside)
//! 4. trust: a configured, existing CA bundle *replaces* system trust and
//!    only its self-signed entries are anchors; otherwise the baseline
//!    system-trust result must be clean
//! 5. issuer constraint: issuer DN must contain `CN=<value>` (any case)
//! 6. thumbprint pin: must equal the certificate thumbprint
//! 7. accept
//!
//! The engine keeps no state between calls. The bundle and any CRLs are
//! loaded again on every invocation.

pub mod chain;

use std::path::Path;

use rustls_pki_types::{CertificateDer, TrustAnchor, UnixTime};
use tracing::{debug, warn};
use x509_parser::prelude::*;

use crate::bundle::TrustBundle;
use crate::policy::Policy;
use crate::revocation;

pub use chain::TrustFailure;

/// Lazily computed baseline (system) trust result.
pub type Baseline<'a> = &'a (dyn Fn() -> Result<(), TrustFailure> + 'a);

/// Inputs of one validation.
pub struct ValidationContext<'a> {
    /// Leaf certificate presented by the server.
    pub peer: Option<&'a CertificateDer<'a>>,
    /// Additional certificates presented by the server.
    pub intermediates: &'a [CertificateDer<'a>],
    /// System-trust evaluation, only consulted when no bundle is in effect.
    pub baseline: Baseline<'a>,
    pub now: UnixTime,
    pub policy: &'a Policy,
}

/// Why a server certificate was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum Rejection {
    #[error("no peer certificate presented")]
    NoPeerCertificate,
    #[error("peer certificate is malformed")]
    Malformed,
    #[error("certificate is not yet valid")]
    NotYetValid,
    #[error("certificate has expired")]
    Expired,
    #[error("CA bundle could not be read")]
    BundleUnavailable,
    #[error("no trusted path to the CA bundle: {0}")]
    UntrustedChain(TrustFailure),
    #[error("system trust evaluation failed: {0}")]
    SystemTrust(TrustFailure),
    #[error("issuer does not match the configured CN")]
    IssuerMismatch,
    #[error("certificate thumbprint does not match the pin")]
    ThumbprintMismatch,
}

/// Decide whether the server certificate is acceptable.
pub fn validate(ctx: &ValidationContext<'_>) -> bool {
    match evaluate(ctx) {
        Ok(()) => {
            debug!("server certificate accepted");
            true
        }
        Err(rejection) => {
            warn!(reason = %rejection, "server certificate rejected");
            false
        }
    }
}

pub(crate) fn evaluate(ctx: &ValidationContext<'_>) -> Result<(), Rejection> {
    let policy = ctx.policy;

    if !policy.strict_validation {
        debug!("strict validation disabled, accepting without checks");
        return Ok(());
    }

    let peer = ctx.peer.ok_or(Rejection::NoPeerCertificate)?;
    let (_, cert) = X509Certificate::from_der(peer).map_err(|_| Rejection::Malformed)?;

    check_validity(&cert, ctx.now)?;

    match active_bundle(policy) {
        Some(path) => bundle_trust(path, peer, ctx)?,
        None => (ctx.baseline)().map_err(Rejection::SystemTrust)?,
    }

    if let Some(cn) = policy.issuer_cn.as_deref() {
        if !issuer_has_cn(&cert.issuer().to_string(), cn) {
            return Err(Rejection::IssuerMismatch);
        }
    }

    if let Some(pin) = policy.server_thumbprint.as_ref() {
        if !pin.matches(peer) {
            return Err(Rejection::ThumbprintMismatch);
        }
    }

    Ok(())
}

fn check_validity(cert: &X509Certificate<'_>, now: UnixTime) -> Result<(), Rejection> {
    let now = i64::try_from(now.as_secs()).unwrap_or(i64::MAX);
    let validity = cert.validity();
    if now < validity.not_before.timestamp() {
        return Err(Rejection::NotYetValid);
    }
    if now > validity.not_after.timestamp() {
        return Err(Rejection::Expired);
    }
    Ok(())
}

/// The bundle path, if one is configured and the file exists.
fn active_bundle(policy: &Policy) -> Option<&Path> {
    let path = policy.ca_bundle_path.as_deref()?;
    if path.exists() {
        Some(path)
    } else {
        debug!(path = %path.display(), "configured CA bundle does not exist, using system trust");
        None
    }
}

fn bundle_trust(path: &Path, peer: &CertificateDer<'_>, ctx: &ValidationContext<'_>) -> Result<(), Rejection> {
    let bundle = TrustBundle::load(path).map_err(|e| {
        debug!(error = %e, "CA bundle unreadable");
        Rejection::BundleUnavailable
    })?;

    // Anchors carry no validity period, so out-of-window roots are dropped here.
    let anchors: Vec<TrustAnchor<'_>> = bundle
        .roots()
        .filter(|root| {
            let valid = root.is_valid_at(ctx.now);
            if !valid {
                debug!(subject = root.subject(), "bundle root outside its validity period");
            }
            valid
        })
        .filter_map(|root| webpki::anchor_from_trusted_cert(root.der()).ok())
        .collect();

    let mut intermediates: Vec<CertificateDer<'_>> = ctx.intermediates.to_vec();
    intermediates.extend(bundle.intermediates().map(|c| c.der().clone()));

    let chain = revocation_chain(peer, ctx.intermediates, &bundle);
    let revocation = revocation::prepare(ctx.policy, &chain);

    chain::verify_path(peer, &anchors, &intermediates, ctx.now, &revocation)
        .map_err(Rejection::UntrustedChain)
}

/// The certificates whose revocation material is needed: the peer, what it
/// presented, and the bundle intermediates reachable from them by issuer name.
fn revocation_chain<'c>(
    peer: &CertificateDer<'c>,
    presented: &[CertificateDer<'c>],
    bundle: &TrustBundle,
) -> Vec<CertificateDer<'c>> {
    let mut chain = Vec::with_capacity(presented.len() + 1);
    chain.push(peer.clone());
    chain.extend(presented.iter().cloned());

    let mut wanted: Vec<String> = chain
        .iter()
        .filter_map(|der| X509Certificate::from_der(der).ok())
        .map(|(_, cert)| cert.issuer().to_string())
        .collect();
    let mut taken = vec![false; bundle.certificates().len()];

    while let Some(issuer) = wanted.pop() {
        for (index, cert) in bundle.certificates().iter().enumerate() {
            if taken[index] || cert.is_self_signed() || cert.subject() != issuer {
                continue;
            }
            taken[index] = true;
            chain.push(cert.der().clone());
            wanted.push(cert.issuer().to_string());
        }
    }
    chain
}

/// Case-insensitive substring test for `CN=<cn>` in an issuer DN.
fn issuer_has_cn(issuer_dn: &str, cn: &str) -> bool {
    let needle = format!("cn={}", cn.to_lowercase());
    issuer_dn.to_lowercase().contains(&needle)
}
