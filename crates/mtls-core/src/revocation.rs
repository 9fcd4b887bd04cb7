//! Certificate revocation material for chain validation.
//!
//! The revocation mode decides where CRLs come from:
//!
//! - `NoCheck`: revocation is not checked
//! - `Offline`: CRLs from the local `crl_path` file only
//! - `Online`: local CRLs plus CRLs downloaded from the HTTP(S) distribution
//!   points named in the certificates being validated
//!
//! When checking is enabled but no usable CRL was obtained the result is
//! [`RevocationCheck::Unavailable`], which callers treat as a rejection.
//! Downloads block the calling handshake; they are bounded only by the
//! policy's request timeout and are never retried.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use rustls_pki_types::CertificateDer;
use tracing::{debug, warn};
use webpki::{BorrowedCertRevocationList, CertRevocationList};
use x509_parser::extensions::{DistributionPointName, GeneralName, ParsedExtension};
use x509_parser::prelude::*;

use crate::pem;
use crate::policy::{Policy, RevocationMode};

/// Upper bound on a downloaded CRL.
const MAX_CRL_BYTES: u64 = 16 * 1024 * 1024;

/// Revocation inputs for one validation.
pub enum RevocationCheck {
    Disabled,
    Crls(Vec<CertRevocationList<'static>>),
    Unavailable,
}

impl std::fmt::Debug for RevocationCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Crls(crls) => write!(f, "Crls({})", crls.len()),
            Self::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// Collect the CRLs needed to validate `chain` (leaf first) under `policy`.
pub fn prepare(policy: &Policy, chain: &[CertificateDer<'_>]) -> RevocationCheck {
    if policy.revocation_mode == RevocationMode::NoCheck {
        return RevocationCheck::Disabled;
    }

    let mut raw: Vec<Vec<u8>> = Vec::new();

    if let Some(path) = policy.crl_path.as_deref() {
        raw.extend(load_crl_file(path));
    }

    if policy.revocation_mode == RevocationMode::Online {
        let urls: Vec<String> = chain.iter().flat_map(|c| distribution_points(c)).collect();
        if !urls.is_empty() {
            raw.extend(fetch_all(&urls, policy.request_timeout));
        }
    }

    let crls: Vec<CertRevocationList<'static>> = raw
        .iter()
        .filter_map(|der| match parse_crl(der) {
            Ok(crl) => Some(crl),
            Err(e) => {
                debug!(error = ?e, "skipping unparsable CRL");
                None
            }
        })
        .collect();

    if crls.is_empty() {
        warn!(mode = ?policy.revocation_mode, "no revocation information available");
        return RevocationCheck::Unavailable;
    }
    RevocationCheck::Crls(crls)
}

fn parse_crl(der: &[u8]) -> Result<CertRevocationList<'static>, webpki::Error> {
    let owned = BorrowedCertRevocationList::from_der(der)?.to_owned()?;
    Ok(CertRevocationList::from(owned))
}

/// Read a CRL file: PEM `X509 CRL` blocks, or a single raw DER CRL.
fn load_crl_file(path: &Path) -> Vec<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => split_crls(bytes),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read CRL file");
            Vec::new()
        }
    }
}

fn split_crls(bytes: Vec<u8>) -> Vec<Vec<u8>> {
    let text = String::from_utf8_lossy(&bytes);
    if !text.contains("-----BEGIN X509 CRL-----") {
        return vec![bytes];
    }
    pem::blocks(&text, pem::X509_CRL)
        .into_iter()
        .filter_map(Result::ok)
        .collect()
}

/// HTTP(S) CRL distribution point URLs of a certificate.
pub fn distribution_points(cert_der: &[u8]) -> Vec<String> {
    let Ok((_, cert)) = X509Certificate::from_der(cert_der) else {
        return Vec::new();
    };

    let mut urls = Vec::new();
    for ext in cert.extensions() {
        let ParsedExtension::CRLDistributionPoints(points) = ext.parsed_extension() else {
            continue;
        };
        for point in points.iter() {
            let Some(DistributionPointName::FullName(names)) = &point.distribution_point else {
                continue;
            };
            for name in names {
                if let GeneralName::URI(uri) = name {
                    if uri.starts_with("http://") || uri.starts_with("https://") {
                        urls.push(uri.to_string());
                    }
                }
            }
        }
    }
    urls
}

/// Download every URL on a dedicated thread.
///
/// The blocking client owns its own runtime, so it must not run on an async
/// executor thread; a scoped OS thread keeps the handshake callback
/// synchronous regardless of the caller's runtime.
fn fetch_all(urls: &[String], timeout: Duration) -> Vec<Vec<u8>> {
    std::thread::scope(|scope| {
        scope
            .spawn(|| {
                let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
                    Ok(client) => client,
                    Err(e) => {
                        warn!(error = %e, "cannot build CRL download client");
                        return Vec::new();
                    }
                };
                urls.iter()
                    .filter_map(|url| match fetch_one(&client, url) {
                        Ok(bytes) => Some(split_crls(bytes)),
                        Err(e) => {
                            warn!(%url, error = %e, "CRL download failed");
                            None
                        }
                    })
                    .flatten()
                    .collect()
            })
            .join()
            .unwrap_or_default()
    })
}

fn fetch_one(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>, String> {
    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| e.to_string())?;
    if response.content_length().is_some_and(|len| len > MAX_CRL_BYTES) {
        return Err(format!("CRL larger than {MAX_CRL_BYTES} bytes"));
    }
    read_capped(response, MAX_CRL_BYTES)
}

/// Read at most `limit` bytes; a longer body is an error, whatever the
/// headers announced.
fn read_capped(body: impl Read, limit: u64) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    body.take(limit + 1)
        .read_to_end(&mut buf)
        .map_err(|e| e.to_string())?;
    if buf.len() as u64 > limit {
        return Err(format!("CRL larger than {limit} bytes"));
    }
    Ok(buf)
}
