//! Error types for `mtls-core`.
//!
//! These are construction-time errors only. Server validation never produces
//! an error value: a rejected peer is reported to the TLS engine as a single
//! undifferentiated failure (see [`crate::validation`]).

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building client identities or TLS configs.
#[derive(Debug, Error)]
pub enum CoreError {
    // --- Files ---
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // --- Client identity ---
    #[error("password environment variable {0} is not set")]
    MissingPassword(String),

    #[error("failed to decode PKCS#12 archive: {0}")]
    Archive(String),

    #[error("keystore error: {0}")]
    KeyStore(String),

    #[error("failed to parse certificate: {0}")]
    CertificateParse(String),

    // --- TLS ---
    #[error("TLS configuration error: {0}")]
    TlsConfiguration(String),
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
