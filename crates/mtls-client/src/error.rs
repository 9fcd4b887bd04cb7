//! Error types for client construction.

use thiserror::Error;

/// Errors that can occur while building an [`MtlsClient`](crate::MtlsClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Core(#[from] mtls_core::CoreError),

    #[error("a client certificate is required but none was found")]
    IdentityRequired,

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
