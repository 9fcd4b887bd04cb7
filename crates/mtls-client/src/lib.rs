//! Outbound HTTPS clients with client certificates and fail-closed server
//! validation.
//!
//! Consumes `mtls-core`:
//!
//! - [`ClientFactory`]: resolves the client identity and builds the rustls
//!   configuration for a [`Policy`](mtls_core::Policy)
//! - [`MtlsClient`]: the resulting long-lived, cloneable HTTP client handle

pub mod client;
pub mod error;
pub mod factory;

pub use client::MtlsClient;
pub use error::ClientError;
pub use factory::ClientFactory;
