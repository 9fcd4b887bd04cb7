//! Fail-closed mutual-TLS primitives for outbound HTTPS clients.
//!
//! Shared layer consumed by `mtls-client`:
//!
//! - Resolved connection [`policy::Policy`] and its key/value resolution
//! - Client identity sourcing (PKCS#12 archive or keystore lookup)
//! - PEM trust bundle loading and CRL material
//! - The server validation engine and its rustls verifier adapter

pub mod bundle;
pub mod error;
pub mod identity;
pub mod pem;
pub mod policy;
pub mod revocation;
pub mod thumbprint;
pub mod tls;
pub mod validation;

pub use error::{CoreError, Result};
pub use policy::Policy;
