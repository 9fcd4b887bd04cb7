//! The HTTP client handle produced by [`ClientFactory`](crate::ClientFactory).

use std::sync::Arc;

use mtls_core::Policy;
use reqwest::{IntoUrl, Method, RequestBuilder};

/// A long-lived HTTPS client bound to one policy.
///
/// Every connection it opens presents the loaded client certificate (if any)
/// and runs the server validation engine during the handshake. Cloning is
/// cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct MtlsClient {
    http: reqwest::Client,
    policy: Arc<Policy>,
    has_identity: bool,
}

impl MtlsClient {
    pub(crate) fn new(http: reqwest::Client, policy: Arc<Policy>, has_identity: bool) -> Self {
        Self {
            http,
            policy,
            has_identity,
        }
    }

    /// The underlying `reqwest` client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn into_inner(self) -> reqwest::Client {
        self.http
    }

    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.http.get(url)
    }

    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.http.post(url)
    }

    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.http.request(method, url)
    }

    /// Whether a client certificate is presented on handshakes.
    pub fn has_client_identity(&self) -> bool {
        self.has_identity
    }

    /// The policy snapshot this client validates servers against.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }
}
