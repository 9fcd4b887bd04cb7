//! Client factory.
//!
//! `ClientFactory` turns a resolved [`Policy`] into an [`MtlsClient`]:
//!
//! 1. Load the client identity selected by the policy (archive or keystore)
//! 2. Build a rustls config whose server verifier is the validation engine
//! 3. Hand that config to a `reqwest` client with the policy's timeout
//!
//! Identity decoding failures are fatal. An identity that is simply not
//! configured or not found yields a client without a certificate, unless
//! the policy requires one.

use std::sync::Arc;

use mtls_core::identity::{self, DirectoryKeyStore, KeyStore};
use mtls_core::tls::{build_client_tls_config, SystemRoots};
use mtls_core::Policy;
use tracing::{info, warn};

use crate::client::MtlsClient;
use crate::error::{ClientError, Result};

/// Builder for [`MtlsClient`].
pub struct ClientFactory {
    policy: Policy,
    keystore: Option<Arc<dyn KeyStore>>,
    roots: Option<SystemRoots>,
}

impl ClientFactory {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            keystore: None,
            roots: None,
        }
    }

    /// Keystore used in keystore mode. Defaults to
    /// [`DirectoryKeyStore::platform`].
    pub fn with_keystore(mut self, keystore: Arc<dyn KeyStore>) -> Self {
        self.keystore = Some(keystore);
        self
    }

    /// Anchors for baseline system trust. Defaults to [`SystemRoots::load`].
    pub fn with_system_roots(mut self, roots: SystemRoots) -> Self {
        self.roots = Some(roots);
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Build the client.
    pub fn build(self) -> Result<MtlsClient> {
        let policy = Arc::new(self.policy);
        let keystore = self
            .keystore
            .unwrap_or_else(|| Arc::new(DirectoryKeyStore::platform()));

        let identity = identity::load_client_identity(&policy, &*keystore)?;
        let has_identity = identity.is_some();
        if !has_identity {
            if policy.require_client_identity {
                return Err(ClientError::IdentityRequired);
            }
            warn!(mode = ?policy.client_mode, "no client certificate loaded, connecting without one");
        }

        let roots = self.roots.unwrap_or_else(SystemRoots::load);
        let tls = build_client_tls_config(Arc::clone(&policy), identity, roots)?;

        let http = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .timeout(policy.request_timeout)
            .build()?;

        info!(
            client_certificate = has_identity,
            strict = policy.strict_validation,
            revocation = ?policy.revocation_mode,
            min_tls = ?policy.min_tls_version,
            bundle = policy.ca_bundle_path.is_some(),
            "mTLS client ready"
        );

        Ok(MtlsClient::new(http, policy, has_identity))
    }
}

impl std::fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFactory")
            .field("policy", &self.policy)
            .field("keystore", &self.keystore.is_some())
            .field("roots", &self.roots)
            .finish()
    }
}
