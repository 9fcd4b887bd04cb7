//! Resolved connection policy.
//!
//! A [`Policy`] is an immutable snapshot built once from a key/value settings
//! source and then shared by the identity loader, the TLS config builder and
//! every handshake of a client instance.
//!
//! Resolution never fails. Missing or blank optional values resolve to
//! "absent" (constraint not enforced). Enum-valued settings that cannot be
//! parsed fall back to their strictest value, not to their default:
//!
//! | setting                   | unparsable value resolves to |
//! |---------------------------|------------------------------|
//! | `revocation_mode`         | `Online`                     |
//! | `strict_validation`       | `true`                       |
//! | `min_tls_version`         | `1.3`                        |
//! | `require_client_identity` | `true`                       |

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::thumbprint::Thumbprint;

/// Setting keys understood by [`Policy::resolve`].
pub mod keys {
    pub const CLIENT_MODE: &str = "client_mode";
    pub const CLIENT_FILE_PATH: &str = "client_file_path";
    pub const CLIENT_PASSWORD_ENV: &str = "client_password_env";
    pub const KEYSTORE_LOCATION: &str = "keystore_location";
    pub const KEYSTORE_NAME: &str = "keystore_name";
    pub const CLIENT_THUMBPRINT: &str = "client_thumbprint";
    pub const TIMEOUT_SECONDS: &str = "timeout_seconds";
    pub const REVOCATION_MODE: &str = "revocation_mode";
    pub const STRICT_VALIDATION: &str = "strict_validation";
    pub const MIN_TLS_VERSION: &str = "min_tls_version";
    pub const ISSUER_CN: &str = "issuer_cn";
    pub const SERVER_THUMBPRINT: &str = "server_thumbprint";
    pub const CA_BUNDLE_PATH: &str = "ca_bundle_path";
    pub const CRL_PATH: &str = "crl_path";
    pub const REQUIRE_CLIENT_IDENTITY: &str = "require_client_identity";

    /// Every key, in documentation order.
    pub const ALL: &[&str] = &[
        CLIENT_MODE,
        CLIENT_FILE_PATH,
        CLIENT_PASSWORD_ENV,
        KEYSTORE_LOCATION,
        KEYSTORE_NAME,
        CLIENT_THUMBPRINT,
        TIMEOUT_SECONDS,
        REVOCATION_MODE,
        STRICT_VALIDATION,
        MIN_TLS_VERSION,
        ISSUER_CN,
        SERVER_THUMBPRINT,
        CA_BUNDLE_PATH,
        CRL_PATH,
        REQUIRE_CLIENT_IDENTITY,
    ];
}

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default keystore container name.
pub const DEFAULT_KEYSTORE_NAME: &str = "My";

/// Where the client certificate comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientMode {
    /// Password-protected PKCS#12 archive on disk.
    #[default]
    File,
    /// Keystore entry looked up by thumbprint.
    KeyStore,
}

/// Scope of the keystore searched in [`ClientMode::KeyStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyStoreLocation {
    #[default]
    CurrentUser,
    LocalMachine,
}

/// How certificate revocation is checked during chain validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevocationMode {
    /// Local CRLs plus CRLs fetched from distribution points.
    #[default]
    Online,
    /// Local CRLs only.
    Offline,
    /// No revocation checking.
    NoCheck,
}

/// Minimum negotiated TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsFloor {
    /// TLS 1.2 or 1.3.
    #[default]
    Tls12,
    /// TLS 1.3 only.
    Tls13,
}

/// Immutable, fully resolved client policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub client_mode: ClientMode,
    pub client_file_path: Option<PathBuf>,
    /// Name of the environment variable holding the archive password.
    pub client_password_env: Option<String>,
    pub keystore_location: KeyStoreLocation,
    pub keystore_name: String,
    pub client_thumbprint: Option<Thumbprint>,
    pub request_timeout: Duration,
    pub revocation_mode: RevocationMode,
    pub strict_validation: bool,
    pub min_tls_version: TlsFloor,
    pub issuer_cn: Option<String>,
    pub server_thumbprint: Option<Thumbprint>,
    pub ca_bundle_path: Option<PathBuf>,
    pub crl_path: Option<PathBuf>,
    /// Fail client construction instead of proceeding without a certificate.
    pub require_client_identity: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            client_mode: ClientMode::File,
            client_file_path: None,
            client_password_env: None,
            keystore_location: KeyStoreLocation::CurrentUser,
            keystore_name: DEFAULT_KEYSTORE_NAME.to_string(),
            client_thumbprint: None,
            request_timeout: DEFAULT_TIMEOUT,
            revocation_mode: RevocationMode::Online,
            strict_validation: true,
            min_tls_version: TlsFloor::Tls12,
            issuer_cn: None,
            server_thumbprint: None,
            ca_bundle_path: None,
            crl_path: None,
            require_client_identity: false,
        }
    }
}

/// A string-keyed settings source.
pub trait SettingsSource {
    /// Returns the raw value of a setting, if present.
    fn setting(&self, key: &str) -> Option<String>;
}

impl SettingsSource for HashMap<String, String> {
    fn setting(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl SettingsSource for BTreeMap<String, String> {
    fn setting(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Reads settings from process environment variables named
/// `<prefix><KEY>` with the key upper-cased, e.g. `MTLS_CA_BUNDLE_PATH`.
#[derive(Debug, Clone)]
pub struct EnvSettings {
    prefix: String,
}

impl EnvSettings {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn var_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_ascii_uppercase())
    }
}

impl SettingsSource for EnvSettings {
    fn setting(&self, key: &str) -> Option<String> {
        std::env::var(self.var_name(key)).ok()
    }
}

impl Policy {
    /// Resolve a policy from a settings source.
    pub fn resolve(source: &impl SettingsSource) -> Self {
        let defaults = Policy::default();
        let text = |key: &str| optional(source, key);

        let client_mode = match text(keys::CLIENT_MODE) {
            None => defaults.client_mode,
            Some(raw) => parse_client_mode(&raw).unwrap_or_else(|| {
                fallback(keys::CLIENT_MODE, &raw, "file");
                defaults.client_mode
            }),
        };

        let keystore_location = match text(keys::KEYSTORE_LOCATION) {
            None => defaults.keystore_location,
            Some(raw) => parse_location(&raw).unwrap_or_else(|| {
                fallback(keys::KEYSTORE_LOCATION, &raw, "user");
                defaults.keystore_location
            }),
        };

        let request_timeout = match text(keys::TIMEOUT_SECONDS) {
            None => defaults.request_timeout,
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    fallback(keys::TIMEOUT_SECONDS, &raw, "30");
                    defaults.request_timeout
                }
            },
        };

        let revocation_mode = match text(keys::REVOCATION_MODE) {
            None => defaults.revocation_mode,
            Some(raw) => parse_revocation(&raw).unwrap_or_else(|| {
                fallback(keys::REVOCATION_MODE, &raw, "Online");
                RevocationMode::Online
            }),
        };

        let strict_validation = match text(keys::STRICT_VALIDATION) {
            None => defaults.strict_validation,
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                fallback(keys::STRICT_VALIDATION, &raw, "true");
                true
            }),
        };

        let min_tls_version = match text(keys::MIN_TLS_VERSION) {
            None => defaults.min_tls_version,
            Some(raw) => parse_tls_floor(&raw).unwrap_or_else(|| {
                fallback(keys::MIN_TLS_VERSION, &raw, "1.3");
                TlsFloor::Tls13
            }),
        };

        let require_client_identity = match text(keys::REQUIRE_CLIENT_IDENTITY) {
            None => defaults.require_client_identity,
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                fallback(keys::REQUIRE_CLIENT_IDENTITY, &raw, "true");
                true
            }),
        };

        Self {
            client_mode,
            client_file_path: text(keys::CLIENT_FILE_PATH).map(PathBuf::from),
            client_password_env: text(keys::CLIENT_PASSWORD_ENV),
            keystore_location,
            keystore_name: text(keys::KEYSTORE_NAME).unwrap_or(defaults.keystore_name),
            client_thumbprint: text(keys::CLIENT_THUMBPRINT)
                .and_then(|raw| Thumbprint::parse(&raw)),
            request_timeout,
            revocation_mode,
            strict_validation,
            min_tls_version,
            issuer_cn: text(keys::ISSUER_CN),
            server_thumbprint: text(keys::SERVER_THUMBPRINT)
                .and_then(|raw| Thumbprint::parse(&raw)),
            ca_bundle_path: text(keys::CA_BUNDLE_PATH).map(PathBuf::from),
            crl_path: text(keys::CRL_PATH).map(PathBuf::from),
            require_client_identity,
        }
    }
}

/// Trimmed value of a setting; blank values count as absent.
fn optional(source: &impl SettingsSource, key: &str) -> Option<String> {
    source
        .setting(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn fallback(key: &str, raw: &str, substituted: &str) {
    warn!(key, value = raw, substituted, "unrecognized setting value, using fallback");
}

fn parse_client_mode(raw: &str) -> Option<ClientMode> {
    match raw.to_ascii_lowercase().as_str() {
        "file" | "pfx" | "pkcs12" => Some(ClientMode::File),
        "keystore" | "store" => Some(ClientMode::KeyStore),
        _ => None,
    }
}

fn parse_location(raw: &str) -> Option<KeyStoreLocation> {
    match raw.to_ascii_lowercase().as_str() {
        "user" | "currentuser" => Some(KeyStoreLocation::CurrentUser),
        "machine" | "localmachine" => Some(KeyStoreLocation::LocalMachine),
        _ => None,
    }
}

fn parse_revocation(raw: &str) -> Option<RevocationMode> {
    match raw.to_ascii_lowercase().as_str() {
        "online" => Some(RevocationMode::Online),
        "offline" => Some(RevocationMode::Offline),
        "nocheck" | "no_check" | "none" => Some(RevocationMode::NoCheck),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn parse_tls_floor(raw: &str) -> Option<TlsFloor> {
    let compact: String = raw
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | 'v'))
        .collect();
    match compact.trim_start_matches("tls") {
        "1.2" | "12" => Some(TlsFloor::Tls12),
        "1.3" | "13" => Some(TlsFloor::Tls13),
        _ => None,
    }
}
