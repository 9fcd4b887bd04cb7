//! Certificate thumbprints: hex fingerprints of a certificate's DER bytes.
//!
//! A configured thumbprint is normalized once (whitespace stripped, upper
//! case) and compared against the fingerprint of a presented certificate.
//! The digest is picked by length:
//!
//! - 40 hex digits: SHA-1, the convention of platform certificate stores
//! - 64 hex digits: SHA-256
//!
//! Any other length never matches.
//!
//! SHA-1 / SHA-256 reference: `sha1` and `sha2` crates (RustCrypto)
//! Hex reference: `data-encoding` crate

use data_encoding::HEXUPPER;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Hex length of a SHA-1 thumbprint.
const SHA1_HEX_LEN: usize = 40;

/// Hex length of a SHA-256 thumbprint.
const SHA256_HEX_LEN: usize = 64;

/// A normalized certificate thumbprint.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Thumbprint {
    hex: String,
}

impl Thumbprint {
    /// Normalize a thumbprint string.
    ///
    /// Returns `None` when nothing but whitespace remains, so an empty setting
    /// can never act as a wildcard.
    pub fn parse(raw: &str) -> Option<Self> {
        let hex = normalize(raw);
        if hex.is_empty() {
            return None;
        }
        Some(Self { hex })
    }

    /// SHA-1 thumbprint of a DER-encoded certificate.
    pub fn sha1_of(cert_der: &[u8]) -> Self {
        Self {
            hex: HEXUPPER.encode(&Sha1::digest(cert_der)),
        }
    }

    /// SHA-256 thumbprint of a DER-encoded certificate.
    pub fn sha256_of(cert_der: &[u8]) -> Self {
        Self {
            hex: HEXUPPER.encode(&Sha256::digest(cert_der)),
        }
    }

    /// Returns true if this thumbprint identifies the given certificate.
    pub fn matches(&self, cert_der: &[u8]) -> bool {
        let actual = match self.hex.len() {
            SHA1_HEX_LEN => Self::sha1_of(cert_der),
            SHA256_HEX_LEN => Self::sha256_of(cert_der),
            _ => return false,
        };
        actual.hex == self.hex
    }

    /// The normalized upper-case hex string.
    pub fn as_str(&self) -> &str {
        &self.hex
    }
}

impl std::fmt::Display for Thumbprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hex)
    }
}

impl std::fmt::Debug for Thumbprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Thumbprint({})", self.hex)
    }
}

/// Strip all whitespace and upper-case the remainder.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Whitespace-stripped, case-insensitive equality of two thumbprint strings.
pub fn equal(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaces_and_case_are_ignored() {
        assert!(equal("AA BB CC", "aabbcc"));
        assert!(equal(" aa\tbb\ncc ", "AABBCC"));
        assert!(!equal("AA BB CC", "aabbcd"));
    }

    #[test]
    fn blank_input_is_absent() {
        assert!(Thumbprint::parse("").is_none());
        assert!(Thumbprint::parse("   \t ").is_none());
    }

    #[test]
    fn parse_normalizes() {
        let tp = Thumbprint::parse("ab cd ef").expect("non-empty");
        assert_eq!(tp.as_str(), "ABCDEF");
    }

    #[test]
    fn sha1_thumbprint_matches_same_bytes() {
        let der = b"certificate bytes";
        let expected = Thumbprint::sha1_of(der);
        assert_eq!(expected.as_str().len(), 40);

        let lower_spaced: String = expected
            .as_str()
            .to_lowercase()
            .as_bytes()
            .chunks(2)
            .map(|pair| std::str::from_utf8(pair).unwrap())
            .collect::<Vec<_>>()
            .join(" ");
        let configured = Thumbprint::parse(&lower_spaced).unwrap();
        assert!(configured.matches(der));
        assert!(!configured.matches(b"other bytes"));
    }

    #[test]
    fn sha256_thumbprint_matches_same_bytes() {
        let der = b"certificate bytes";
        let configured = Thumbprint::parse(Thumbprint::sha256_of(der).as_str()).unwrap();
        assert!(configured.matches(der));
        assert!(!configured.matches(b"other bytes"));
    }

    #[test]
    fn unsupported_length_never_matches() {
        let configured = Thumbprint::parse("AA BB CC").unwrap();
        assert!(!configured.matches(b"AABBCC"));
    }
}
