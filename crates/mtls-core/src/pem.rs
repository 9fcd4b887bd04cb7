//! Lenient PEM block scanning.
//!
//! Each `-----BEGIN <LABEL>-----` / `-----END <LABEL>-----` block is decoded
//! on its own. A block with a broken body or a missing END marker yields an
//! `Err` entry for that block only; scanning continues after it.

use base64::{engine::general_purpose::STANDARD, Engine};

/// PEM label of an X.509 certificate.
pub const CERTIFICATE: &str = "CERTIFICATE";

/// PEM label of a PKCS#8 private key.
pub const PRIVATE_KEY: &str = "PRIVATE KEY";

/// PEM label of an X.509 certificate revocation list.
pub const X509_CRL: &str = "X509 CRL";

/// Why a single block could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    MissingEnd,
    Base64(String),
}

/// Decode every block with the given label, in file order.
pub fn blocks(text: &str, label: &str) -> Vec<Result<Vec<u8>, BlockError>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let mut out = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(&begin) {
        let body_start = start + begin.len();
        let after_begin = &rest[body_start..];

        // A later BEGIN before the next END means this block was truncated.
        let next_end = after_begin.find(&end);
        let next_begin = after_begin.find(&begin);
        let body_end = match (next_end, next_begin) {
            (Some(e), Some(b)) if b < e => None,
            (Some(e), _) => Some(e),
            (None, _) => None,
        };

        let Some(body_end) = body_end else {
            out.push(Err(BlockError::MissingEnd));
            rest = match next_begin {
                Some(b) => &after_begin[b..],
                None => "",
            };
            continue;
        };

        let body: String = after_begin[..body_end]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        out.push(
            STANDARD
                .decode(body.as_bytes())
                .map_err(|e| BlockError::Base64(e.to_string())),
        );

        rest = &after_begin[body_end + end.len()..];
    }

    out
}

/// Encode DER bytes as a single PEM block.
pub fn encode(label: &str, der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {label}-----\n");
    for line in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_consecutive_blocks() {
        let text = format!(
            "{}{}",
            encode(CERTIFICATE, b"first"),
            encode(CERTIFICATE, b"second")
        );
        let decoded: Vec<_> = blocks(&text, CERTIFICATE).into_iter().collect();
        assert_eq!(decoded, vec![Ok(b"first".to_vec()), Ok(b"second".to_vec())]);
    }

    #[test]
    fn tolerates_crlf_line_endings() {
        let text = encode(CERTIFICATE, b"windows line endings").replace('\n', "\r\n");
        let decoded = blocks(&text, CERTIFICATE);
        assert_eq!(decoded, vec![Ok(b"windows line endings".to_vec())]);
    }

    #[test]
    fn bad_body_does_not_stop_the_scan() {
        let text = format!(
            "{}-----BEGIN CERTIFICATE-----\n!!not base64!!\n-----END CERTIFICATE-----\n{}",
            encode(CERTIFICATE, b"a"),
            encode(CERTIFICATE, b"b")
        );
        let decoded = blocks(&text, CERTIFICATE);
        assert_eq!(decoded.len(), 3);
        assert!(decoded[0].is_ok());
        assert!(matches!(decoded[1], Err(BlockError::Base64(_))));
        assert_eq!(decoded[2], Ok(b"b".to_vec()));
    }

    #[test]
    fn truncated_block_is_reported_and_skipped() {
        let text = format!(
            "{}-----BEGIN CERTIFICATE-----\nAAAA\n{}",
            encode(CERTIFICATE, b"a"),
            encode(CERTIFICATE, b"b")
        );
        let decoded = blocks(&text, CERTIFICATE);
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[1], Err(BlockError::MissingEnd));
        assert_eq!(decoded[2], Ok(b"b".to_vec()));
    }

    #[test]
    fn other_labels_are_ignored() {
        let text = format!(
            "{}{}",
            encode(PRIVATE_KEY, b"key"),
            encode(CERTIFICATE, b"cert")
        );
        assert_eq!(blocks(&text, CERTIFICATE), vec![Ok(b"cert".to_vec())]);
        assert_eq!(blocks(&text, PRIVATE_KEY), vec![Ok(b"key".to_vec())]);
    }

    #[test]
    fn text_without_blocks_yields_nothing() {
        assert!(blocks("no pem here", CERTIFICATE).is_empty());
        assert!(blocks("", CERTIFICATE).is_empty());
    }
}
