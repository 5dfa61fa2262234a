//! SHA-256 digests rendered as lowercase hex.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 over a sequence of records, each terminated by `\n`.
///
/// Record order is significant; callers sort first when they need a
/// set digest.
pub fn digest_records<I, S>(records: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.as_ref().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Short stable identifier: a prefix plus the first 16 hex chars of a digest.
pub fn short_id(prefix: &str, digest: &str) -> String {
    format!("{prefix}-{}", &digest[..digest.len().min(16)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn record_order_matters() {
        assert_ne!(digest_records(["a", "b"]), digest_records(["b", "a"]));
        assert_eq!(digest_records(["a", "b"]), digest_records(vec!["a", "b"]));
    }

    #[test]
    fn short_id_prefix() {
        let id = short_id("pr", &sha256_hex("x"));
        assert!(id.starts_with("pr-"));
        assert_eq!(id.len(), 3 + 16);
    }
}
