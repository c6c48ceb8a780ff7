use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const CHECKSUM_PREFIX: &str = "sha256:";
const URL_KEY_CONTEXT: &str = "crmvault 2024-06 signed download url";

/// Checksum of attachment bytes as recorded in manifests (`sha256:<hex>`)
pub fn content_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{}{}", CHECKSUM_PREFIX, hex::encode(hasher.finalize()))
}

/// Verify data against a manifest checksum (case-insensitive hex)
pub fn verify_checksum(data: &[u8], expected: &str) -> bool {
    let actual = content_checksum(data);
    actual.eq_ignore_ascii_case(expected)
}

/// Secure comparison of two strings to prevent timing attacks
pub fn secure_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Issues and checks short-lived download URLs for stored objects.
///
/// The signature is a keyed BLAKE3 hash over bucket, path and expiry, so a
/// URL cannot be retargeted at another object or extended.
#[derive(Clone)]
pub struct UrlSigner {
    key: [u8; 32],
    base_url: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    /// Create a signer from a secret and the public base URL of the file route
    pub fn new(secret: &str, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            key: blake3::derive_key(URL_KEY_CONTEXT, secret.as_bytes()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Hex signature for an object and expiry timestamp
    pub fn signature(&self, bucket: &str, path: &str, expires: i64) -> String {
        let message = format!("{}\0{}\0{}", bucket, path, expires);
        blake3::keyed_hash(&self.key, message.as_bytes())
            .to_hex()
            .to_string()
    }

    /// Build a URL valid for `ttl` from `now`
    pub fn sign_url(&self, bucket: &str, path: &str, ttl: Duration, now: DateTime<Utc>) -> String {
        let expires = (now + ttl).timestamp();
        format!(
            "{}/files/{}/{}?expires={}&signature={}",
            self.base_url,
            encode_path(bucket),
            encode_path(path),
            expires,
            self.signature(bucket, path, expires)
        )
    }

    /// Check a presented signature and expiry
    pub fn verify(
        &self,
        bucket: &str,
        path: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if now.timestamp() > expires {
            return false;
        }
        secure_compare(&self.signature(bucket, path, expires), signature)
    }
}

/// Percent-encode a path for use in a URL, keeping `/` separators
pub fn encode_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_checksum() {
        let checksum = content_checksum(b"hello world");
        assert_eq!(
            checksum,
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert!(verify_checksum(b"hello world", &checksum.to_uppercase()));
        assert!(!verify_checksum(b"hello world!", &checksum));
    }

    #[test]
    fn test_secure_compare() {
        assert!(secure_compare("abc123", "abc123"));
        assert!(!secure_compare("abc123", "abc124"));
        assert!(!secure_compare("abc", "abc123"));
    }

    #[test]
    fn test_signed_url_roundtrip() {
        let signer = UrlSigner::new("s3cret", "http://localhost:8080/");
        let now = Utc::now();
        let url = signer.sign_url("crm-backups", "backups/1/backup.json", Duration::seconds(60), now);

        assert!(url.starts_with("http://localhost:8080/files/crm-backups/backups/1/backup.json?expires="));
        let expires = (now + Duration::seconds(60)).timestamp();
        let signature = signer.signature("crm-backups", "backups/1/backup.json", expires);
        assert!(url.ends_with(&signature));

        assert!(signer.verify("crm-backups", "backups/1/backup.json", expires, &signature, now));
        assert!(!signer.verify("crm-backups", "backups/2/backup.json", expires, &signature, now));
        assert!(!signer.verify("crm-files", "backups/1/backup.json", expires, &signature, now));
    }

    #[test]
    fn test_expired_url_is_rejected() {
        let signer = UrlSigner::new("s3cret", "http://localhost:8080");
        let now = Utc::now();
        let expires = (now - Duration::seconds(1)).timestamp();
        let signature = signer.signature("b", "p", expires);
        assert!(!signer.verify("b", "p", expires, &signature, now));
    }

    #[test]
    fn test_different_secrets_produce_different_signatures() {
        let a = UrlSigner::new("one", "http://x");
        let b = UrlSigner::new("two", "http://x");
        assert_ne!(a.signature("b", "p", 10), b.signature("b", "p", 10));
    }

    #[test]
    fn test_encode_path() {
        assert_eq!(encode_path("leads/7/Q3 offer.pdf"), "leads/7/Q3%20offer.pdf");
        assert_eq!(encode_path("plain/path-1_a.txt"), "plain/path-1_a.txt");
    }
}
