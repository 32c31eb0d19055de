//! SHA-256 hashing over raw bytes, streams, files, and **canonical JSON**.
//!
//! Deterministic: same canonical structure ⇒ same lowercase 64-hex across
//! OS/arch. Every content address and integrity check in the workspace is
//! produced here.

use digest::Digest;
use serde::Serialize;
use sha2::Sha256;

use crate::canonical_json::to_canonical_bytes;
use crate::{IoError, IoResult};

/// 64 KiB read block for streaming hashes.
pub const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Compute lowercase 64-hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Streaming SHA-256 for any reader; returns (lowercase 64-hex, bytes read).
pub fn sha256_stream<R: std::io::Read>(reader: &mut R) -> IoResult<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_BLOCK_SIZE];
    let mut size: u64 = 0;
    loop {
        let n = reader.read(&mut buf).map_err(|e| IoError::Hash(e.to_string()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), size))
}

/// Hash a file from disk; returns (lowercase 64-hex, size).
pub fn sha256_file<P: AsRef<std::path::Path>>(path: P) -> IoResult<(String, u64)> {
    let mut f = std::fs::File::open(path).map_err(|e| IoError::Hash(e.to_string()))?;
    sha256_stream(&mut f)
}

/// SHA-256 of the canonical JSON representation; returns lowercase 64-hex.
pub fn sha256_canonical<T: Serialize>(value: &T) -> IoResult<String> {
    let bytes = to_canonical_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

/// True iff string is lowercase 64-hex.
pub fn is_hex64(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_answer_aaa() {
        // sha256("AAA"), cross-checked with sha256sum and openssl dgst.
        assert_eq!(
            sha256_hex(b"AAA"),
            "cb1ad2119d8fafb69566510ee712661f9f14b83385006ef92aec47f523a38358"
        );
    }

    #[test]
    fn stream_matches_bytes() {
        let data = vec![7u8; 200_000];
        let (h, n) = sha256_stream(&mut &data[..]).unwrap();
        assert_eq!(h, sha256_hex(&data));
        assert_eq!(n, 200_000);
    }

    #[test]
    fn canonical_hash_ignores_key_order() {
        let a = json!({"x": 1, "y": [2, 3]});
        let b = json!({"y": [2, 3], "x": 1});
        assert_eq!(sha256_canonical(&a).unwrap(), sha256_canonical(&b).unwrap());
    }

    #[test]
    fn canonical_hash_is_order_sensitive_for_arrays() {
        let a = json!([1, 2]);
        let b = json!([2, 1]);
        assert_ne!(sha256_canonical(&a).unwrap(), sha256_canonical(&b).unwrap());
    }

    #[test]
    fn hex64_check() {
        assert!(is_hex64(&sha256_hex(b"")));
        assert!(!is_hex64("zz"));
    }
}
