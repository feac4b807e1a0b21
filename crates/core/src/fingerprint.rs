// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content fingerprinting — the cache key component computed over the exact
//! bytes fed to a converter plus a salt derived from its params, so two
//! submissions with identical bytes but different params never collide.

use sha2::{Digest, Sha256};

/// Compute the hex-encoded SHA-256 digest over `bytes || salt`.
pub fn fingerprint(bytes: &[u8], salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.update(salt);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_salt_same_fingerprint() {
        assert_eq!(fingerprint(b"hello", b"salt"), fingerprint(b"hello", b"salt"));
    }

    #[test]
    fn different_salt_different_fingerprint() {
        assert_ne!(fingerprint(b"hello", b"a"), fingerprint(b"hello", b"b"));
    }

    #[test]
    fn different_bytes_different_fingerprint() {
        assert_ne!(fingerprint(b"hello", b""), fingerprint(b"world", b""));
    }

    #[test]
    fn fingerprint_is_stable_hex_sha256() {
        let fp = fingerprint(b"", b"");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
