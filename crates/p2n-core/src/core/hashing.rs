// crates/p2n-core/src/core/hashing.rs
// ============================================================================
// Module: Paper2Notebook Hashing
// Description: Content checksums and environment fingerprints.
// Purpose: Provide deterministic SHA-256 digests for dedupe and idempotence.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! Ingest dedupes papers by the SHA-256 checksum of the PDF bytes, and
//! materialize fingerprints the pinned requirements file so re-materializing
//! the same plan is detectable. Both digests are lowercase hex and stable
//! across platforms.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Digests
// ============================================================================

/// Computes the lowercase hex SHA-256 digest of raw bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut rendered = String::with_capacity(64);
    for byte in digest {
        rendered.push_str(&format!("{byte:02x}"));
    }
    rendered
}

/// Computes the environment fingerprint for a requirements file body.
///
/// The fingerprint hashes the sorted, newline-joined requirement lines so the
/// value is independent of generator emission order.
#[must_use]
pub fn environment_fingerprint(requirements: &str) -> String {
    let mut lines: Vec<&str> =
        requirements.lines().map(str::trim).filter(|line| !line.is_empty()).collect();
    lines.sort_unstable();
    sha256_hex(lines.join("\n").as_bytes())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::environment_fingerprint;
    use super::sha256_hex;

    /// Tests the SHA-256 digest of an empty input.
    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    /// Tests the fingerprint ignores line order and surrounding whitespace.
    #[test]
    fn fingerprint_is_order_independent() {
        let forward = environment_fingerprint("numpy==1.26.4\nscikit-learn==1.4.2\n");
        let reversed = environment_fingerprint("scikit-learn==1.4.2\n  numpy==1.26.4  \n\n");
        assert_eq!(forward, reversed);
    }

    /// Tests distinct pin sets produce distinct fingerprints.
    #[test]
    fn fingerprint_differs_per_pin_set() {
        let left = environment_fingerprint("numpy==1.26.4");
        let right = environment_fingerprint("numpy==1.26.5");
        assert_ne!(left, right);
    }
}
