// crates/p2n-blobstore/src/lib.rs
// ============================================================================
// Module: Paper2Notebook Blob Store Library
// Description: Filesystem BlobStore with confinement and signed references.
// Purpose: Store artifacts under the stable path conventions, fail closed.
// Dependencies: p2n-core, sha2, thiserror
// ============================================================================

//! ## Overview
//! `p2n-blobstore` implements the [`p2n_core::BlobStore`] interface over a
//! confined filesystem root. Paths are the logical convention paths from
//! `p2n_core::core::paths`; every component is validated before touching the
//! filesystem, and traversal outside the root fails closed. Signed
//! references are HMAC-style digests over path and expiry, bounded at one
//! hour.
//!
//! Security posture: blob paths are untrusted input; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use p2n_core::Timestamp;
use p2n_core::interfaces::BlobError;
use p2n_core::interfaces::BlobStore;
use p2n_core::interfaces::SignedRef;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Longest time-to-live a signed reference may carry, in seconds.
pub const MAX_SIGNED_REF_TTL_SECONDS: u64 = 3_600;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Filesystem-backed blob store confined to one root directory.
///
/// # Invariants
/// - No operation touches a path outside the configured root.
/// - Writes go through a temporary sibling and rename, so readers observe
///   either the old or the new bytes.
pub struct FsBlobStore {
    /// Root directory for every blob.
    root: PathBuf,
    /// Secret used for signed-reference digests.
    signing_secret: Vec<u8>,
}

impl FsBlobStore {
    /// Creates a store rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Io`] when the root cannot be created.
    pub fn new(root: impl Into<PathBuf>, signing_secret: impl Into<Vec<u8>>) -> Result<Self, BlobError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| BlobError::Io(err.to_string()))?;
        Ok(Self {
            root,
            signing_secret: signing_secret.into(),
        })
    }

    /// Resolves a logical path into a confined filesystem path.
    fn resolve(&self, logical: &str) -> Result<PathBuf, BlobError> {
        validate_logical_path(logical)?;
        let mut resolved = self.root.clone();
        for component in logical.split('/') {
            resolved.push(component);
        }
        Ok(resolved)
    }

    /// Computes the reference signature for a path and expiry.
    fn sign(&self, logical: &str, expires_at: Timestamp) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.signing_secret);
        hasher.update(logical.as_bytes());
        hasher.update(expires_at.as_unix_millis().to_be_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|byte| format!("{byte:02x}")).collect()
    }

    /// Verifies a signed reference against the store secret and clock.
    #[must_use]
    pub fn verify_ref(&self, reference: &SignedRef, now: Timestamp) -> bool {
        if now > reference.expires_at {
            return false;
        }
        self.sign(&reference.path, reference.expires_at) == reference.token
    }
}

/// Validates a logical blob path: relative, slash-separated, no traversal.
fn validate_logical_path(logical: &str) -> Result<(), BlobError> {
    if logical.is_empty() || logical.starts_with('/') || logical.ends_with('/') {
        return Err(BlobError::InvalidPath(logical.to_string()));
    }
    for component in logical.split('/') {
        let suspicious = component.is_empty()
            || component == "."
            || component == ".."
            || component.len() > MAX_PATH_COMPONENT_LENGTH
            || component.contains('\\')
            || component.contains('\0');
        if suspicious {
            return Err(BlobError::InvalidPath(logical.to_string()));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: BlobStore Implementation
// ============================================================================

impl BlobStore for FsBlobStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).map_err(|err| BlobError::Io(err.to_string()))?;
        }
        let staging = staging_path(&resolved);
        {
            let mut file =
                fs::File::create(&staging).map_err(|err| BlobError::Io(err.to_string()))?;
            file.write_all(bytes).map_err(|err| BlobError::Io(err.to_string()))?;
            file.sync_all().map_err(|err| BlobError::Io(err.to_string()))?;
        }
        fs::rename(&staging, &resolved).map_err(|err| BlobError::Io(err.to_string()))
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let resolved = self.resolve(path)?;
        match fs::read(&resolved) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(path.to_string()))
            }
            Err(err) => Err(BlobError::Io(err.to_string())),
        }
    }

    fn exists(&self, path: &str) -> Result<bool, BlobError> {
        let resolved = self.resolve(path)?;
        Ok(resolved.is_file())
    }

    fn delete(&self, path: &str) -> Result<(), BlobError> {
        let resolved = self.resolve(path)?;
        match fs::remove_file(&resolved) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BlobError::Io(err.to_string())),
        }
    }

    fn signed_ref(&self, path: &str, ttl_seconds: u64) -> Result<SignedRef, BlobError> {
        if !self.exists(path)? {
            return Err(BlobError::NotFound(path.to_string()));
        }
        let ttl = ttl_seconds.min(MAX_SIGNED_REF_TTL_SECONDS);
        let expires_at = Timestamp::from_unix_millis(
            Timestamp::now()
                .as_unix_millis()
                .saturating_add(i64::try_from(ttl * 1_000).unwrap_or(i64::MAX)),
        );
        Ok(SignedRef {
            path: path.to_string(),
            token: self.sign(path, expires_at),
            expires_at,
        })
    }
}

/// Returns the temporary sibling used for atomic writes.
fn staging_path(resolved: &Path) -> PathBuf {
    let mut staging = resolved.as_os_str().to_owned();
    staging.push(".staging");
    PathBuf::from(staging)
}
