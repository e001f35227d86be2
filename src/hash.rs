//! Content hashing.
//!
//! SHA256 digests identify stored content blobs so a write that does not
//! change the bytes can be recognised without comparing them.

use sha2::{Digest, Sha256};

/// Compute the SHA256 digest of raw content as lowercase hex.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Check if content changed relative to a stored digest.
///
/// Returns `true` when there is no stored digest or it differs.
#[must_use]
pub fn has_changed(current_hash: &str, stored_hash: Option<&str>) -> bool {
    stored_hash.is_none_or(|h| h != current_hash)
}
