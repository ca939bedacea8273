//! SHA-256 digests over ranked orders.
//!
//! A ranking is identified by the digest of its ordered project ids, so two
//! runs over the same input can be compared without diffing the full output.

use sha2::{Digest, Sha256};

use super::project::ProjectId;

/// Digest of an ordered sequence of project ids.
///
/// Each id is length-prefixed so that `["ab", "c"]` and `["a", "bc"]` differ.
pub fn order_digest<'a>(ids: impl IntoIterator<Item = &'a ProjectId>) -> String {
    let mut hasher = Sha256::new();
    for id in ids {
        let bytes = id.as_str().as_bytes();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    hex::encode(hasher.finalize())
}

/// Short form (first 12 hex chars).
pub fn short(digest: &str) -> &str {
    &digest[..12.min(digest.len())]
}
