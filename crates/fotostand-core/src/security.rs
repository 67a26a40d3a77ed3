//! Path-safety guard and upload token verification.
//!
//! Every externally influenced path segment (gallery id, filename) goes
//! through [`is_safe_segment`] before it is joined onto the data root.
//! The check is purely syntactic: nothing is canonicalized or resolved.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Returns `true` if `segment` contains neither `..`, `/` nor `\`.
///
/// Leading or trailing single dots are fine (`.hidden`, `photo.`), but `..`
/// anywhere in the string is rejected, so `test..` and `te..st` both fail.
pub fn is_safe_segment(segment: &str) -> bool {
    !(segment.contains("..") || segment.contains('/') || segment.contains('\\'))
}

/// Check a presented bearer token against the configured SHA-256 hash.
///
/// `stored_hash` must be exactly 64 hex characters (either case). The digest
/// of `token` is compared to the decoded hash in constant time.
pub fn verify_upload_token(token: &str, stored_hash: &str) -> bool {
    let provided = Sha256::digest(token.as_bytes());

    let stored = match hex::decode(stored_hash) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    if provided.len() != 32 || stored.len() != 32 {
        return false;
    }

    provided.as_slice().ct_eq(&stored).unwrap_u8() == 1
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ")
}
