use sha2::{Digest, Sha256};

/// Hash a bearer token for session lookup (SHA-256 hex). Token issuance
/// lives in the identity service; we only ever see the opaque token and
/// store its hash.
pub fn hash_access_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}
