use sha2::{Digest, Sha256};

/// Compute SHA256 hash of input bytes
pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Hex-encoded SHA256 of a token string.
///
/// Opaque tokens are persisted only in this form; the raw value never touches storage.
pub fn sha256_hex(token: &str) -> String {
    hex::encode(sha256(token.as_bytes()))
}
