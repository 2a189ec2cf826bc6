/// Opaque token material
///
/// Refresh and email-verification tokens carry no claims; they are random
/// bearer secrets looked up by their SHA-256 digest. Both generators draw from
/// the operating system CSPRNG.
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng, RngCore};

/// Number of random bytes behind every opaque token (hex-encoded to 64 chars)
pub const OPAQUE_TOKEN_BYTES: usize = 32;

/// Length of the `jti` claim carried by access tokens
pub const JTI_LENGTH: usize = 36;

/// Generate a fresh opaque token (64 lowercase hex characters)
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; OPAQUE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a unique token identifier for the `jti` claim
pub fn generate_jti() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(JTI_LENGTH)
        .map(char::from)
        .collect()
}
