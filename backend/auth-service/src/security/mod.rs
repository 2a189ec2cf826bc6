/// Security primitives for the auth service
///
/// - **crypto-core::jwt**: signed access tokens with injected keys
/// - **password**: Argon2id password hashing
pub use crypto_core::jwt::{AccessClaims, IssuedAccessToken, JwtError, JwtKeys};
pub use crypto_core::{generate_opaque_token, sha256_hex};

pub mod password;

pub use password::{hash_password, verify_against_dummy, verify_password};
