//! Cryptographic primitives shared by the auth backend.
//!
//! - `jwt`: signed access tokens with explicitly injected keys
//! - `token`: opaque random token material (refresh / verification tokens, jti)
//! - `hash`: digests used to store opaque tokens at rest
pub mod hash;
pub mod jwt;
pub mod token;

pub use hash::{sha256, sha256_hex};
pub use jwt::{AccessClaims, IssuedAccessToken, JwtError, JwtKeys};
pub use token::{generate_jti, generate_opaque_token};
